//! Meter map and bar:beat:tick conversion.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::tempo::BEAT_EPSILON;
use crate::error::{Error, Result};

/// MIDI-grid resolution: ticks per quarter note.
pub const TICKS_PER_BEAT: u32 = 960;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterChange {
    pub beat: f64,
    pub numerator: u32,
    pub denominator: u32,
}

impl MeterChange {
    pub fn new(beat: f64, numerator: u32, denominator: u32) -> Result<Self> {
        if !(1..=32).contains(&numerator) || !matches!(denominator, 1 | 2 | 4 | 8 | 16 | 32) {
            return Err(Error::InvalidTimeSignature {
                numerator,
                denominator,
            });
        }
        if !beat.is_finite() || beat < 0.0 {
            return Err(Error::InvalidBeat(beat));
        }
        Ok(Self {
            beat,
            numerator,
            denominator,
        })
    }

    /// Quarter notes per meter beat (0.5 for eighths).
    #[inline]
    pub fn beat_unit(&self) -> f64 {
        4.0 / f64::from(self.denominator)
    }

    /// Quarter notes per bar.
    #[inline]
    pub fn beats_per_bar(&self) -> f64 {
        f64::from(self.numerator) * self.beat_unit()
    }
}

/// Musical position as bar:beat:tick. Bars and beats are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bbt {
    pub bar: u32,
    pub beat: u32,
    pub tick: u32,
}

impl Bbt {
    pub fn new(bar: u32, beat: u32, tick: u32) -> Self {
        Self { bar, beat, tick }
    }
}

impl fmt::Display for Bbt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{:03}", self.bar, self.beat, self.tick)
    }
}

/// Sorted meter changes. A change must sit on a bar line of the meter before
/// it, which keeps bar numbering integral.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterMap {
    changes: Vec<MeterChange>,
    /// Zero-based bar index at which each change starts.
    bar_starts: Vec<f64>,
}

impl MeterMap {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self> {
        let first = MeterChange::new(0.0, numerator, denominator)?;
        Ok(Self {
            changes: vec![first],
            bar_starts: vec![0.0],
        })
    }

    pub fn from_changes(changes: &[MeterChange]) -> Result<Self> {
        let first = changes
            .iter()
            .find(|c| c.beat.abs() < BEAT_EPSILON)
            .ok_or_else(|| Error::InvalidArgument("meter map needs a change at beat 0".into()))?;
        let mut map = Self::new(first.numerator, first.denominator)?;
        let mut rest: Vec<_> = changes.iter().filter(|c| c.beat >= BEAT_EPSILON).collect();
        rest.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        for change in rest {
            map.add_meter_change(*change)?;
        }
        Ok(map)
    }

    pub fn changes(&self) -> &[MeterChange] {
        &self.changes
    }

    /// Insert a change, replacing one at the same beat. Rejected when it, or
    /// any later change, would no longer start on a bar line.
    pub fn add_meter_change(&mut self, change: MeterChange) -> Result<()> {
        let change = MeterChange::new(change.beat, change.numerator, change.denominator)?;
        let mut changes = self.changes.clone();
        match changes
            .iter()
            .position(|c| (c.beat - change.beat).abs() < BEAT_EPSILON)
        {
            Some(i) => changes[i] = MeterChange { beat: changes[i].beat, ..change },
            None => {
                let at = changes.partition_point(|c| c.beat < change.beat);
                changes.insert(at, change);
            }
        }
        self.bar_starts = Self::compute_bar_starts(&changes)?;
        self.changes = changes;
        Ok(())
    }

    pub fn remove_meter_change(&mut self, beat: f64) -> Result<MeterChange> {
        if beat.abs() < BEAT_EPSILON {
            return Err(Error::InvalidArgument(
                "the meter change at beat 0 cannot be removed".into(),
            ));
        }
        let i = self
            .changes
            .iter()
            .position(|c| (c.beat - beat).abs() < BEAT_EPSILON)
            .ok_or(Error::InvalidBeat(beat))?;
        let mut changes = self.changes.clone();
        let removed = changes.remove(i);
        self.bar_starts = Self::compute_bar_starts(&changes)?;
        self.changes = changes;
        Ok(removed)
    }

    fn compute_bar_starts(changes: &[MeterChange]) -> Result<Vec<f64>> {
        let mut starts = Vec::with_capacity(changes.len());
        let mut bar = 0.0;
        for (i, change) in changes.iter().enumerate() {
            if i > 0 {
                let prev = &changes[i - 1];
                let bars = (change.beat - prev.beat) / prev.beats_per_bar();
                if (bars - bars.round()).abs() > 1e-9 {
                    return Err(Error::MisalignedMeterChange(change.beat));
                }
                bar += bars.round();
            }
            starts.push(bar);
        }
        Ok(starts)
    }

    fn index_for_beat(&self, beat: f64) -> usize {
        self.changes
            .partition_point(|c| c.beat <= beat + BEAT_EPSILON)
            .saturating_sub(1)
    }

    pub fn meter_at_beat(&self, beat: f64) -> &MeterChange {
        &self.changes[self.index_for_beat(beat)]
    }

    /// Zero-based fractional bar position of `beat`.
    pub fn beat_to_bar(&self, beat: f64) -> f64 {
        let beat = beat.max(0.0);
        let i = self.index_for_beat(beat);
        let change = &self.changes[i];
        self.bar_starts[i] + (beat - change.beat) / change.beats_per_bar()
    }

    /// Beat at zero-based fractional bar position `bar`.
    pub fn bar_to_beat(&self, bar: f64) -> f64 {
        let bar = bar.max(0.0);
        let i = self
            .bar_starts
            .partition_point(|&b| b <= bar)
            .saturating_sub(1);
        let change = &self.changes[i];
        change.beat + (bar - self.bar_starts[i]) * change.beats_per_bar()
    }

    pub fn beat_to_bbt(&self, beat: f64) -> Bbt {
        let beat = beat.max(0.0);
        let i = self.index_for_beat(beat);
        let change = &self.changes[i];
        let into_change = beat - change.beat;
        let bars = (into_change / change.beats_per_bar() + BEAT_EPSILON).floor();
        let into_bar = (into_change - bars * change.beats_per_bar()).max(0.0);
        let beat_in_bar = (into_bar / change.beat_unit() + BEAT_EPSILON).floor();
        let into_beat = (into_bar - beat_in_bar * change.beat_unit()).max(0.0);
        Bbt {
            bar: (self.bar_starts[i] + bars) as u32 + 1,
            beat: beat_in_bar as u32 + 1,
            tick: (into_beat * f64::from(TICKS_PER_BEAT)).round() as u32,
        }
    }

    pub fn bbt_to_beat(&self, bbt: Bbt) -> f64 {
        let bar_start = self.bar_to_beat(f64::from(bbt.bar.saturating_sub(1)));
        let change = self.meter_at_beat(bar_start);
        bar_start
            + f64::from(bbt.beat.saturating_sub(1)) * change.beat_unit()
            + f64::from(bbt.tick) / f64::from(TICKS_PER_BEAT)
    }
}

impl Default for MeterMap {
    fn default() -> Self {
        Self {
            changes: vec![MeterChange {
                beat: 0.0,
                numerator: 4,
                denominator: 4,
            }],
            bar_starts: vec![0.0],
        }
    }
}
