//! Grid step sequencer.
//!
//! A [`StepPattern`] is a set of rows (one pitch each) over a shared number
//! of steps. The grid loops continuously from beat 0; [`StepPattern::notes_in`]
//! expands every active step that sounds inside a beat window into concrete
//! note on/off pairs, applying swing, micro-timing, ratchets, gate, accent,
//! humanize and probability.

use cadenza_core::{TimeMap, TICKS_PER_BEAT};
use cadenza_midi::{clamp_velocity, MAX_CHANNEL};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rng;

pub const MAX_RATCHET: u8 = 8;
pub const MAX_MICRO_TICKS: i16 = 50;
pub const ACCENT_BOOST: i32 = 20;
/// Gate length as a fraction of one step.
pub const DEFAULT_GATE: f64 = 0.8;
pub const MAX_GATE: f64 = 2.0;
/// Velocity lost per ratchet repeat, as a fraction of the step velocity.
pub const RATCHET_DECAY: f32 = 0.1;
/// Largest humanize shift, as a fraction of one step.
pub const HUMANIZE_RANGE: f64 = 0.1;

/// Seed salt that keeps step-track draws apart from pattern-instance draws.
const STEP_SALT: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub active: bool,
    pub velocity: u8,
    pub probability: f32,
    pub ratchet: u8,
    pub slide: bool,
    pub accent: bool,
    pub mute: bool,
    /// Offset from the grid in ticks, `-50..=50`.
    pub micro_timing: i16,
    /// Overrides the row's note number.
    pub note: Option<u8>,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            active: false,
            velocity: 100,
            probability: 1.0,
            ratchet: 1,
            slide: false,
            accent: false,
            mute: false,
            micro_timing: 0,
            note: None,
        }
    }
}

impl Step {
    pub fn on(velocity: u8) -> Self {
        Self {
            active: true,
            velocity,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=127).contains(&self.velocity) {
            return Err(Error::InvalidArgument(format!(
                "step velocity {} outside 1..=127",
                self.velocity
            )));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::InvalidArgument(format!(
                "step probability {} outside 0..=1",
                self.probability
            )));
        }
        if !(1..=MAX_RATCHET).contains(&self.ratchet) {
            return Err(Error::InvalidArgument(format!(
                "ratchet {} outside 1..={MAX_RATCHET}",
                self.ratchet
            )));
        }
        if self.micro_timing.abs() > MAX_MICRO_TICKS {
            return Err(Error::InvalidArgument(format!(
                "micro timing {} outside +/-{MAX_MICRO_TICKS} ticks",
                self.micro_timing
            )));
        }
        if self.note.is_some_and(|n| n > 127) {
            return Err(Error::InvalidArgument("step note above 127".to_string()));
        }
        Ok(())
    }

    #[inline]
    fn sounds(&self) -> bool {
        self.active && !self.mute
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRow {
    pub note: u8,
    pub channel: u8,
    pub muted: bool,
    steps: Vec<Step>,
}

impl StepRow {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Note produced by a step, in absolute beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepNote {
    pub on_beat: f64,
    pub off_beat: f64,
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPattern {
    rows: Vec<StepRow>,
    steps: usize,
    /// Steps per 4/4 bar: 4, 8, 16 or 32.
    subdivision: u32,
    swing: f64,
    gate: f64,
    humanize: f64,
}

impl Default for StepPattern {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            steps: 16,
            subdivision: 16,
            swing: 0.0,
            gate: DEFAULT_GATE,
            humanize: 0.0,
        }
    }
}

impl StepPattern {
    pub fn new(steps: usize) -> Result<Self> {
        if steps == 0 {
            return Err(Error::InvalidArgument("step count must be positive".to_string()));
        }
        Ok(Self {
            steps,
            ..Self::default()
        })
    }

    /// Append a row and return its index.
    pub fn add_row(&mut self, note: u8, channel: u8) -> Result<usize> {
        if note > 127 || channel > MAX_CHANNEL {
            return Err(Error::InvalidArgument(format!(
                "row note {note} / channel {channel} out of range"
            )));
        }
        self.rows.push(StepRow {
            note,
            channel,
            muted: false,
            steps: vec![Step::default(); self.steps],
        });
        Ok(self.rows.len() - 1)
    }

    pub fn remove_row(&mut self, row: usize) -> Result<StepRow> {
        self.check_row(row)?;
        Ok(self.rows.remove(row))
    }

    pub fn rows(&self) -> &[StepRow] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> Result<&StepRow> {
        self.rows
            .get(row)
            .ok_or_else(|| Error::InvalidArgument(format!("no step row {row}")))
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// Change the number of steps; new steps start inactive.
    pub fn set_step_count(&mut self, steps: usize) -> Result<()> {
        if steps == 0 {
            return Err(Error::InvalidArgument("step count must be positive".to_string()));
        }
        self.steps = steps;
        for row in &mut self.rows {
            row.steps.resize(steps, Step::default());
        }
        Ok(())
    }

    pub fn subdivision(&self) -> u32 {
        self.subdivision
    }

    pub fn set_subdivision(&mut self, subdivision: u32) -> Result<()> {
        if !matches!(subdivision, 4 | 8 | 16 | 32) {
            return Err(Error::InvalidArgument(format!(
                "subdivision {subdivision} must be 4, 8, 16 or 32"
            )));
        }
        self.subdivision = subdivision;
        Ok(())
    }

    /// Length of one step in beats.
    #[inline]
    pub fn step_beats(&self) -> f64 {
        4.0 / f64::from(self.subdivision)
    }

    /// Length of one pass through the grid in beats.
    #[inline]
    pub fn length_beats(&self) -> f64 {
        self.step_beats() * self.steps as f64
    }

    pub fn swing(&self) -> f64 {
        self.swing
    }

    pub fn set_swing(&mut self, swing: f64) {
        self.swing = if swing.is_finite() { swing.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn gate(&self) -> f64 {
        self.gate
    }

    pub fn set_gate(&mut self, gate: f64) {
        self.gate = if gate.is_finite() {
            gate.clamp(0.0, MAX_GATE)
        } else {
            DEFAULT_GATE
        };
    }

    pub fn humanize(&self) -> f64 {
        self.humanize
    }

    pub fn set_humanize(&mut self, amount: f64) {
        self.humanize = if amount.is_finite() { amount.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn set_row_note(&mut self, row: usize, note: u8) -> Result<()> {
        self.check_row(row)?;
        if note > 127 {
            return Err(Error::InvalidArgument(format!("row note {note} above 127")));
        }
        self.rows[row].note = note;
        Ok(())
    }

    pub fn set_row_muted(&mut self, row: usize, muted: bool) -> Result<()> {
        self.check_row(row)?;
        self.rows[row].muted = muted;
        Ok(())
    }

    pub fn step(&self, row: usize, index: usize) -> Result<&Step> {
        self.check_step(row, index)?;
        Ok(&self.rows[row].steps[index])
    }

    pub fn set_step(&mut self, row: usize, index: usize, step: Step) -> Result<()> {
        self.check_step(row, index)?;
        step.validate()?;
        self.rows[row].steps[index] = step;
        Ok(())
    }

    pub fn toggle_step(&mut self, row: usize, index: usize) -> Result<bool> {
        self.check_step(row, index)?;
        let step = &mut self.rows[row].steps[index];
        step.active = !step.active;
        Ok(step.active)
    }

    /// Rotate a row right by `amount` steps (negative rotates left).
    pub fn rotate(&mut self, row: usize, amount: i32) -> Result<()> {
        self.check_row(row)?;
        let n = self.steps as i64;
        let shift = i64::from(amount).rem_euclid(n) as usize;
        self.rows[row].steps.rotate_right(shift);
        Ok(())
    }

    pub fn reverse(&mut self, row: usize) -> Result<()> {
        self.check_row(row)?;
        self.rows[row].steps.reverse();
        Ok(())
    }

    pub fn clear_row(&mut self, row: usize) -> Result<()> {
        self.check_row(row)?;
        self.rows[row].steps.fill(Step::default());
        Ok(())
    }

    /// Activate each step with probability `density`, reproducibly for a
    /// given `seed`.
    pub fn randomize(&mut self, row: usize, density: f32, seed: u64) -> Result<()> {
        self.check_row(row)?;
        let density = density.clamp(0.0, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for step in &mut self.rows[row].steps {
            step.active = rng.gen::<f32>() < density;
            if step.active {
                step.velocity = rng.gen_range(64..=127);
            }
        }
        Ok(())
    }

    /// Spread `pulses` hits as evenly as possible over the row.
    pub fn euclidean(&mut self, row: usize, pulses: usize) -> Result<()> {
        self.check_row(row)?;
        let n = self.steps;
        if pulses > n {
            return Err(Error::InvalidArgument(format!(
                "{pulses} pulses do not fit in {n} steps"
            )));
        }
        for (i, step) in self.rows[row].steps.iter_mut().enumerate() {
            step.active = (i * pulses) % n < pulses;
        }
        Ok(())
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row < self.rows.len() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!("no step row {row}")))
        }
    }

    fn check_step(&self, row: usize, index: usize) -> Result<()> {
        self.check_row(row)?;
        if index < self.steps {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "step {index} outside 0..{}",
                self.steps
            )))
        }
    }

    /// Every note whose on-beat falls in `[start, end)`. Draws are seeded
    /// from the nominal step position, so the result does not depend on how
    /// the timeline is cut into windows.
    pub fn notes_in(
        &self,
        start: f64,
        end: f64,
        map: &TimeMap,
        track: u32,
        mut emit: impl FnMut(StepNote),
    ) {
        if end <= start || self.rows.iter().all(|r| r.muted) {
            return;
        }
        let step_len = self.step_beats();
        let n = self.steps as i64;
        // Largest distance a note-on can move away from its grid position.
        let margin = step_len + f64::from(MAX_MICRO_TICKS) / f64::from(TICKS_PER_BEAT);
        let first = ((start - margin) / step_len).floor().max(0.0) as i64;
        let last = ((end + margin) / step_len).ceil() as i64;

        for absolute in first..=last {
            let index = absolute.rem_euclid(n) as usize;
            let grid = absolute as f64 * step_len;
            let swing = if index % 2 == 1 {
                self.swing * step_len * 0.5
            } else {
                0.0
            };
            let nominal_sample = map.beat_to_sample_index(grid);

            for (r, row) in self.rows.iter().enumerate() {
                if row.muted {
                    continue;
                }
                let step = &row.steps[index];
                if !step.sounds() {
                    continue;
                }
                let seed = rng::event_seed(nominal_sample, STEP_SALT | track, r as u32);
                if !rng::chance(seed, step.probability) {
                    continue;
                }
                let micro = f64::from(step.micro_timing) / f64::from(TICKS_PER_BEAT);
                let humanize = if self.humanize > 0.0 {
                    f64::from(rng::bipolar(seed.rotate_left(17)))
                        * self.humanize
                        * HUMANIZE_RANGE
                        * step_len
                } else {
                    0.0
                };
                let step_on = (grid + swing + micro + humanize).max(0.0);

                let mut base = i32::from(step.velocity);
                if step.accent {
                    base += ACCENT_BOOST;
                }
                let base = f32::from(clamp_velocity(base));
                let pitch = step.note.unwrap_or(row.note);
                let ratchet = step.ratchet.clamp(1, MAX_RATCHET);
                let sub_len = step_len / f64::from(ratchet);
                let gate = if step.slide {
                    sub_len
                } else {
                    sub_len * self.gate
                };

                for j in 0..ratchet {
                    let on_beat = step_on + f64::from(j) * sub_len;
                    if on_beat < start || on_beat >= end {
                        continue;
                    }
                    let decay = 1.0 - f32::from(j) * RATCHET_DECAY;
                    let velocity = clamp_velocity((base * decay).round() as i32);
                    emit(StepNote {
                        on_beat,
                        off_beat: on_beat + gate,
                        channel: row.channel,
                        pitch,
                        velocity,
                    });
                }
            }
        }
    }
}
