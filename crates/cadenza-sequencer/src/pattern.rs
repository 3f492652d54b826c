//! Note patterns and the bank that owns them.

use core::fmt;
use std::collections::BTreeMap;

use cadenza_midi::{MidiEvent, MAX_CHANNEL};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternId(pub u32);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PatternEventKind {
    Note {
        channel: u8,
        pitch: u8,
        velocity: u8,
        /// Length in beats.
        duration: f64,
        /// Chance in `[0, 1]` that the note sounds on a given pass.
        probability: f32,
    },
    Control {
        channel: u8,
        controller: u8,
        value: u8,
    },
    Program {
        channel: u8,
        program: u8,
    },
    PitchBend {
        channel: u8,
        value: u16,
    },
}

/// One event, anchored at `beat` from the start of the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternEvent {
    pub beat: f64,
    pub kind: PatternEventKind,
}

impl PatternEvent {
    pub fn note(beat: f64, pitch: u8, velocity: u8, duration: f64) -> Self {
        Self {
            beat,
            kind: PatternEventKind::Note {
                channel: 0,
                pitch,
                velocity,
                duration,
                probability: 1.0,
            },
        }
    }

    pub fn control(beat: f64, channel: u8, controller: u8, value: u8) -> Self {
        Self {
            beat,
            kind: PatternEventKind::Control {
                channel,
                controller,
                value,
            },
        }
    }

    pub fn with_channel(mut self, ch: u8) -> Self {
        match &mut self.kind {
            PatternEventKind::Note { channel, .. }
            | PatternEventKind::Control { channel, .. }
            | PatternEventKind::Program { channel, .. }
            | PatternEventKind::PitchBend { channel, .. } => *channel = ch,
        }
        self
    }

    pub fn with_probability(mut self, p: f32) -> Self {
        if let PatternEventKind::Note { probability, .. } = &mut self.kind {
            *probability = p;
        }
        self
    }

    pub fn is_note(&self) -> bool {
        matches!(self.kind, PatternEventKind::Note { .. })
    }

    /// Reject anything that cannot become a well-formed MIDI message.
    pub fn validate(&self) -> Result<()> {
        if !self.beat.is_finite() || self.beat < 0.0 {
            return Err(Error::InvalidEvent(format!("beat {}", self.beat)));
        }
        let ok = match self.kind {
            PatternEventKind::Note {
                channel,
                pitch,
                velocity,
                duration,
                probability,
            } => {
                channel <= MAX_CHANNEL
                    && pitch <= 127
                    && (1..=127).contains(&velocity)
                    && duration.is_finite()
                    && duration > 0.0
                    && (0.0..=1.0).contains(&probability)
            }
            PatternEventKind::Control {
                channel,
                controller,
                value,
            } => channel <= MAX_CHANNEL && controller <= 127 && value <= 127,
            PatternEventKind::Program { channel, program } => {
                channel <= MAX_CHANNEL && program <= 127
            }
            PatternEventKind::PitchBend { channel, value } => {
                channel <= MAX_CHANNEL && value <= 0x3FFF
            }
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidEvent(format!("{:?}", self.kind)))
        }
    }

    /// MIDI message for a non-note event at `offset`.
    pub(crate) fn to_midi(&self, offset: u32) -> Option<MidiEvent> {
        match self.kind {
            PatternEventKind::Note { .. } => None,
            PatternEventKind::Control {
                channel,
                controller,
                value,
            } => Some(MidiEvent::control_change(offset, channel, controller, value)),
            PatternEventKind::Program { channel, program } => {
                Some(MidiEvent::program_change(offset, channel, program))
            }
            PatternEventKind::PitchBend { channel, value } => {
                Some(MidiEvent::pitch_bend(offset, channel, value))
            }
        }
    }
}

/// A reusable clip of events, `length_bars` long. Event beats are relative
/// to the pattern start. Events stay sorted by beat; equal beats keep
/// insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    length_bars: f64,
    events: Vec<PatternEvent>,
}

impl Pattern {
    pub fn new(id: PatternId, name: impl Into<String>, length_bars: f64) -> Result<Self> {
        if !length_bars.is_finite() || length_bars <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "pattern length must be positive, got {length_bars} bars"
            )));
        }
        Ok(Self {
            id,
            name: name.into(),
            length_bars,
            events: Vec::new(),
        })
    }

    #[inline]
    pub fn length_bars(&self) -> f64 {
        self.length_bars
    }

    pub fn set_length_bars(&mut self, length_bars: f64) -> Result<()> {
        if !length_bars.is_finite() || length_bars <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "pattern length must be positive, got {length_bars} bars"
            )));
        }
        self.length_bars = length_bars;
        Ok(())
    }

    #[inline]
    pub fn events(&self) -> &[PatternEvent] {
        &self.events
    }

    /// Insert a validated event. Returns its index.
    pub fn add_event(&mut self, event: PatternEvent) -> Result<usize> {
        event.validate()?;
        Ok(self.insert_sorted(event))
    }

    /// Insert without validation. Malformed events are dropped and reported
    /// when scheduled; this exists for imported data.
    pub fn add_event_unchecked(&mut self, event: PatternEvent) -> usize {
        self.insert_sorted(event)
    }

    fn insert_sorted(&mut self, event: PatternEvent) -> usize {
        let index = self.events.partition_point(|e| e.beat <= event.beat);
        self.events.insert(index, event);
        index
    }

    pub fn add_note(&mut self, beat: f64, pitch: u8, velocity: u8, duration: f64) -> Result<usize> {
        self.add_event(PatternEvent::note(beat, pitch, velocity, duration))
    }

    pub fn remove_event(&mut self, index: usize) -> Result<PatternEvent> {
        if index >= self.events.len() {
            return Err(Error::InvalidArgument(format!("no event at index {index}")));
        }
        Ok(self.events.remove(index))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Index range of events with `start <= beat < end`.
    pub fn range(&self, start: f64, end: f64) -> core::ops::Range<usize> {
        let lo = self.events.partition_point(|e| e.beat < start);
        let hi = self.events.partition_point(|e| e.beat < end);
        lo..hi.max(lo)
    }
}

/// Owner of every pattern in a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternBank {
    patterns: BTreeMap<PatternId, Pattern>,
    next_id: u32,
}

impl PatternBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: impl Into<String>, length_bars: f64) -> Result<PatternId> {
        let id = PatternId(self.next_id);
        let pattern = Pattern::new(id, name, length_bars)?;
        self.next_id += 1;
        self.patterns.insert(id, pattern);
        Ok(id)
    }

    /// Add an existing pattern under a fresh id.
    pub fn insert(&mut self, mut pattern: Pattern) -> PatternId {
        let id = PatternId(self.next_id);
        self.next_id += 1;
        pattern.id = id;
        self.patterns.insert(id, pattern);
        id
    }

    pub fn get(&self, id: PatternId) -> Result<&Pattern> {
        self.patterns.get(&id).ok_or(Error::UnknownPattern(id))
    }

    pub fn get_mut(&mut self, id: PatternId) -> Result<&mut Pattern> {
        self.patterns.get_mut(&id).ok_or(Error::UnknownPattern(id))
    }

    pub fn remove(&mut self, id: PatternId) -> Result<Pattern> {
        self.patterns.remove(&id).ok_or(Error::UnknownPattern(id))
    }

    /// Copy a pattern under a new id.
    pub fn duplicate(&mut self, id: PatternId) -> Result<PatternId> {
        let mut copy = self.get(id)?.clone();
        copy.name = format!("{} (copy)", copy.name);
        Ok(self.insert(copy))
    }

    pub fn contains(&self, id: PatternId) -> bool {
        self.patterns.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_stay_sorted_and_stable() {
        let mut p = Pattern::new(PatternId(0), "p", 1.0).unwrap();
        p.add_note(2.0, 60, 100, 0.5).unwrap();
        p.add_note(0.0, 62, 100, 0.5).unwrap();
        p.add_note(2.0, 64, 100, 0.5).unwrap();
        let beats: Vec<f64> = p.events().iter().map(|e| e.beat).collect();
        assert_eq!(beats, vec![0.0, 2.0, 2.0]);
        // Equal beats keep insertion order.
        match p.events()[2].kind {
            PatternEventKind::Note { pitch, .. } => assert_eq!(pitch, 64),
            _ => unreachable!(),
        }
        assert_eq!(p.range(1.0, 3.0), 1..3);
    }

    #[test]
    fn test_validation() {
        assert!(PatternEvent::note(0.0, 60, 0, 1.0).validate().is_err());
        assert!(PatternEvent::note(0.0, 128, 10, 1.0).validate().is_err());
        assert!(PatternEvent::note(0.0, 60, 10, 0.0).validate().is_err());
        assert!(PatternEvent::note(-1.0, 60, 10, 1.0).validate().is_err());
        assert!(PatternEvent::note(0.0, 60, 10, 1.0)
            .with_probability(1.5)
            .validate()
            .is_err());
        assert!(PatternEvent::control(0.0, 16, 7, 100).validate().is_err());
        assert!(PatternEvent::note(0.0, 60, 10, 1.0).validate().is_ok());
    }

    #[test]
    fn test_bank_duplicate_gets_new_id() {
        let mut bank = PatternBank::new();
        let a = bank.create("drums", 1.0).unwrap();
        bank.get_mut(a).unwrap().add_note(0.0, 36, 100, 0.25).unwrap();
        let b = bank.duplicate(a).unwrap();
        assert_ne!(a, b);
        assert_eq!(bank.get(b).unwrap().events(), bank.get(a).unwrap().events());
        assert_eq!(bank.get(b).unwrap().id, b);
    }

    #[test]
    fn test_zero_length_rejected() {
        assert!(Pattern::new(PatternId(1), "bad", 0.0).is_err());
    }
}
