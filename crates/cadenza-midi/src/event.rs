//! RT-safe MIDI event type with sample-accurate block offsets.

use midi_msg::MidiMsg;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::sysex::SysexHandle;
use crate::MAX_CHANNEL;

/// Status nibbles for channel-voice messages, plus the SysEx marker.
pub mod status {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const POLY_PRESSURE: u8 = 0xA0;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;
    pub const CHANNEL_PRESSURE: u8 = 0xD0;
    pub const PITCH_BEND: u8 = 0xE0;
    /// SysEx events carry a pool handle in `data1`/`data2` instead of bytes.
    pub const SYSEX: u8 = 0xF0;

    /// Number of data bytes that follow a channel-voice status.
    #[inline]
    pub const fn data_len(status: u8) -> usize {
        match status {
            PROGRAM_CHANGE | CHANNEL_PRESSURE => 1,
            _ => 2,
        }
    }
}

/// Channel MIDI event positioned inside a block.
///
/// `status` is the upper nibble only; the channel is kept separately so that
/// events can be re-channelled without bit twiddling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MidiEvent {
    /// Offset within the current block (0 = first frame).
    pub offset: u32,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub channel: u8,
}

impl MidiEvent {
    #[inline]
    pub const fn new(offset: u32, status: u8, data1: u8, data2: u8, channel: u8) -> Self {
        Self {
            offset,
            status,
            data1,
            data2,
            channel,
        }
    }

    #[inline]
    pub const fn note_on(offset: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(offset, status::NOTE_ON, note, velocity, channel)
    }

    #[inline]
    pub const fn note_off(offset: u32, channel: u8, note: u8) -> Self {
        Self::new(offset, status::NOTE_OFF, note, 0, channel)
    }

    #[inline]
    pub const fn control_change(offset: u32, channel: u8, cc: u8, value: u8) -> Self {
        Self::new(offset, status::CONTROL_CHANGE, cc, value, channel)
    }

    #[inline]
    pub const fn program_change(offset: u32, channel: u8, program: u8) -> Self {
        Self::new(offset, status::PROGRAM_CHANGE, program, 0, channel)
    }

    /// 14-bit pitch bend, 8192 = centre.
    #[inline]
    pub const fn pitch_bend(offset: u32, channel: u8, bend: u16) -> Self {
        Self::new(
            offset,
            status::PITCH_BEND,
            (bend & 0x7F) as u8,
            ((bend >> 7) & 0x7F) as u8,
            channel,
        )
    }

    /// CC 123 on `channel`.
    #[inline]
    pub const fn all_notes_off(offset: u32, channel: u8) -> Self {
        Self::control_change(offset, channel, 123, 0)
    }

    /// Reference into a [`SysexPool`](crate::SysexPool).
    #[inline]
    pub const fn sysex(offset: u32, handle: SysexHandle) -> Self {
        let raw = handle.raw();
        Self::new(offset, status::SYSEX, (raw >> 8) as u8, (raw & 0xFF) as u8, 0)
    }

    #[inline]
    pub fn note_on_builder(note: u8, velocity: u8) -> MidiEventBuilder {
        MidiEventBuilder {
            event: Self::note_on(0, 0, note, velocity),
        }
    }

    #[inline]
    pub fn note_off_builder(note: u8) -> MidiEventBuilder {
        MidiEventBuilder {
            event: Self::note_off(0, 0, note),
        }
    }

    #[inline]
    pub fn cc_builder(control: u8, value: u8) -> MidiEventBuilder {
        MidiEventBuilder {
            event: Self::control_change(0, 0, control, value),
        }
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        self.status == status::NOTE_ON && self.data2 > 0
    }

    /// Note-off, or note-on with zero velocity.
    #[inline]
    pub fn is_note_off(&self) -> bool {
        self.status == status::NOTE_OFF || (self.status == status::NOTE_ON && self.data2 == 0)
    }

    /// CC 120 (all sound off) or CC 123 (all notes off).
    #[inline]
    pub fn is_all_notes_off(&self) -> bool {
        self.status == status::CONTROL_CHANGE && (self.data1 == 120 || self.data1 == 123)
    }

    #[inline]
    pub fn is_sysex(&self) -> bool {
        self.status == status::SYSEX
    }

    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.status {
            status::NOTE_ON | status::NOTE_OFF | status::POLY_PRESSURE => Some(self.data1),
            _ => None,
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<u8> {
        match self.status {
            status::NOTE_ON | status::NOTE_OFF => Some(self.data2),
            _ => None,
        }
    }

    #[inline]
    pub fn sysex_handle(&self) -> Option<SysexHandle> {
        self.is_sysex()
            .then(|| SysexHandle::from_raw(u16::from(self.data1) << 8 | u16::from(self.data2)))
    }

    /// Same event moved to another block offset.
    #[inline]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Check ranges of every field. Used by the scheduler to drop malformed
    /// events before they reach a node.
    pub fn validate(&self) -> Result<()> {
        if self.is_sysex() {
            return Ok(());
        }
        if !(status::NOTE_OFF..=status::PITCH_BEND).contains(&self.status) || self.status & 0x0F != 0 {
            return Err(Error::InvalidStatus(self.status));
        }
        if self.channel > MAX_CHANNEL {
            return Err(Error::InvalidChannel(self.channel));
        }
        if self.data1 > 127 {
            return Err(Error::DataOutOfRange(self.data1));
        }
        if self.data2 > 127 {
            return Err(Error::DataOutOfRange(self.data2));
        }
        Ok(())
    }

    /// Wire bytes (status with channel, then data bytes). SysEx events have no
    /// inline representation and yield an empty vector.
    pub fn to_bytes(&self) -> SmallVec<[u8; 3]> {
        let mut bytes = SmallVec::new();
        if self.is_sysex() {
            return bytes;
        }
        bytes.push(self.status | (self.channel & 0x0F));
        bytes.push(self.data1);
        if status::data_len(self.status) == 2 {
            bytes.push(self.data2);
        }
        bytes
    }

    /// Parse a channel-voice message. Running status is not supported.
    pub fn from_bytes(offset: u32, bytes: &[u8]) -> Result<Self> {
        let first = *bytes.first().ok_or(Error::Truncated {
            expected: 1,
            got: 0,
        })?;
        if first < 0x80 || first >= status::SYSEX {
            return Err(Error::InvalidStatus(first));
        }
        let kind = first & 0xF0;
        let expected = 1 + status::data_len(kind);
        if bytes.len() < expected {
            return Err(Error::Truncated {
                expected,
                got: bytes.len(),
            });
        }
        let data2 = if expected == 3 { bytes[2] } else { 0 };
        let event = Self::new(offset, kind, bytes[1], data2, first & 0x0F);
        event.validate()?;
        Ok(event)
    }

    pub fn to_midi_msg(&self) -> Result<MidiMsg> {
        let bytes = self.to_bytes();
        if bytes.is_empty() {
            return Err(Error::InvalidStatus(self.status));
        }
        MidiMsg::from_midi(&bytes)
            .map(|(msg, _len)| msg)
            .map_err(|e| Error::Parse(format!("{e:?}")))
    }

    pub fn from_midi_msg(offset: u32, msg: &MidiMsg) -> Result<Self> {
        match msg {
            MidiMsg::ChannelVoice { .. } => {
                Self::from_bytes(offset, &msg.to_midi())
            }
            _ => Err(Error::Parse("expected a channel voice message".into())),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MidiEventBuilder {
    event: MidiEvent,
}

impl MidiEventBuilder {
    #[inline]
    pub fn channel(mut self, channel: u8) -> Self {
        self.event.channel = channel;
        self
    }

    #[inline]
    pub fn offset(mut self, offset: u32) -> Self {
        self.event.offset = offset;
        self
    }

    #[inline]
    pub fn build(self) -> MidiEvent {
        self.event
    }
}
