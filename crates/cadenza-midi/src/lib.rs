//! MIDI event model for the Cadenza audio core.
//!
//! Events carry a sample offset relative to the start of the block they belong
//! to, plus the raw channel-voice bytes. SysEx payloads live in a separate
//! [`SysexPool`] and are referenced by handle so that [`MidiEvent`] stays
//! `Copy` and fits in a cache-friendly fixed-capacity [`MidiBuffer`].
//!
//! ```
//! use cadenza_midi::{MidiBuffer, MidiEvent};
//!
//! let mut buf = MidiBuffer::with_capacity(16);
//! buf.insert_sorted(MidiEvent::note_off(64, 0, 60)).unwrap();
//! buf.insert_sorted(MidiEvent::note_on(0, 0, 60, 100)).unwrap();
//! assert!(buf.as_slice()[0].is_note_on());
//! ```

pub mod error;
pub use error::{Error, Result};

mod buffer;
mod event;
mod sysex;

pub use buffer::MidiBuffer;
pub use event::{status, MidiEvent, MidiEventBuilder};
pub use sysex::{SysexHandle, SysexPool};

/// Highest valid MIDI channel (zero-based).
pub const MAX_CHANNEL: u8 = 15;

/// Convert a 7-bit velocity to a linear gain in 0.0..=1.0.
#[inline]
pub fn velocity_to_gain(velocity: u8) -> f32 {
    f32::from(velocity.min(127)) / 127.0
}

/// Clamp an arbitrary integer velocity into the playable 1..=127 range.
#[inline]
pub fn clamp_velocity(velocity: i32) -> u8 {
    velocity.clamp(1, 127) as u8
}
