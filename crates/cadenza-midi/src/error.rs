//! Error types for cadenza-midi.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid status byte: {0:#04x}")]
    InvalidStatus(u8),

    #[error("Invalid MIDI channel: {0}. Must be 0-15")]
    InvalidChannel(u8),

    #[error("Data byte out of range: {0}. Must be 0-127")]
    DataOutOfRange(u8),

    #[error("Truncated message: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Event buffer full (capacity {0})")]
    BufferFull(usize),

    #[error("SysEx pool exhausted: requested {requested} bytes, {available} available")]
    PoolFull { requested: usize, available: usize },

    #[error("Unknown SysEx handle: {0}")]
    UnknownHandle(u16),

    #[error("MIDI parse error: {0}")]
    Parse(String),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
