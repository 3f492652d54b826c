//! Error types for cadenza-sequencer.

use thiserror::Error;

use crate::arrangement::InstanceId;
use crate::pattern::PatternId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Unknown pattern: {0}")]
    UnknownPattern(PatternId),

    #[error("Unknown pattern instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("Unknown track: {0}")]
    UnknownTrack(usize),

    #[error("Invalid pattern event: {0}")]
    InvalidEvent(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    #[error(transparent)]
    Core(#[from] cadenza_core::Error),
}

impl Error {
    pub fn kind(&self) -> cadenza_core::ErrorKind {
        use cadenza_core::ErrorKind;
        match self {
            Error::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Error::Core(inner) => inner.kind(),
            _ => ErrorKind::InvalidArgument,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
