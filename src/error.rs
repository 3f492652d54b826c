//! Centralized error type for the cadenza umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use cadenza_core::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] cadenza_core::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] cadenza_midi::Error),

    #[error("Sequencer: {0}")]
    Sequencer(#[from] cadenza_sequencer::Error),

    #[error("Recorder: {0}")]
    Recorder(#[from] cadenza_recorder::Error),

    #[error("Unsupported project version {found} (expected {expected})")]
    ProjectVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Which of the core error kinds this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Core(inner) => inner.kind(),
            Error::Midi(cadenza_midi::Error::BufferFull(_) | cadenza_midi::Error::PoolFull { .. }) => {
                ErrorKind::CapacityExceeded
            }
            Error::Midi(_) | Error::ProjectVersion { .. } => ErrorKind::InvalidArgument,
            Error::Sequencer(inner) => inner.kind(),
            Error::Recorder(inner) => inner.kind(),
            Error::Io(_) => ErrorKind::ResourceUnavailable,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passes_through_subsystems() {
        let err: Error = cadenza_core::Error::NotPrepared.into();
        assert_eq!(err.kind(), ErrorKind::NotPrepared);

        let err: Error = cadenza_sequencer::Error::CapacityExceeded("tracks").into();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

        let err: Error = cadenza_recorder::Error::TakeBusy(1).into();
        assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);

        let err: Error = cadenza_midi::Error::BufferFull(8).into();
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    }

    #[test]
    fn test_topology_errors_surface_as_violations() {
        let err: Error = cadenza_core::Error::from(cadenza_core::TopologyError::DuplicateConnection).into();
        assert_eq!(err.kind(), ErrorKind::TopologyViolation);
        assert!(err.to_string().contains("Connection already exists"));
    }
}
