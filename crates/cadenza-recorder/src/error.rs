//! Error types for cadenza-recorder.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown recording track: {0}")]
    UnknownTrack(usize),

    #[error("Take on track {0} is still being written")]
    TakeBusy(usize),

    #[error("Track {0} has no take")]
    NoTake(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl Error {
    pub fn kind(&self) -> cadenza_core::ErrorKind {
        use cadenza_core::ErrorKind;
        match self {
            Error::UnknownTrack(_) | Error::NoTake(_) | Error::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            Error::TakeBusy(_) | Error::Io(_) | Error::Wav(_) => ErrorKind::ResourceUnavailable,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
