//! Multi-track recording: armed capture into pre-allocated take buffers,
//! punch gating, input monitoring and post-session export.
//!
//! The [`Recorder`] lives on the audio thread and is driven by
//! [`RecorderCommand`]s. Take buffers are allocated by the control side and
//! shared as `Arc<TakeBuffer>`; once recording stops, a [`TakeView`] gives a
//! read-only window over the valid prefix for a [`TakeWriter`].

pub mod error;
pub use error::{Error, Result};

pub mod take;
pub use take::{TakeBuffer, TakeView};

pub mod recorder;
pub use recorder::{RecordMode, Recorder, RecorderCommand};

pub mod export;
pub use export::{write_wav_to, MemoryWriter, TakeWriter, WavFileWriter};
