//! Built-in graph nodes: gain and buses, a feedback delay, signal sources,
//! a buffer player and a sidechain compressor.
//!
//! Every node implements [`cadenza_core::Processor`]. None of them allocate
//! in `process`; buffers they need are sized in `prepare`. Parameters are
//! read from the block's [`ParamValues`](cadenza_core::ParamValues) when the
//! node runs inside a graph, and fall back to the construction values when it
//! is driven directly.

mod util;

pub mod compressor;
pub use compressor::SidechainCompressor;

pub mod delay;
pub use delay::FeedbackDelay;

pub mod gain;
pub use gain::{BusNode, GainNode};

mod player;
pub use player::BufferPlayer;

mod source;
pub use source::{ConstantSource, FaultInjector, GateInstrument, HostInput, ImpulseSource};
