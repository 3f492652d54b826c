//! # Cadenza - Real-time Audio Core
//!
//! A block-based audio engine: a processor graph driven by a sample-accurate
//! transport, a MIDI pattern sequencer and a multi-track recorder, split into
//! a real-time half and a control half that only talk through lock-free
//! queues and published snapshots.
//!
//! ## Architecture
//!
//! Cadenza is an umbrella crate that wires together:
//! - **cadenza-core** - SPSC queues, tempo/meter map, transport, graph
//!   editor and runtime, parameters, reclamation, worker pool
//! - **cadenza-midi** - MIDI events and fixed-capacity block buffers
//! - **cadenza-sequencer** - patterns, step patterns, arrangement, MIDI scheduler
//! - **cadenza-recorder** - armed capture into take buffers, punch, export
//! - **cadenza-dsp** - built-in nodes (buses, gain, delay, compressor, sources)
//!
//! The engine is built once and split:
//! - [`AudioCore`] is owned by the audio driver callback: `prepare`,
//!   `process`, `release`. It never allocates, locks or blocks.
//! - [`Controller`] is owned by the application: graph edits, transport
//!   requests, tempo and arrangement edits, recording, events, workers.
//!
//! ## Quick Start
//!
//! ```
//! use cadenza::prelude::*;
//!
//! let (mut controller, mut core) = EngineBuilder::default()
//!     .max_block_size(128)
//!     .worker_threads(0)
//!     .build()?;
//!
//! let tone = controller.add_node(Box::new(ConstantSource::new(0.25, 2)))?;
//! let master = controller.master().expect("builder adds a master bus");
//! controller.connect(tone, 0, master, 0)?;
//! controller.play()?;
//!
//! core.prepare(48_000.0, 128)?;
//! let input = AudioBlock::new(2, 128);
//! let mut output = AudioBlock::new(2, 128);
//! core.process(&input, &mut output, 128)?;
//! assert!((output.channel(0)[0] - 0.25).abs() < 1e-6);
//!
//! controller.maintain();
//! # Ok::<(), cadenza::Error>(())
//! ```

/// Re-export of cadenza-core for direct access
pub use cadenza_core as core;

pub use cadenza_core::{
    AudioBlock, AudioData, BlockContext, Connection, ConnectionId, ConnectionKind, CurveKind,
    EngineConfig, ErrorKind, Event, LoopRegion, Marker, MarkerAction, MeterReading, NodeFault,
    NodeId, NodeKind, ParameterDescriptor, ParameterRange, PortDescriptor, PrepareContext,
    Processor, TimeMap, TransportState,
};

// MIDI
pub use cadenza_midi as midi;
pub use cadenza_midi::{MidiBuffer, MidiEvent};

// Sequencer
pub use cadenza_sequencer as sequencer;
pub use cadenza_sequencer::{
    Arrangement, InstanceId, Pattern, PatternEvent, PatternId, Step, StepPattern,
};

// Recorder
pub use cadenza_recorder as recorder;
pub use cadenza_recorder::{MemoryWriter, RecordMode, TakeView, TakeWriter, WavFileWriter};

// DSP nodes
pub use cadenza_dsp as dsp_nodes;
pub use cadenza_dsp::{
    BufferPlayer, BusNode, ConstantSource, FeedbackDelay, GainNode, GateInstrument, HostInput,
    ImpulseSource, SidechainCompressor,
};

mod builder;
mod command;
mod control;
mod engine;
mod error;
mod project;

pub use builder::EngineBuilder;
pub use control::Controller;
pub use engine::AudioCore;
pub use error::{Error, Result};
pub use project::{NodeState, ProjectDocument, PROJECT_VERSION};

/// Convenience prelude for common imports
pub mod prelude {
    // Engine halves
    pub use crate::{AudioCore, Controller, EngineBuilder};

    // Errors
    pub use crate::{Error, ErrorKind, Result};

    // Buffers and events
    pub use crate::{AudioBlock, Event, MidiEvent, TransportState};

    // Graph
    pub use crate::{ConnectionKind, NodeId, Processor};

    // Built-in nodes
    pub use crate::{BusNode, ConstantSource, GainNode, GateInstrument, HostInput};

    // Sequencing
    pub use crate::{Arrangement, PatternEvent, StepPattern};
}
