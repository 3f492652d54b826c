//! Real-time audio core kernel: processor graph, transport, tempo map and
//! the lock-free plumbing between the audio thread and everything else.
//!
//! # Primary API
//!
//! - [`GraphEditor`] / [`GraphRuntime`]: control-side graph model and the
//!   audio-thread executor it compiles for
//! - [`Transport`]: play/stop/pause/record state and per-block planning
//! - [`TimeMap`]: tempo map, meter map and markers
//! - [`AudioBlock`] / [`BlockContext`]: what every [`Processor`] sees
//! - [`ParameterHandle`] / [`NodeParams`]: stepped and ramped parameters
//! - [`WorkerPool`]: non-real-time jobs with cancellation
//!
//! # Example
//!
//! ```
//! use cadenza_core::{TimeMap, Transport, TransportCommand};
//!
//! let map = TimeMap::default();
//! let mut transport = Transport::new();
//! transport.apply(TransportCommand::Play, &map);
//!
//! let plan = transport.plan_block(512, &map);
//! assert_eq!(plan.segments().len(), 1);
//! assert_eq!(transport.playhead(), 512);
//! ```

pub mod error;
pub use error::{Error, ErrorKind, Result, TopologyError};

pub mod config;
pub use config::{EngineConfig, MAX_BLOCK_SIZE, MAX_CHANNELS};

pub(crate) mod lockfree;
pub use lockfree::{AtomicCounter, AtomicDouble, AtomicFlag, AtomicFloat};

pub mod spsc;
pub use spsc::{spsc, SpscConsumer, SpscProducer};

pub mod time;
pub use time::{
    Bbt, CurveKind, LoopRegion, Marker, MarkerAction, MeterChange, MeterMap, TempoMap, TempoPoint,
    TimeMap, MAX_BPM, TICKS_PER_BEAT,
};

pub mod transport;
pub use transport::{
    BlockPlan, Segment, TransitionResult, Transport, TransportCommand, TransportInfo,
    TransportSnapshot, TransportState, MAX_SEGMENTS,
};

mod buffer;
pub use buffer::AudioBlock;

mod context;
pub use context::{BlockContext, TempoSnapshot};

pub mod node;
pub use node::{
    AudioData, ChannelPolicy, NodeFault, NodeKind, PortDescriptor, PrepareContext, Processor,
    Services,
};

pub mod graph;
pub use graph::{
    CompiledGraph, Connection, ConnectionId, ConnectionKind, GraphCommand, GraphEditor,
    GraphRuntime, NodeId, NodeInfo, NodeSlot, PortIndex,
};

pub mod param;
pub use param::{
    db_to_linear, linear_to_db, LinearRamp, NodeParams, ParamValues, ParameterDescriptor,
    ParameterHandle, ParameterRange, ParameterScale, ParameterSnapshot,
};

pub mod reclaim;
pub use reclaim::{Epoch, Garbage, GarbageSink, Reclaimer};

pub mod event;
pub use event::{CountingSink, Event, EventSink, NullSink};

pub mod metering;
pub use metering::{AtomicLevels, MeterLevels, MeterReading};

pub mod jobs;
pub use jobs::{
    run_chunked, CancelToken, Completion, JobHandle, JobId, JobOutcome, Stem, StemSeparator,
    WorkerPool,
};

pub use cadenza_midi::{MidiBuffer, MidiEvent};
