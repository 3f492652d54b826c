//! Error types for cadenza-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{ConnectionId, NodeId, PortIndex};
use crate::node::NodeFault;

/// Copyable error discriminant. Travels inside RT events where the full
/// [`Error`] (which may own a `String`) cannot be built without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    TopologyViolation,
    CapacityExceeded,
    NotPrepared,
    ResourceUnavailable,
    NodeFault,
    Overrun,
}

/// Reasons a graph edit is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Connecting {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    #[error("Node {node} has no {direction} port {port}")]
    NoSuchPort {
        node: NodeId,
        port: PortIndex,
        direction: &'static str,
    },

    #[error("Port types differ between {from} and {to}")]
    PortTypeMismatch { from: NodeId, to: NodeId },

    #[error("Channel count mismatch: source has {source_channels}, destination accepts {dest_channels}")]
    ChannelMismatch {
        source_channels: usize,
        dest_channels: usize,
    },

    #[error("Connection already exists")]
    DuplicateConnection,

    #[error("Node {0} does not accept a sidechain input")]
    SidechainUnsupported(NodeId),

    #[error("A node cannot be connected to itself ({0})")]
    SelfConnection(NodeId),

    #[error("The master node cannot be removed")]
    MasterRemoval,
}

/// Error type for cadenza-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid tempo: {0}. Must be in (0, 1000] BPM")]
    InvalidTempo(f64),

    #[error("Invalid beat position: {0}")]
    InvalidBeat(f64),

    #[error("Invalid loop range: start={start}, end={end}")]
    InvalidLoopRange { start: f64, end: f64 },

    #[error("Invalid time signature: {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u32, denominator: u32 },

    #[error("Meter change at beat {0} does not fall on a bar line")]
    MisalignedMeterChange(f64),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Unknown parameter {param} on node {node}")]
    UnknownParameter { node: NodeId, param: u32 },

    #[error("Topology violation: {0}")]
    TopologyViolation(#[from] TopologyError),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    #[error("Audio core is not prepared")]
    NotPrepared,

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(&'static str),

    #[error("Node {node} faulted: {fault}")]
    NodeFault { node: NodeId, fault: NodeFault },

    #[error("Recording buffer of track {track} is full")]
    Overrun { track: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_)
            | Error::InvalidConfig(_)
            | Error::InvalidTempo(_)
            | Error::InvalidBeat(_)
            | Error::InvalidLoopRange { .. }
            | Error::InvalidTimeSignature { .. }
            | Error::MisalignedMeterChange(_)
            | Error::UnknownNode(_)
            | Error::UnknownConnection(_)
            | Error::UnknownParameter { .. } => ErrorKind::InvalidArgument,
            Error::TopologyViolation(_) => ErrorKind::TopologyViolation,
            Error::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Error::NotPrepared => ErrorKind::NotPrepared,
            Error::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            Error::NodeFault { .. } => ErrorKind::NodeFault,
            Error::Overrun { .. } => ErrorKind::Overrun,
        }
    }
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
