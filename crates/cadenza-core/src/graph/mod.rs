//! Processor graph: control-side editor, compiled execution plan and the
//! audio-thread runtime that owns the nodes.
//!
//! ```text
//!  GraphEditor (control)                 GraphRuntime (audio)
//!  ├── nodes / connections  ──compile──▶  CompiledGraph (steps, feeds, PDC)
//!  └── NodeSlot::new        ──insert───▶  slots[slot] = Box<NodeSlot>
//! ```
//!
//! Nodes are addressed by stable [`NodeId`]s on the control side and by slot
//! index on the audio side. Everything the audio thread stops using travels
//! back through the garbage queue.

mod delay;
mod editor;
mod latency;
mod runtime;
mod topology;

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::node::{NodeKind, PortDescriptor, Processor};
use crate::param::ParameterDescriptor;

pub use delay::DelayAlign;
pub use editor::GraphEditor;
pub use latency::{analyze_latency, LatencyPlan};
pub use runtime::{CompiledGraph, GraphCommand, GraphRuntime, NodeSlot};
pub use topology::topological_order;

/// Stable node identifier. Ids are never reused within one editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge {}", self.0)
    }
}

pub type PortIndex = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionKind {
    #[default]
    Audio,
    /// Feeds the destination's sidechain port; `dest_port` is ignored.
    Sidechain,
    /// Routes `midi_out` of the source into `midi_in` of the destination.
    Midi,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub kind: ConnectionKind,
    pub source: NodeId,
    pub source_port: PortIndex,
    pub dest: NodeId,
    pub dest_port: PortIndex,
    pub gain_db: f32,
}

/// Control-side description of a node, captured when it is added.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub slot: usize,
    pub name: String,
    pub kind: NodeKind,
    pub inputs: Vec<PortDescriptor>,
    pub outputs: Vec<PortDescriptor>,
    pub sidechain: Option<PortDescriptor>,
    pub accepts_midi: bool,
    pub produces_midi: bool,
    pub latency: usize,
    pub feedback: bool,
    pub parameters: Vec<ParameterDescriptor>,
}

impl NodeInfo {
    /// Capture a prepared processor's declarations.
    pub fn describe(id: NodeId, slot: usize, processor: &dyn Processor) -> Self {
        Self {
            id,
            slot,
            name: processor.name().to_string(),
            kind: processor.kind(),
            inputs: processor.input_ports(),
            outputs: processor.output_ports(),
            sidechain: processor.sidechain_port().or_else(|| {
                processor
                    .supports_sidechain()
                    .then(|| PortDescriptor::stereo("sidechain"))
            }),
            accepts_midi: processor.accepts_midi(),
            produces_midi: processor.produces_midi(),
            latency: processor.latency_frames(),
            feedback: processor.is_feedback_delay(),
            parameters: processor.parameter_layout(),
        }
    }
}
