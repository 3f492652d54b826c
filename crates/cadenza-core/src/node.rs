//! Processor contract every graph node implements.

use std::sync::Arc;

use cadenza_midi::MidiBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::AudioBlock;
use crate::context::BlockContext;
use crate::error::Result;
use crate::jobs::WorkerPool;
use crate::param::ParameterDescriptor;

/// Role a node plays in the graph. Only [`NodeKind::Master`] is special:
/// there is exactly one and its output is the engine output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Source,
    Instrument,
    Effect,
    Sidechain,
    Bus,
    Master,
}

/// How an input port copes with a source of a different width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelPolicy {
    /// Channel counts must match.
    #[default]
    Exact,
    /// A mono source is copied to every channel.
    WidenMono,
    /// Any source is averaged down to mono, or widened from mono.
    MixDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub channels: usize,
    pub policy: ChannelPolicy,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            channels,
            policy: ChannelPolicy::Exact,
        }
    }

    pub fn mono(name: impl Into<String>) -> Self {
        Self::new(name, 1)
    }

    pub fn stereo(name: impl Into<String>) -> Self {
        Self::new(name, 2)
    }

    pub fn policy(mut self, policy: ChannelPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether a source of `source_channels` can feed this port.
    pub fn accepts(&self, source_channels: usize) -> bool {
        match self.policy {
            ChannelPolicy::Exact => source_channels == self.channels,
            ChannelPolicy::WidenMono => source_channels == self.channels || source_channels == 1,
            ChannelPolicy::MixDown => {
                source_channels == self.channels || source_channels == 1 || self.channels == 1
            }
        }
    }
}

/// Failure a node reports from `process`. The graph bypasses the node from
/// then on and reports the fault.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFault {
    #[error("produced non-finite output")]
    NonFinite,
    #[error("internal state is inconsistent")]
    InvalidState,
    #[error("missing input")]
    MissingInput,
    #[error("processor error code {0}")]
    Code(u32),
}

/// Shared non-real-time collaborators handed to nodes at `prepare`.
/// Planar audio produced off the audio thread, handed to a node whole.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioData {
    pub sample_rate: f64,
    pub channels: Vec<Vec<f32>>,
}

impl AudioData {
    pub fn new(sample_rate: f64, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Frames in the shortest channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }
}

#[derive(Clone, Default)]
pub struct Services {
    pub workers: Option<Arc<WorkerPool>>,
}

/// Everything a node needs to size itself.
pub struct PrepareContext<'a> {
    pub sample_rate: f64,
    pub max_frames: usize,
    pub max_channels: usize,
    pub services: &'a Services,
}

/// A graph node.
///
/// `prepare` and `reset` run off the audio thread and may allocate.
/// `process` runs on the audio thread and must not allocate, lock, log or
/// perform I/O; given the same inputs, parameters and state it must produce
/// the same output. Port lists and latency are read once after `prepare`
/// and must not change until the next `prepare`.
pub trait Processor: Send {
    fn kind(&self) -> NodeKind;

    fn name(&self) -> &str {
        "node"
    }

    fn prepare(&mut self, ctx: &PrepareContext<'_>) -> Result<()>;

    fn reset(&mut self);

    fn process(
        &mut self,
        ctx: &BlockContext<'_>,
        inputs: &[AudioBlock],
        outputs: &mut [AudioBlock],
        midi_out: &mut MidiBuffer,
    ) -> core::result::Result<(), NodeFault>;

    fn input_ports(&self) -> Vec<PortDescriptor> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::stereo("out")]
    }

    /// Auxiliary input fed by sidechain connections.
    fn sidechain_port(&self) -> Option<PortDescriptor> {
        None
    }

    fn supports_sidechain(&self) -> bool {
        self.sidechain_port().is_some()
    }

    fn accepts_midi(&self) -> bool {
        false
    }

    fn produces_midi(&self) -> bool {
        false
    }

    fn parameter_layout(&self) -> Vec<ParameterDescriptor> {
        Vec::new()
    }

    fn latency_frames(&self) -> usize {
        0
    }

    /// A delay of at least one block. Edges leaving such a node are allowed
    /// to close a cycle: downstream readers see the previous block.
    fn is_feedback_delay(&self) -> bool {
        false
    }

    /// Receive a buffer produced off-thread (e.g. by a worker job). Returns
    /// whatever buffer the node no longer needs so it can be freed off the
    /// audio thread.
    fn accept_buffer(&mut self, buffer: Box<AudioData>) -> Option<Box<AudioData>> {
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_policies() {
        let exact = PortDescriptor::stereo("in");
        assert!(exact.accepts(2));
        assert!(!exact.accepts(1));

        let widen = PortDescriptor::stereo("in").policy(ChannelPolicy::WidenMono);
        assert!(widen.accepts(1));
        assert!(!widen.accepts(4));

        let mixdown = PortDescriptor::mono("key").policy(ChannelPolicy::MixDown);
        assert!(mixdown.accepts(2));
        assert!(mixdown.accepts(6));
    }

    #[test]
    fn test_fault_display() {
        assert_eq!(NodeFault::Code(7).to_string(), "processor error code 7");
    }
}
