//! Per-block context handed to every node.

use cadenza_midi::MidiEvent;

use crate::buffer::AudioBlock;
use crate::param::ParamValues;
use crate::transport::TransportSnapshot;

/// Tempo and meter in effect at the start of the block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoSnapshot {
    pub bpm: f64,
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for TempoSnapshot {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            numerator: 4,
            denominator: 4,
        }
    }
}

/// Read-only view of everything a node may consult while processing.
///
/// Built on the stack once per node per (sub-)block. MIDI output is passed to
/// `process` separately because it is the one mutable stream.
#[derive(Clone, Copy)]
pub struct BlockContext<'a> {
    pub sample_rate: f64,
    pub frames: usize,
    pub transport: TransportSnapshot,
    pub tempo: TempoSnapshot,
    /// Events for this node, sorted by offset, offsets in `[0, frames)`.
    pub midi_in: &'a [MidiEvent],
    /// Summed sidechain signal when the node has sidechain connections.
    pub sidechain_in: Option<&'a AudioBlock>,
    /// Driver input for this sub-block, used by input sources.
    pub host_input: Option<&'a AudioBlock>,
    pub params: ParamValues<'a>,
}

impl<'a> BlockContext<'a> {
    /// Context with no transport movement, MIDI or parameters. Handy for
    /// driving a node directly.
    pub fn offline(sample_rate: f64, frames: usize) -> Self {
        Self {
            sample_rate,
            frames,
            transport: TransportSnapshot::default(),
            tempo: TempoSnapshot::default(),
            midi_in: &[],
            sidechain_in: None,
            host_input: None,
            params: ParamValues::EMPTY,
        }
    }

    pub fn with_midi(mut self, midi_in: &'a [MidiEvent]) -> Self {
        self.midi_in = midi_in;
        self
    }

    pub fn with_sidechain(mut self, sidechain: &'a AudioBlock) -> Self {
        self.sidechain_in = Some(sidechain);
        self
    }

    pub fn with_params(mut self, params: ParamValues<'a>) -> Self {
        self.params = params;
        self
    }

    pub fn with_host_input(mut self, input: &'a AudioBlock) -> Self {
        self.host_input = Some(input);
        self
    }

    /// Seconds spanned by this block.
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }
}
