//! Audio-thread side of the graph.

use std::sync::Arc;

use cadenza_midi::{MidiBuffer, MidiEvent};

use super::delay::DelayAlign;
use super::{ConnectionKind, NodeId};
use crate::buffer::AudioBlock;
use crate::context::BlockContext;
use crate::event::{Event, EventSink};
use crate::metering::{AtomicLevels, MeterLevels};
use crate::node::{AudioData, NodeFault, NodeKind, Processor};
use crate::param::NodeParams;
use crate::reclaim::{Garbage, GarbageSink};
use crate::spsc::SpscProducer;

/// A node plus every buffer it needs, sized once off-thread.
pub struct NodeSlot {
    id: NodeId,
    kind: NodeKind,
    processor: Box<dyn Processor>,
    inputs: Vec<AudioBlock>,
    outputs: Vec<AudioBlock>,
    sidechain: Option<AudioBlock>,
    sidechain_active: bool,
    midi_in: MidiBuffer,
    midi_out: MidiBuffer,
    accepts_midi: bool,
    params: NodeParams,
    muted: bool,
    failed: bool,
    metered: bool,
    levels: MeterLevels,
}

impl NodeSlot {
    /// Wrap a prepared processor. Allocates; call off the audio thread.
    pub fn new(
        id: NodeId,
        processor: Box<dyn Processor>,
        params: NodeParams,
        max_frames: usize,
        midi_capacity: usize,
    ) -> Self {
        let inputs = processor
            .input_ports()
            .iter()
            .map(|port| AudioBlock::new(port.channels, max_frames))
            .collect();
        let outputs = processor
            .output_ports()
            .iter()
            .map(|port| AudioBlock::new(port.channels, max_frames))
            .collect();
        let sidechain = processor
            .sidechain_port()
            .map(|port| port.channels)
            .or_else(|| processor.supports_sidechain().then_some(2))
            .map(|channels| AudioBlock::new(channels, max_frames));
        Self {
            id,
            kind: processor.kind(),
            accepts_midi: processor.accepts_midi(),
            processor,
            inputs,
            outputs,
            sidechain,
            sidechain_active: false,
            midi_in: MidiBuffer::with_capacity(midi_capacity),
            midi_out: MidiBuffer::with_capacity(midi_capacity),
            params,
            muted: false,
            failed: false,
            metered: false,
            levels: MeterLevels::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn processor(&self) -> &dyn Processor {
        self.processor.as_ref()
    }

    pub fn processor_mut(&mut self) -> &mut dyn Processor {
        self.processor.as_mut()
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn output(&self, port: usize) -> Option<&AudioBlock> {
        self.outputs.get(port)
    }

    pub fn midi_output(&self) -> &MidiBuffer {
        &self.midi_out
    }

    /// Clear processor state, buffers and the fault flag. Off-thread only.
    pub fn reset(&mut self) {
        self.processor.reset();
        for block in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            block.clear();
        }
        if let Some(sidechain) = &mut self.sidechain {
            sidechain.clear();
        }
        self.midi_in.clear();
        self.midi_out.clear();
        self.failed = false;
        self.levels = MeterLevels::new();
    }

    pub fn into_processor(self) -> Box<dyn Processor> {
        self.processor
    }

    fn silence(&mut self, frames: usize) {
        for out in &mut self.outputs {
            out.set_frames(frames);
            out.clear_active();
        }
        self.midi_out.clear();
    }

    fn run(&mut self, base: &BlockContext<'_>, frames: usize, events: &mut dyn EventSink) {
        self.silence(frames);
        if self.muted || self.failed {
            self.midi_in.clear();
            return;
        }

        self.params.begin_block(frames);
        let result = {
            let Self {
                processor,
                inputs,
                outputs,
                sidechain,
                sidechain_active,
                midi_in,
                midi_out,
                params,
                ..
            } = self;
            let ctx = BlockContext {
                frames,
                midi_in: midi_in.as_slice(),
                sidechain_in: if *sidechain_active {
                    sidechain.as_ref()
                } else {
                    None
                },
                params: params.view(frames),
                ..*base
            };
            processor
                .process(&ctx, inputs, outputs, midi_out)
                .and_then(|()| {
                    if outputs.iter().all(AudioBlock::is_finite) {
                        Ok(())
                    } else {
                        Err(NodeFault::NonFinite)
                    }
                })
        };
        self.midi_in.clear();

        if let Err(fault) = result {
            self.failed = true;
            self.silence(frames);
            events.emit(Event::NodeFailed {
                node: self.id,
                fault,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ChannelMap {
    Direct,
    /// Mono source copied onto every destination channel.
    Widen,
    /// Every source channel averaged into a mono destination.
    MixDown,
}

pub(super) struct Feed {
    pub(super) kind: ConnectionKind,
    pub(super) source_slot: usize,
    pub(super) source_port: usize,
    pub(super) dest_port: usize,
    pub(super) gain: f32,
    pub(super) map: ChannelMap,
    pub(super) align: Option<DelayAlign>,
}

pub(super) struct Step {
    pub(super) node: NodeId,
    pub(super) slot: usize,
    pub(super) feeds: Vec<Feed>,
}

/// Immutable execution plan: node order, input feeds and delay stages.
///
/// Built by [`GraphEditor::compile`](super::GraphEditor::compile) and owned
/// by the audio thread once swapped in. The delay lines are the only state
/// that changes while it runs.
pub struct CompiledGraph {
    pub(super) generation: u64,
    pub(super) steps: Vec<Step>,
    pub(super) lookup: Vec<(NodeId, usize)>,
    pub(super) master_slot: Option<usize>,
    pub(super) total_latency: usize,
}

impl CompiledGraph {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            steps: Vec::new(),
            lookup: Vec::new(),
            master_slot: None,
            total_latency: 0,
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn total_latency(&self) -> usize {
        self.total_latency
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Node ids in execution order.
    pub fn order(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.steps.iter().map(|step| step.node)
    }

    pub fn slot_of(&self, node: NodeId) -> Option<usize> {
        self.lookup
            .binary_search_by_key(&node, |&(id, _)| id)
            .ok()
            .map(|i| self.lookup[i].1)
    }

    /// Delay inserted on each feed of `node`, in feed order.
    pub fn compensation_for(&self, node: NodeId) -> Vec<usize> {
        self.steps
            .iter()
            .find(|step| step.node == node)
            .map(|step| {
                step.feeds
                    .iter()
                    .map(|feed| feed.align.as_ref().map_or(0, DelayAlign::delay_samples))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Edits the audio thread applies between blocks.
pub enum GraphCommand {
    InsertNode { slot: usize, node: Box<NodeSlot> },
    RemoveNode { slot: usize },
    /// Hand the node back to the control thread, e.g. for an off-thread reset.
    ReturnNode { slot: usize },
    Swap(Box<CompiledGraph>),
    SetMuted { slot: usize, muted: bool },
    SetMetered { slot: usize, metered: bool },
    ClearFault { slot: usize },
    SetParameter {
        slot: usize,
        index: usize,
        value: f32,
        ramp_samples: u32,
    },
    DeliverBuffer { slot: usize, buffer: Box<AudioData> },
}

impl GraphCommand {
    /// Whether applying the command hands an object to the garbage queue.
    fn produces_garbage(&self) -> bool {
        matches!(
            self,
            GraphCommand::InsertNode { .. }
                | GraphCommand::RemoveNode { .. }
                | GraphCommand::Swap(_)
                | GraphCommand::DeliverBuffer { .. }
        )
    }
}

/// Owns every node on the audio thread and runs the compiled plan.
pub struct GraphRuntime {
    slots: Vec<Option<Box<NodeSlot>>>,
    graph: Box<CompiledGraph>,
    garbage: GarbageSink,
    returns: SpscProducer<Box<NodeSlot>>,
    master_levels: Arc<AtomicLevels>,
    metering_interval: u64,
    blocks: u64,
}

impl GraphRuntime {
    pub fn new(
        max_nodes: usize,
        garbage: GarbageSink,
        returns: SpscProducer<Box<NodeSlot>>,
        master_levels: Arc<AtomicLevels>,
        metering_interval: u32,
    ) -> Self {
        Self {
            slots: (0..max_nodes).map(|_| None).collect(),
            graph: Box::new(CompiledGraph::empty()),
            garbage,
            returns,
            master_levels,
            metering_interval: u64::from(metering_interval.max(1)),
            blocks: 0,
        }
    }

    #[inline]
    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    pub fn node(&self, slot: usize) -> Option<&NodeSlot> {
        self.slots.get(slot).and_then(|s| s.as_deref())
    }

    /// Hand an object to the control thread for destruction.
    #[inline]
    pub fn retire(&mut self, item: Garbage) -> Result<(), Garbage> {
        self.garbage.push(item)
    }

    #[inline]
    pub fn can_retire(&self, count: usize) -> bool {
        self.garbage.has_room(count)
    }

    /// Apply one edit. The command is handed back untouched when the
    /// garbage or return queue has no room; retry it next block.
    pub fn apply(
        &mut self,
        command: GraphCommand,
        events: &mut dyn EventSink,
    ) -> Result<(), GraphCommand> {
        if command.produces_garbage() && !self.garbage.has_room(1) {
            return Err(command);
        }

        match command {
            GraphCommand::InsertNode { slot, node } => {
                if let Some(cell) = self.slots.get_mut(slot) {
                    if let Some(old) = cell.replace(node) {
                        let _ = self.garbage.push(old);
                    }
                } else {
                    let _ = self.garbage.push(node);
                }
            }
            GraphCommand::RemoveNode { slot } => {
                if let Some(old) = self.slots.get_mut(slot).and_then(Option::take) {
                    let _ = self.garbage.push(old);
                }
            }
            GraphCommand::ReturnNode { slot } => {
                if self.returns.is_full() {
                    return Err(GraphCommand::ReturnNode { slot });
                }
                if let Some(node) = self.slots.get_mut(slot).and_then(Option::take) {
                    let _ = self.returns.try_push(node);
                }
            }
            GraphCommand::Swap(next) => {
                let generation = next.generation;
                let old = core::mem::replace(&mut self.graph, next);
                let _ = self.garbage.push(old);
                events.emit(Event::GraphSwapped { generation });
            }
            GraphCommand::SetMuted { slot, muted } => {
                if let Some(node) = self.slot_mut(slot) {
                    node.muted = muted;
                }
            }
            GraphCommand::SetMetered { slot, metered } => {
                if let Some(node) = self.slot_mut(slot) {
                    node.metered = metered;
                    node.levels = MeterLevels::new();
                }
            }
            GraphCommand::ClearFault { slot } => {
                if let Some(node) = self.slot_mut(slot) {
                    node.failed = false;
                }
            }
            GraphCommand::SetParameter {
                slot,
                index,
                value,
                ramp_samples,
            } => {
                if let Some(node) = self.slot_mut(slot) {
                    node.params.set_target(index, value, ramp_samples);
                }
            }
            GraphCommand::DeliverBuffer { slot, buffer } => {
                let leftover = match self.slot_mut(slot) {
                    Some(node) => node.processor.accept_buffer(buffer),
                    None => Some(buffer),
                };
                if let Some(buffer) = leftover {
                    let _ = self.garbage.push(buffer);
                }
            }
        }
        Ok(())
    }

    fn slot_mut(&mut self, slot: usize) -> Option<&mut NodeSlot> {
        self.slots.get_mut(slot).and_then(|s| s.as_deref_mut())
    }

    /// MIDI input of `node` for the next [`process`](Self::process) call.
    pub fn midi_input_mut(&mut self, node: NodeId) -> Option<&mut MidiBuffer> {
        let slot = self.graph.slot_of(node)?;
        self.slot_mut(slot).map(|s| &mut s.midi_in)
    }

    /// Queue `event` on every node that consumes MIDI. Used for
    /// all-notes-off when the transport stops.
    pub fn broadcast_midi(&mut self, event: MidiEvent) {
        for step in &self.graph.steps {
            if let Some(node) = self.slots.get_mut(step.slot).and_then(|s| s.as_deref_mut()) {
                if node.accepts_midi {
                    let _ = node.midi_in.insert_sorted(event);
                }
            }
        }
    }

    /// Run every node once over `frames` frames.
    pub fn process(&mut self, base: &BlockContext<'_>, frames: usize, events: &mut dyn EventSink) {
        let Self { slots, graph, .. } = self;
        let master = graph.master_slot;

        for step in graph.steps.iter_mut() {
            let Some(mut node) = slots.get_mut(step.slot).and_then(Option::take) else {
                continue;
            };
            gather(&mut node, &mut step.feeds, slots, frames);
            node.run(base, frames, events);
            if node.metered || Some(step.slot) == master {
                if let Some(out) = node.outputs.first() {
                    node.levels.accumulate(out);
                }
            }
            slots[step.slot] = Some(node);
        }
    }

    /// Output of the master node from the last `process` call.
    pub fn master_output(&self) -> Option<&AudioBlock> {
        let slot = self.graph.master_slot?;
        self.node(slot).and_then(|node| node.outputs.first())
    }

    /// Close a driver block: publish meters every `metering_interval` blocks.
    pub fn end_block(&mut self, events: &mut dyn EventSink) {
        self.blocks += 1;
        if self.blocks % self.metering_interval != 0 {
            return;
        }
        let master = self.graph.master_slot;
        for step in &self.graph.steps {
            let Some(node) = self.slots.get_mut(step.slot).and_then(|s| s.as_deref_mut()) else {
                continue;
            };
            let is_master = Some(step.slot) == master;
            if !(node.metered || is_master) {
                continue;
            }
            let reading = node.levels.take();
            if is_master {
                self.master_levels.set(reading);
            }
            events.emit(Event::metering(node.id, reading));
        }
    }
}

fn gather(
    node: &mut NodeSlot,
    feeds: &mut [Feed],
    slots: &[Option<Box<NodeSlot>>],
    frames: usize,
) {
    for input in &mut node.inputs {
        input.set_frames(frames);
        input.clear_active();
    }
    if let Some(sidechain) = &mut node.sidechain {
        sidechain.set_frames(frames);
        sidechain.clear_active();
    }
    node.sidechain_active = false;

    for feed in feeds {
        let Some(source) = slots.get(feed.source_slot).and_then(|s| s.as_deref()) else {
            continue;
        };
        match feed.kind {
            ConnectionKind::Midi => {
                for event in source.midi_out.iter() {
                    if node.midi_in.insert_sorted(*event).is_err() {
                        break;
                    }
                }
            }
            ConnectionKind::Audio | ConnectionKind::Sidechain => {
                let Some(block) = source.outputs.get(feed.source_port) else {
                    continue;
                };
                let block = match &mut feed.align {
                    Some(align) => align.process(block, frames),
                    None => block,
                };
                let dest = if feed.kind == ConnectionKind::Audio {
                    node.inputs.get_mut(feed.dest_port)
                } else {
                    node.sidechain_active = true;
                    node.sidechain.as_mut()
                };
                if let Some(dest) = dest {
                    mix_into(dest, block, feed.map, feed.gain);
                }
            }
        }
    }
}

fn mix_into(dest: &mut AudioBlock, source: &AudioBlock, map: ChannelMap, gain: f32) {
    match map {
        ChannelMap::Direct => {
            for ch in 0..dest.channels().min(source.channels()) {
                dest.add_from(ch, source, ch, gain);
            }
        }
        ChannelMap::Widen => {
            for ch in 0..dest.channels() {
                dest.add_from(ch, source, 0, gain);
            }
        }
        ChannelMap::MixDown => {
            let scaled = gain / source.channels().max(1) as f32;
            for ch in 0..source.channels() {
                dest.add_from(0, source, ch, scaled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::node::PrepareContext;
    use crate::reclaim::{Epoch, Reclaimer};
    use crate::spsc::spsc;

    struct Constant(f32);

    impl Processor for Constant {
        fn kind(&self) -> NodeKind {
            NodeKind::Source
        }

        fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> Result<()> {
            Ok(())
        }

        fn reset(&mut self) {}

        fn process(
            &mut self,
            _ctx: &BlockContext<'_>,
            _inputs: &[AudioBlock],
            outputs: &mut [AudioBlock],
            _midi_out: &mut MidiBuffer,
        ) -> core::result::Result<(), NodeFault> {
            for out in outputs {
                for ch in 0..out.channels() {
                    out.channel_mut(ch).fill(self.0);
                }
            }
            Ok(())
        }
    }

    fn runtime() -> (GraphRuntime, Reclaimer) {
        let (reclaimer, sink) = Reclaimer::new(Epoch::new(), 16);
        let (returns, _rx) = spsc(4);
        let runtime = GraphRuntime::new(8, sink, returns, Arc::new(AtomicLevels::new()), 1);
        (runtime, reclaimer)
    }

    #[test]
    fn test_insert_and_remove_route_old_nodes_to_garbage() {
        let (mut rt, mut reclaimer) = runtime();
        let mut events = Vec::new();
        let node = NodeSlot::new(NodeId(1), Box::new(Constant(0.5)), NodeParams::empty(), 64, 8);
        rt.apply(
            GraphCommand::InsertNode {
                slot: 0,
                node: Box::new(node),
            },
            &mut events,
        )
        .ok()
        .unwrap();
        assert!(rt.node(0).is_some());

        rt.apply(GraphCommand::RemoveNode { slot: 0 }, &mut events)
            .ok()
            .unwrap();
        assert!(rt.node(0).is_none());
        reclaimer.collect();
        assert_eq!(reclaimer.pending(), 0);
    }

    #[test]
    fn test_mix_policies() {
        let mono = AudioBlock::filled(1, 4, 0.5);
        let stereo = AudioBlock::filled(2, 4, 0.5);

        let mut dest = AudioBlock::new(2, 4);
        mix_into(&mut dest, &mono, ChannelMap::Widen, 1.0);
        assert_eq!(dest.channel(1), &[0.5; 4]);

        let mut dest = AudioBlock::new(1, 4);
        mix_into(&mut dest, &stereo, ChannelMap::MixDown, 1.0);
        assert_eq!(dest.channel(0), &[0.5; 4]);

        let mut dest = AudioBlock::new(2, 4);
        mix_into(&mut dest, &stereo, ChannelMap::Direct, 0.5);
        assert_eq!(dest.channel(0), &[0.25; 4]);
    }

    #[test]
    fn test_slot_reset_clears_fault() {
        let mut node = NodeSlot::new(NodeId(3), Box::new(Constant(1.0)), NodeParams::empty(), 16, 4);
        node.failed = true;
        node.reset();
        assert!(!node.is_failed());
    }
}
