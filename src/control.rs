//! Control side of the engine: graph editing, transport requests, time map
//! and arrangement publishing, recording setup and event delivery.
//!
//! Every method here runs off the audio thread and may allocate. Edits are
//! validated synchronously, then either published as an immutable snapshot
//! or queued as a [`Command`] for the next block.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use cadenza_core::{
    AtomicLevels, AudioData, Completion, Connection, ConnectionId, ConnectionKind, CurveKind,
    EngineConfig, Event, GraphCommand, GraphEditor, JobHandle, JobOutcome, LoopRegion, Marker,
    MeterChange, MeterReading, NodeId, NodeInfo, NodeSlot, ParameterHandle, PortIndex,
    PrepareContext, Processor, Reclaimer, Services, SpscConsumer, SpscProducer, StemSeparator,
    TempoPoint, TimeMap, TransportCommand, TransportInfo, CancelToken,
};
use cadenza_recorder::{RecordMode, RecorderCommand, TakeBuffer, TakeView, TakeWriter};
use cadenza_sequencer::{
    Arrangement, ArrangementSnapshot, InstanceId, PatternEvent, PatternId, StepPattern,
};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::{Error, Result};

type CoreError = cadenza_core::Error;

/// Everything the builder hands over when it splits an engine in two.
pub(crate) struct ControlParts {
    pub config: EngineConfig,
    pub commands: SpscProducer<Command>,
    pub events: SpscConsumer<Event>,
    pub returns: SpscConsumer<Box<NodeSlot>>,
    pub editor: GraphEditor,
    pub reclaimer: Reclaimer,
    pub services: Services,
    pub time_map: TimeMap,
    pub shared_map: Arc<ArcSwap<TimeMap>>,
    pub shared_arrangement: Arc<ArcSwap<ArrangementSnapshot>>,
    pub info: Arc<TransportInfo>,
    pub master_levels: Arc<AtomicLevels>,
}

/// Non-real-time half of the engine.
///
/// Owns the graph model, parameter handles, the master copies of the time
/// map and arrangement, and the take buffers. Call
/// [`maintain`](Self::maintain) regularly (e.g. from a UI timer) to free
/// objects the audio thread has finished with.
pub struct Controller {
    config: EngineConfig,
    commands: SpscProducer<Command>,
    events: SpscConsumer<Event>,
    returns: SpscConsumer<Box<NodeSlot>>,
    editor: GraphEditor,
    params: BTreeMap<NodeId, ParameterHandle>,
    reclaimer: Reclaimer,
    services: Services,
    time_map: TimeMap,
    shared_map: Arc<ArcSwap<TimeMap>>,
    arrangement: Arrangement,
    shared_arrangement: Arc<ArcSwap<ArrangementSnapshot>>,
    info: Arc<TransportInfo>,
    master_levels: Arc<AtomicLevels>,
    loop_region: LoopRegion,
    record_mode: RecordMode,
    takes: Vec<Option<Arc<TakeBuffer>>>,
    /// Replaced takes the audio thread may still hold.
    retired_takes: Vec<Arc<TakeBuffer>>,
    /// Nodes handed back for a reset, waiting for queue room to go home.
    reinserts: Vec<(usize, Box<NodeSlot>)>,
}

impl Controller {
    pub(crate) fn new(parts: ControlParts) -> Self {
        let ControlParts {
            config,
            commands,
            events,
            returns,
            editor,
            reclaimer,
            services,
            time_map,
            shared_map,
            shared_arrangement,
            info,
            master_levels,
        } = parts;
        Self {
            takes: vec![None; config.recording_tracks],
            config,
            commands,
            events,
            returns,
            editor,
            params: BTreeMap::new(),
            reclaimer,
            services,
            time_map,
            shared_map,
            arrangement: Arrangement::new(),
            shared_arrangement,
            info,
            master_levels,
            loop_region: LoopRegion::default(),
            record_mode: RecordMode::Normal,
            retired_takes: Vec::new(),
            reinserts: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    // -- command plumbing ----------------------------------------------------

    fn send(&mut self, command: impl Into<Command>) -> Result<()> {
        self.commands.try_push(command.into()).map_err(|rejected| {
            warn!(command = rejected.label(), "command queue full");
            CoreError::CapacityExceeded("command queue").into()
        })
    }

    /// Fail before touching any state when `count` commands would not fit.
    /// We are the only producer, so the room cannot shrink afterwards.
    fn reserve(&self, count: usize) -> Result<()> {
        if self.commands.free_slots() < count {
            warn!(needed = count, "command queue full");
            return Err(CoreError::CapacityExceeded("command queue").into());
        }
        Ok(())
    }

    fn slot_of(&self, node: NodeId) -> Result<usize> {
        self.editor
            .node(node)
            .map(|info| info.slot)
            .ok_or_else(|| CoreError::UnknownNode(node).into())
    }

    fn publish_graph(&mut self) -> Result<()> {
        let graph = self.editor.compile();
        debug!(generation = graph.generation(), nodes = graph.len(), "publishing graph");
        self.send(GraphCommand::Swap(graph))
    }

    // -- graph ---------------------------------------------------------------

    /// Prepare `processor` and add it to the graph. The node starts
    /// unconnected; the first node of kind `Master` becomes the graph output.
    pub fn add_node(&mut self, mut processor: Box<dyn Processor>) -> Result<NodeId> {
        self.reserve(2)?;
        processor.prepare(&PrepareContext {
            sample_rate: self.config.sample_rate,
            max_frames: self.config.max_block_size,
            max_channels: self.config.max_channels,
            services: &self.services,
        })?;
        let info = self.editor.add_node(processor.as_ref())?;
        let (handle, params) =
            ParameterHandle::new(info.id, info.parameters.clone(), self.config.max_block_size);
        let node = Box::new(NodeSlot::new(
            info.id,
            processor,
            params,
            self.config.max_block_size,
            self.config.midi_events_per_track,
        ));
        self.params.insert(info.id, handle);

        self.send(GraphCommand::InsertNode {
            slot: info.slot,
            node,
        })?;
        self.publish_graph()?;
        info!(node = %info.id, name = %info.name, latency = info.latency, "node added");
        Ok(info.id)
    }

    /// Remove a node and every connection touching it. Returns the dropped
    /// connections.
    pub fn remove_node(&mut self, node: NodeId) -> Result<Vec<Connection>> {
        self.reserve(2)?;
        let (info, removed) = self.editor.remove_node(node)?;
        self.params.remove(&node);
        self.send(GraphCommand::RemoveNode { slot: info.slot })?;
        self.publish_graph()?;
        info!(node = %node, connections = removed.len(), "node removed");
        Ok(removed)
    }

    pub fn connect(
        &mut self,
        source: NodeId,
        source_port: PortIndex,
        dest: NodeId,
        dest_port: PortIndex,
    ) -> Result<ConnectionId> {
        self.connect_kind(source, source_port, dest, dest_port, ConnectionKind::Audio)
    }

    /// Route `source`'s port into `dest`'s sidechain input.
    pub fn connect_sidechain(
        &mut self,
        source: NodeId,
        source_port: PortIndex,
        dest: NodeId,
    ) -> Result<ConnectionId> {
        self.connect_kind(source, source_port, dest, 0, ConnectionKind::Sidechain)
    }

    /// Route `source`'s MIDI output into `dest`'s MIDI input.
    pub fn connect_midi(&mut self, source: NodeId, dest: NodeId) -> Result<ConnectionId> {
        self.connect_kind(source, 0, dest, 0, ConnectionKind::Midi)
    }

    pub fn connect_kind(
        &mut self,
        source: NodeId,
        source_port: PortIndex,
        dest: NodeId,
        dest_port: PortIndex,
        kind: ConnectionKind,
    ) -> Result<ConnectionId> {
        self.reserve(1)?;
        let id = self
            .editor
            .connect(source, source_port, dest, dest_port, kind)?;
        self.publish_graph()?;
        debug!(%source, %dest, ?kind, "connected");
        Ok(id)
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Result<Connection> {
        self.reserve(1)?;
        let removed = self.editor.disconnect(id)?;
        self.publish_graph()?;
        Ok(removed)
    }

    pub fn set_connection_gain(&mut self, id: ConnectionId, gain_db: f32) -> Result<()> {
        self.reserve(1)?;
        self.editor.set_connection_gain(id, gain_db)?;
        self.publish_graph()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeInfo> {
        self.editor.node(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.editor.nodes()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.editor.connections()
    }

    pub fn master(&self) -> Option<NodeId> {
        self.editor.master()
    }

    /// Node ids in processing order.
    pub fn processing_order(&self) -> Vec<NodeId> {
        self.editor.order()
    }

    /// Latency from the deepest source to the master, in samples.
    pub fn total_latency(&self) -> usize {
        self.editor.latency().total
    }

    // -- node state ----------------------------------------------------------

    /// Set a parameter. `ramp_ms == 0` publishes a stepped value for the next
    /// block; otherwise the audio thread ramps linearly over `ramp_ms`.
    /// Returns the value after clamping to the parameter's range.
    pub fn set_parameter(
        &mut self,
        node: NodeId,
        param: u32,
        value: f32,
        ramp_ms: f32,
    ) -> Result<f32> {
        if !value.is_finite() || !ramp_ms.is_finite() || ramp_ms < 0.0 {
            return Err(CoreError::InvalidArgument(format!(
                "parameter {param} value {value} with ramp {ramp_ms} ms"
            ))
            .into());
        }
        let slot = self.slot_of(node)?;
        if ramp_ms == 0.0 {
            let handle = self
                .params
                .get_mut(&node)
                .ok_or(CoreError::UnknownNode(node))?;
            return Ok(handle.set_stepped(param, value, &mut self.reclaimer)?);
        }

        self.reserve(1)?;
        let handle = self
            .params
            .get_mut(&node)
            .ok_or(CoreError::UnknownNode(node))?;
        let (index, value) = handle.set_continuous(param, value)?;
        let ramp_samples = (f64::from(ramp_ms) * 1e-3 * self.config.sample_rate).round() as u32;
        self.send(GraphCommand::SetParameter {
            slot,
            index,
            value,
            ramp_samples,
        })?;
        Ok(value)
    }

    /// Set several stepped parameters of one node in a single snapshot.
    pub fn set_parameters(&mut self, node: NodeId, values: &[(u32, f32)]) -> Result<()> {
        let handle = self
            .params
            .get_mut(&node)
            .ok_or(CoreError::UnknownNode(node))?;
        handle.set_many(values, &mut self.reclaimer)?;
        Ok(())
    }

    /// Latest value requested for a parameter.
    pub fn parameter(&self, node: NodeId, param: u32) -> Result<f32> {
        let handle = self.params.get(&node).ok_or(CoreError::UnknownNode(node))?;
        Ok(handle.value(param)?)
    }

    pub fn parameters(&self, node: NodeId) -> Result<Vec<(u32, f32)>> {
        let handle = self.params.get(&node).ok_or(CoreError::UnknownNode(node))?;
        Ok(handle.values().collect())
    }

    pub fn set_node_muted(&mut self, node: NodeId, muted: bool) -> Result<()> {
        let slot = self.slot_of(node)?;
        self.send(GraphCommand::SetMuted { slot, muted })
    }

    /// Publish `Metering` events for this node.
    pub fn set_node_metered(&mut self, node: NodeId, metered: bool) -> Result<()> {
        let slot = self.slot_of(node)?;
        self.send(GraphCommand::SetMetered { slot, metered })
    }

    /// Let a faulted node run again. Its state is kept; use
    /// [`reset_node`](Self::reset_node) to clear it.
    pub fn clear_fault(&mut self, node: NodeId) -> Result<()> {
        let slot = self.slot_of(node)?;
        self.send(GraphCommand::ClearFault { slot })
    }

    /// Bring the node back to this thread, reset it and re-insert it. The
    /// node is silent for the blocks in between.
    pub fn reset_node(&mut self, node: NodeId) -> Result<()> {
        let slot = self.slot_of(node)?;
        self.send(GraphCommand::ReturnNode { slot })?;
        debug!(%node, "node reset requested");
        Ok(())
    }

    /// Hand a buffer (e.g. a worker job result) to the node's
    /// [`Processor::accept_buffer`].
    pub fn deliver_buffer(&mut self, node: NodeId, buffer: AudioData) -> Result<()> {
        let slot = self.slot_of(node)?;
        self.send(GraphCommand::DeliverBuffer {
            slot,
            buffer: Box::new(buffer),
        })
    }

    // -- transport -----------------------------------------------------------

    pub fn play(&mut self) -> Result<()> {
        self.send(TransportCommand::Play)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.send(TransportCommand::Stop)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.send(TransportCommand::Pause)
    }

    /// Start recording at `start_beat`, rolling `preroll_bars` bars early.
    pub fn record(&mut self, start_beat: f64, preroll_bars: u32) -> Result<()> {
        check_beat(start_beat)?;
        self.send(TransportCommand::Record {
            start_beat,
            preroll_bars,
        })
    }

    pub fn seek(&mut self, beat: f64) -> Result<()> {
        check_beat(beat)?;
        self.send(TransportCommand::Seek(beat))
    }

    /// Seek to the start of a (zero-based) bar.
    pub fn seek_bar(&mut self, bar: f64) -> Result<()> {
        let beat = self.time_map.bar_to_beat(bar);
        self.seek(beat)
    }

    pub fn set_loop(&mut self, start_beat: f64, end_beat: f64, enabled: bool) -> Result<()> {
        let region = LoopRegion::new(start_beat, end_beat, enabled)?;
        self.send(TransportCommand::SetLoop(region))?;
        self.loop_region = region;
        Ok(())
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) -> Result<()> {
        let region = LoopRegion {
            enabled,
            ..self.loop_region
        };
        region.validate()?;
        self.send(TransportCommand::SetLoop(region))?;
        self.loop_region = region;
        Ok(())
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Lock-free view of what the audio thread last published.
    pub fn transport(&self) -> &TransportInfo {
        &self.info
    }

    pub fn master_levels(&self) -> MeterReading {
        self.master_levels.get()
    }

    // -- time map ------------------------------------------------------------

    pub fn time_map(&self) -> &TimeMap {
        &self.time_map
    }

    /// Set the tempo at beat 0.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        self.set_tempo_point(0.0, bpm, CurveKind::Step)
    }

    pub fn set_tempo_point(&mut self, beat: f64, bpm: f64, curve: CurveKind) -> Result<()> {
        self.edit_time_map(|map| map.add_tempo_point(TempoPoint::new(beat, bpm, curve)))
    }

    pub fn remove_tempo_point(&mut self, beat: f64) -> Result<()> {
        self.edit_time_map(|map| map.remove_tempo_point(beat).map(drop))
    }

    /// Change the meter from `bar` onward.
    pub fn set_meter(&mut self, bar: f64, numerator: u32, denominator: u32) -> Result<()> {
        let beat = self.time_map.bar_to_beat(bar);
        let change = MeterChange::new(beat, numerator, denominator)?;
        self.edit_time_map(|map| map.add_meter_change(change))
    }

    pub fn remove_meter_change(&mut self, beat: f64) -> Result<()> {
        self.edit_time_map(|map| map.remove_meter_change(beat).map(drop))
    }

    pub fn add_marker(&mut self, marker: Marker) -> Result<()> {
        self.edit_time_map(|map| map.add_marker(marker))
    }

    pub fn remove_marker(&mut self, beat: f64) -> Result<()> {
        self.edit_time_map(|map| map.remove_marker(beat).map(drop))
    }

    /// Replace the whole time map. Its sample rate is forced to the
    /// engine's.
    pub fn set_time_map(&mut self, mut map: TimeMap) -> Result<()> {
        map.set_sample_rate(self.config.sample_rate);
        self.edit_time_map(move |current| {
            *current = map;
            Ok(())
        })
    }

    fn edit_time_map(
        &mut self,
        edit: impl FnOnce(&mut TimeMap) -> cadenza_core::Result<()>,
    ) -> Result<()> {
        self.reserve(1)?;
        let mut next = self.time_map.clone();
        edit(&mut next)?;
        self.time_map = next.clone();
        let previous = self.shared_map.swap(Arc::new(next));
        self.reclaimer.retire(previous);
        // Bar positions resolve against the new map.
        self.publish_arrangement();
        self.send(Command::TempoMapChanged)?;
        debug!(
            tempo_points = self.time_map.tempo().points().len(),
            meter_changes = self.time_map.meter().changes().len(),
            "time map published"
        );
        Ok(())
    }

    // -- arrangement ---------------------------------------------------------

    pub fn arrangement(&self) -> &Arrangement {
        &self.arrangement
    }

    /// Apply `edit` to a copy of the arrangement and publish it. A failing
    /// edit leaves the arrangement untouched.
    pub fn edit_arrangement<R>(
        &mut self,
        edit: impl FnOnce(&mut Arrangement) -> cadenza_sequencer::Result<R>,
    ) -> Result<R> {
        let mut next = self.arrangement.clone();
        let out = edit(&mut next)?;
        if next.tracks().len() > self.config.sequencer_tracks {
            return Err(cadenza_sequencer::Error::CapacityExceeded("sequencer tracks").into());
        }
        self.arrangement = next;
        self.publish_arrangement();
        Ok(out)
    }

    /// Replace the whole arrangement.
    pub fn set_arrangement(&mut self, arrangement: Arrangement) -> Result<()> {
        self.edit_arrangement(move |current| {
            *current = arrangement;
            Ok(())
        })
    }

    pub fn add_track(&mut self, name: &str) -> Result<usize> {
        self.edit_arrangement(|arr| Ok(arr.add_track(name)))
    }

    /// Send the track's MIDI to `node`, or nowhere.
    pub fn set_track_target(&mut self, track: usize, node: Option<NodeId>) -> Result<()> {
        if let Some(id) = node {
            self.slot_of(id)?;
        }
        self.edit_arrangement(|arr| arr.set_track_target(track, node))
    }

    pub fn set_track_muted(&mut self, track: usize, muted: bool) -> Result<()> {
        self.edit_arrangement(|arr| arr.set_track_muted(track, muted))
    }

    pub fn set_step_pattern(&mut self, track: usize, steps: Option<StepPattern>) -> Result<()> {
        self.edit_arrangement(|arr| arr.set_step_pattern(track, steps))
    }

    pub fn create_pattern(&mut self, name: &str, length_bars: f64) -> Result<PatternId> {
        self.edit_arrangement(|arr| arr.patterns_mut().create(name, length_bars))
    }

    pub fn add_pattern_event(&mut self, pattern: PatternId, event: PatternEvent) -> Result<usize> {
        self.edit_arrangement(|arr| arr.patterns_mut().get_mut(pattern)?.add_event(event))
    }

    /// Place `pattern` on `track` starting at `start_bar`.
    pub fn place_pattern(
        &mut self,
        pattern: PatternId,
        track: usize,
        start_bar: f64,
    ) -> Result<InstanceId> {
        self.edit_arrangement(|arr| arr.create_instance(pattern, track, start_bar))
    }

    fn publish_arrangement(&mut self) {
        let snapshot = self.arrangement.snapshot(&self.time_map);
        let previous = self.shared_arrangement.swap(Arc::new(snapshot));
        self.reclaimer.retire(previous);
    }

    /// Release every sounding sequencer note and send all-notes-off to
    /// every MIDI consumer.
    pub fn panic(&mut self) -> Result<()> {
        self.send(Command::PanicMidi)
    }

    // -- recording -----------------------------------------------------------

    fn check_track(&self, track: usize) -> Result<()> {
        if track >= self.takes.len() {
            return Err(cadenza_recorder::Error::UnknownTrack(track).into());
        }
        Ok(())
    }

    /// Allocate a take of `channels` channels for `track` and hand it over.
    fn attach_take(&mut self, track: usize, channels: usize) -> Result<()> {
        self.reserve(1)?;
        let capacity = self.config.recording_capacity_frames();
        let take = Arc::new(TakeBuffer::new(channels, capacity, self.config.sample_rate));
        self.send(RecorderCommand::Attach {
            track,
            take: take.clone(),
        })?;
        if let Some(previous) = self.takes[track].replace(take) {
            self.retired_takes.push(previous);
        }
        debug!(track, channels, capacity, "take attached");
        Ok(())
    }

    /// Arm or disarm a track. The first arm allocates a mono take.
    pub fn arm_track(&mut self, track: usize, armed: bool) -> Result<()> {
        self.check_track(track)?;
        if armed && self.takes[track].is_none() {
            // Attach and Arm travel as a pair.
            self.reserve(2)?;
            self.attach_take(track, 1)?;
        }
        self.send(RecorderCommand::Arm { track, armed })
    }

    /// Record `channels` consecutive host inputs on `track`. Replaces the
    /// track's take.
    pub fn set_take_channels(&mut self, track: usize, channels: usize) -> Result<()> {
        self.check_track(track)?;
        if channels == 0 || channels > self.config.max_channels {
            return Err(cadenza_recorder::Error::InvalidArgument(format!(
                "take channel count {channels} outside 1..={}",
                self.config.max_channels
            ))
            .into());
        }
        self.attach_take(track, channels)
    }

    pub fn set_monitoring(&mut self, track: usize, monitoring: bool) -> Result<()> {
        self.check_track(track)?;
        self.send(RecorderCommand::SetMonitoring { track, monitoring })
    }

    /// First host input channel recorded by `track`.
    pub fn set_record_input(&mut self, track: usize, first_channel: usize) -> Result<()> {
        self.check_track(track)?;
        if first_channel >= self.config.max_channels {
            return Err(cadenza_recorder::Error::InvalidArgument(format!(
                "input channel {first_channel} out of range"
            ))
            .into());
        }
        self.send(RecorderCommand::SetInput {
            track,
            first_channel,
        })
    }

    pub fn set_record_volume(&mut self, track: usize, gain: f32) -> Result<()> {
        self.check_track(track)?;
        if !gain.is_finite() || gain < 0.0 {
            return Err(
                cadenza_recorder::Error::InvalidArgument(format!("record volume {gain}")).into(),
            );
        }
        self.send(RecorderCommand::SetVolume { track, gain })
    }

    pub fn set_record_mode(&mut self, mode: RecordMode) -> Result<()> {
        if let RecordMode::AutoPunch {
            punch_in,
            punch_out,
        } = mode
        {
            if punch_in >= punch_out {
                return Err(cadenza_recorder::Error::InvalidArgument(format!(
                    "punch range {punch_in}..{punch_out} is empty"
                ))
                .into());
            }
        }
        self.send(RecorderCommand::SetMode(mode))?;
        self.record_mode = mode;
        Ok(())
    }

    /// Auto-punch between two beats, resolved against the current time map.
    pub fn set_punch_range(&mut self, in_beat: f64, out_beat: f64) -> Result<()> {
        check_beat(in_beat)?;
        check_beat(out_beat)?;
        self.set_record_mode(RecordMode::AutoPunch {
            punch_in: self.time_map.beat_to_sample_index(in_beat),
            punch_out: self.time_map.beat_to_sample_index(out_beat),
        })
    }

    pub fn record_mode(&self) -> RecordMode {
        self.record_mode
    }

    /// Read-only view of `track`'s last take. Fails with `TakeBusy` while
    /// the take is being written.
    pub fn take_view(&self, track: usize) -> Result<TakeView> {
        self.check_track(track)?;
        let take = self.takes[track]
            .clone()
            .ok_or(cadenza_recorder::Error::NoTake(track))?;
        Ok(TakeView::open(take).ok_or(cadenza_recorder::Error::TakeBusy(track))?)
    }

    /// Write `track`'s last take through `writer`.
    pub fn export_track(&self, track: usize, writer: &mut dyn TakeWriter) -> Result<()> {
        let view = self.take_view(track)?;
        writer.write_take(&view)?;
        info!(track, frames = view.frames(), "track exported");
        Ok(())
    }

    // -- events --------------------------------------------------------------

    /// Next event from the audio thread, if any.
    pub fn poll_event(&mut self) -> Option<Event> {
        let event = self.events.try_pop()?;
        match &event {
            Event::NodeFailed { node, fault } => warn!(%node, %fault, "node failed"),
            Event::RecorderOverrun { track } => warn!(track, "recorder overrun"),
            Event::EventDropped { track, offset } => {
                debug!(track, offset, "sequencer event dropped")
            }
            Event::CommandRejected { kind } => warn!(?kind, "command rejected"),
            _ => {}
        }
        Some(event)
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.poll_event()).collect()
    }

    // -- workers -------------------------------------------------------------

    fn workers(&self) -> Result<&cadenza_core::WorkerPool> {
        self.services
            .workers
            .as_deref()
            .ok_or_else(|| CoreError::ResourceUnavailable("worker pool disabled").into())
    }

    /// Run `work` on the worker pool.
    pub fn submit_job<F>(&self, name: &str, work: F) -> Result<JobHandle>
    where
        F: FnOnce(&CancelToken) -> JobOutcome + Send + 'static,
    {
        Ok(self.workers()?.submit(name, work)?)
    }

    pub fn separate_stems(
        &self,
        separator: Arc<dyn StemSeparator>,
        input: AudioData,
    ) -> Result<JobHandle> {
        Ok(self.workers()?.separate_stems(separator, input)?)
    }

    pub fn poll_job(&self) -> Option<Completion> {
        self.services.workers.as_ref()?.try_completion()
    }

    pub fn wait_job(&self, timeout: Duration) -> Option<Completion> {
        self.services.workers.as_ref()?.wait_completion(timeout)
    }

    // -- housekeeping --------------------------------------------------------

    /// Free what the audio thread has let go of, finish pending node resets
    /// and drop takes nobody references any more. Returns the number of
    /// objects freed.
    pub fn maintain(&mut self) -> usize {
        let mut freed = self.reclaimer.collect();

        while let Some(mut node) = self.returns.try_pop() {
            let id = node.id();
            match self.editor.node(id) {
                Some(info) => {
                    node.reset();
                    self.reinserts.push((info.slot, node));
                }
                // Removed while it was on its way back.
                None => freed += 1,
            }
        }
        while !self.reinserts.is_empty() && self.commands.free_slots() > 0 {
            let (slot, node) = self.reinserts.remove(0);
            debug!(node = %node.id(), "node reset, re-inserting");
            if let Err(rejected) = self.send(GraphCommand::InsertNode { slot, node }) {
                warn!(error = %rejected, "node re-insert failed");
                break;
            }
        }

        let before = self.retired_takes.len();
        self.retired_takes.retain(|take| Arc::strong_count(take) > 1);
        freed + before - self.retired_takes.len()
    }

    /// Objects retired but not yet freed.
    pub fn pending_reclaim(&self) -> usize {
        self.reclaimer.pending()
    }
}

fn check_beat(beat: f64) -> Result<()> {
    if !beat.is_finite() || beat < 0.0 {
        return Err(Error::Core(CoreError::InvalidBeat(beat)));
    }
    Ok(())
}
