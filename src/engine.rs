//! Driver side of the engine: the object the host audio callback owns.

use std::sync::Arc;

use arc_swap::ArcSwap;
use cadenza_core::{
    AudioBlock, BlockContext, EngineConfig, Epoch, ErrorKind, Event, EventSink, GraphRuntime,
    LoopRegion, MidiEvent, ParamValues, Segment, SpscConsumer, SpscProducer, TempoSnapshot,
    TimeMap, TransitionResult, Transport, TransportCommand, TransportInfo, TransportState,
};
use cadenza_recorder::Recorder;
use cadenza_sequencer::{ArrangementSnapshot, MidiScheduler};

use crate::command::Command;
use crate::error::{Error, Result};

const MIDI_CHANNELS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Prepared { max_frames: usize },
    Released,
}

/// Everything the builder hands over when it splits an engine in two.
pub(crate) struct CoreParts {
    pub config: EngineConfig,
    pub commands: SpscConsumer<Command>,
    pub events: SpscProducer<Event>,
    pub graph: GraphRuntime,
    pub time_map: Arc<ArcSwap<TimeMap>>,
    pub arrangement: Arc<ArcSwap<ArrangementSnapshot>>,
    pub info: Arc<TransportInfo>,
    pub epoch: Epoch,
}

/// Real-time half of the engine.
///
/// Owns the graph runtime, transport, MIDI scheduler and recorder. The host
/// driver calls [`prepare`](Self::prepare) once, [`process`](Self::process)
/// for every callback and [`release`](Self::release) on shutdown. Nothing in
/// `process` allocates, locks or logs: failures become [`Event`]s on the
/// outbound queue and the stream keeps running.
pub struct AudioCore {
    config: EngineConfig,
    lifecycle: Lifecycle,
    commands: SpscConsumer<Command>,
    /// Command that could not be applied last block; it goes first next time.
    stashed: Option<Command>,
    events: SpscProducer<Event>,
    graph: GraphRuntime,
    transport: Transport,
    scheduler: MidiScheduler,
    recorder: Recorder,
    time_map: Arc<ArcSwap<TimeMap>>,
    arrangement: Arc<ArcSwap<ArrangementSnapshot>>,
    info: Arc<TransportInfo>,
    epoch: Epoch,
    sub_input: AudioBlock,
    host_in: AudioBlock,
    host_out: AudioBlock,
    was_rolling: bool,
    blocks: u64,
}

impl AudioCore {
    pub(crate) fn new(parts: CoreParts) -> Self {
        let CoreParts {
            config,
            commands,
            events,
            graph,
            time_map,
            arrangement,
            info,
            epoch,
        } = parts;
        Self {
            scheduler: MidiScheduler::new(config.sequencer_tracks, config.midi_events_per_track),
            recorder: Recorder::new(config.recording_tracks),
            config,
            lifecycle: Lifecycle::Idle,
            commands,
            stashed: None,
            events,
            graph,
            transport: Transport::new(),
            time_map,
            arrangement,
            info,
            epoch,
            sub_input: AudioBlock::new(0, 0),
            host_in: AudioBlock::new(0, 0),
            host_out: AudioBlock::new(0, 0),
            was_rolling: false,
            blocks: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Prepared { .. })
    }

    /// Size the driver scratch buffers. Called before the stream starts,
    /// never from the audio callback.
    ///
    /// The sample rate must match the one the engine was built for, since
    /// every node was prepared at that rate; `max_block_size` may be smaller
    /// than the configured maximum.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        if (sample_rate - self.config.sample_rate).abs() > 1e-6 {
            return Err(cadenza_core::Error::InvalidArgument(format!(
                "driver runs at {sample_rate} Hz, engine was built for {} Hz",
                self.config.sample_rate
            ))
            .into());
        }
        if max_block_size == 0 || max_block_size > self.config.max_block_size {
            return Err(cadenza_core::Error::InvalidArgument(format!(
                "block size {max_block_size} outside 1..={}",
                self.config.max_block_size
            ))
            .into());
        }

        let channels = self.config.max_channels;
        self.sub_input = AudioBlock::new(channels, max_block_size);
        self.host_in = AudioBlock::new(channels, max_block_size);
        self.host_out = AudioBlock::new(channels, max_block_size);
        self.lifecycle = Lifecycle::Prepared {
            max_frames: max_block_size,
        };
        self.publish_info(&self.time_map.load());
        tracing::info!(sample_rate, max_block_size, channels, "audio core prepared");
        Ok(())
    }

    /// Stop capturing, forget sounding notes and drop the driver scratch
    /// buffers. The core can be prepared again afterwards.
    pub fn release(&mut self) {
        if !self.is_prepared() {
            return;
        }
        self.recorder.stop_all();
        self.scheduler.reset();
        self.was_rolling = false;
        self.sub_input = AudioBlock::new(0, 0);
        self.host_in = AudioBlock::new(0, 0);
        self.host_out = AudioBlock::new(0, 0);
        self.lifecycle = Lifecycle::Released;
        self.epoch.advance();
        tracing::info!("audio core released");
    }

    /// Render `frames` frames into `output`, reading the driver input from
    /// `input`.
    ///
    /// A zero-frame call does nothing, not even draining commands. Before
    /// [`prepare`](Self::prepare) the output is silenced and `NotPrepared`
    /// is returned.
    pub fn process(
        &mut self,
        input: &AudioBlock,
        output: &mut AudioBlock,
        frames: usize,
    ) -> Result<()> {
        let Lifecycle::Prepared { max_frames } = self.lifecycle else {
            output.clear_active();
            return Err(Error::Core(cadenza_core::Error::NotPrepared));
        };
        if frames == 0 {
            return Ok(());
        }
        if frames > max_frames {
            output.clear_active();
            return Err(Error::Core(cadenza_core::Error::CapacityExceeded(
                "block larger than the prepared size",
            )));
        }

        let map = self.time_map.load();
        let arrangement = self.arrangement.load();
        self.drain_commands(&map);

        output.set_frames(frames);
        output.clear_active();
        let plan = self.transport.plan_block(frames, &map);

        for segment in plan.segments() {
            if segment.after_wrap {
                self.events.emit(Event::LoopWrapped {
                    sample: segment.start_sample,
                });
            }
            let rolling = segment.is_rolling();
            if self.was_rolling && !rolling {
                self.broadcast_all_notes_off();
            }
            self.was_rolling = rolling;

            self.scheduler.begin_block();
            self.scheduler.render_segment(
                segment,
                plan.loop_region,
                &arrangement,
                &map,
                &mut self.events,
            );
            self.route_sequencer_midi(segment, &arrangement);
            self.recorder
                .record_segment(segment, input, &mut self.events);
            self.render_graph(segment, plan.loop_region, input, output, &map);
        }
        self.recorder.monitor(input, output);

        if let Some(state) = plan.state_changed {
            self.events.emit(Event::TransportStateChanged(state));
        }
        self.blocks += 1;
        if self.transport.state().is_rolling()
            && self.blocks % u64::from(self.config.metering_interval_blocks) == 0
        {
            let sample = self.transport.playhead();
            self.events.emit(Event::PositionChanged {
                beat: map.sample_to_beat(sample as f64),
                sample,
            });
        }
        self.graph.end_block(&mut self.events);
        self.publish_info(&map);

        // Guards go before the epoch moves, so retired snapshots are never
        // released from this thread.
        drop(map);
        drop(arrangement);
        self.epoch.advance();
        Ok(())
    }

    /// Interleaved variant of [`process`](Self::process) for drivers that
    /// hand over raw sample slices. `output.len() / output_channels` frames
    /// are rendered; missing input reads as silence.
    pub fn process_interleaved(
        &mut self,
        input: &[f32],
        input_channels: usize,
        output: &mut [f32],
        output_channels: usize,
    ) -> Result<()> {
        let frames = output.len() / output_channels.max(1);
        let mut host_in = core::mem::replace(&mut self.host_in, AudioBlock::new(0, 0));
        let mut host_out = core::mem::replace(&mut self.host_out, AudioBlock::new(0, 0));

        host_in.set_frames(frames);
        host_in.clear_active();
        if input_channels > 0 {
            host_in.copy_from_interleaved(input, input_channels);
            host_in.set_frames(frames);
        }
        let result = self.process(&host_in, &mut host_out, frames);
        match result {
            Ok(()) => host_out.write_interleaved(output, output_channels),
            Err(_) => output.fill(0.0),
        }

        self.host_in = host_in;
        self.host_out = host_out;
        result
    }

    #[inline]
    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    #[inline]
    pub fn playhead(&self) -> u64 {
        self.transport.playhead()
    }

    /// Generation of the graph plan currently executing.
    pub fn graph_generation(&self) -> u64 {
        self.graph.graph().generation()
    }

    /// Notes the scheduler believes are sounding on `track`.
    pub fn held_notes(&self, track: usize) -> usize {
        self.scheduler.held_notes(track)
    }

    pub fn is_capturing(&self, track: usize) -> bool {
        self.recorder.is_capturing(track)
    }

    // -- block internals -----------------------------------------------------

    fn drain_commands(&mut self, map: &TimeMap) {
        let mut budget = self.config.max_commands_per_block;
        while budget > 0 {
            let Some(command) = self.stashed.take().or_else(|| self.commands.try_pop()) else {
                break;
            };
            budget -= 1;
            if let Err(command) = self.apply(command, map) {
                self.stashed = Some(command);
                break;
            }
        }
    }

    fn apply(&mut self, command: Command, map: &TimeMap) -> core::result::Result<(), Command> {
        match command {
            Command::Graph(command) => self
                .graph
                .apply(command, &mut self.events)
                .map_err(Command::Graph),
            Command::Transport(command) => {
                self.apply_transport(command, map);
                Ok(())
            }
            Command::Recorder(command) => {
                if !self.recorder.apply(command) {
                    self.events.emit(Event::CommandRejected {
                        kind: ErrorKind::InvalidArgument,
                    });
                }
                Ok(())
            }
            Command::TempoMapChanged => {
                let beat = self.transport.position_beat(map);
                self.events.emit(Event::TempoChanged {
                    bpm: map.tempo_at_beat(beat),
                });
                Ok(())
            }
            Command::PanicMidi => {
                self.scheduler.reset();
                self.broadcast_all_notes_off();
                Ok(())
            }
        }
    }

    fn apply_transport(&mut self, command: TransportCommand, map: &TimeMap) {
        match self.transport.apply(command, map) {
            TransitionResult::None | TransitionResult::LoopChanged(_) => {}
            TransitionResult::StateChanged(state) => {
                self.events.emit(Event::TransportStateChanged(state));
            }
            TransitionResult::Located(sample) => {
                self.events.emit(Event::PositionChanged {
                    beat: map.sample_to_beat(sample as f64),
                    sample,
                });
            }
        }
    }

    fn broadcast_all_notes_off(&mut self) {
        for channel in 0..MIDI_CHANNELS {
            self.graph.broadcast_midi(MidiEvent::all_notes_off(0, channel));
        }
    }

    /// Move each track's MIDI for `segment` into its target node, shifted
    /// to segment-relative offsets.
    fn route_sequencer_midi(&mut self, segment: &Segment, arrangement: &ArrangementSnapshot) {
        let base = segment.offset as u32;
        for track in 0..self.scheduler.track_count() {
            let Some(target) = arrangement.track(track).and_then(|plan| plan.target) else {
                continue;
            };
            let Some(out) = self.scheduler.output(track) else {
                continue;
            };
            if out.is_empty() {
                continue;
            }
            let Some(dest) = self.graph.midi_input_mut(target) else {
                continue;
            };
            for event in out.iter() {
                let shifted = event.with_offset(event.offset.saturating_sub(base));
                if dest.insert_sorted(shifted).is_err() {
                    self.events.emit(Event::EventDropped {
                        track,
                        offset: event.offset,
                    });
                }
            }
        }
    }

    fn render_graph(
        &mut self,
        segment: &Segment,
        loop_region: LoopRegion,
        input: &AudioBlock,
        output: &mut AudioBlock,
        map: &TimeMap,
    ) {
        let len = segment.frames;
        self.sub_input.set_frames(len);
        self.sub_input.clear_active();
        self.sub_input.copy_range_from(input, segment.offset, 0, len);

        let meter = map.meter_at_beat(segment.start_beat);
        let ctx = BlockContext {
            sample_rate: self.config.sample_rate,
            frames: len,
            transport: segment.snapshot(loop_region),
            tempo: TempoSnapshot {
                bpm: map.tempo_at_beat(segment.start_beat),
                numerator: meter.numerator,
                denominator: meter.denominator,
            },
            midi_in: &[],
            sidechain_in: None,
            host_input: Some(&self.sub_input),
            params: ParamValues::EMPTY,
        };
        self.graph.process(&ctx, len, &mut self.events);

        if let Some(master) = self.graph.master_output() {
            output.copy_range_from(master, 0, segment.offset, len);
        }
    }

    fn publish_info(&self, map: &TimeMap) {
        let playhead = self.transport.playhead();
        let beat = map.sample_to_beat(playhead as f64);
        self.info.publish(
            self.transport.state(),
            playhead,
            beat,
            map.tempo_at_beat(beat),
            self.transport.loop_region().enabled,
        );
    }
}

impl Drop for AudioCore {
    fn drop(&mut self) {
        // Anything still queued is owned by us now; nothing below runs on the
        // audio thread any more.
        self.stashed.take();
        while self.commands.try_pop().is_some() {}
    }
}
