//! Builder for configuring and constructing an engine.

use std::sync::Arc;

use arc_swap::ArcSwap;
use cadenza_core::{
    spsc, AtomicLevels, EngineConfig, Epoch, Event, GraphEditor, GraphRuntime, NodeSlot,
    Reclaimer, Services, TimeMap, TransportInfo, WorkerPool,
};
use cadenza_dsp::BusNode;
use cadenza_sequencer::ArrangementSnapshot;
use tracing::info;

use crate::command::Command;
use crate::control::{ControlParts, Controller};
use crate::engine::{AudioCore, CoreParts};
use crate::Result;

/// Every capacity is fixed here, before the first block. The engine comes
/// back split in two: a [`Controller`] for the application and an
/// [`AudioCore`] for the driver callback. A stereo master bus is added
/// automatically.
///
/// # Example
///
/// ```
/// use cadenza::prelude::*;
///
/// let (mut controller, mut core) = EngineBuilder::default()
///     .sample_rate(48_000.0)
///     .max_block_size(256)
///     .tempo(128.0)
///     .build()?;
///
/// core.prepare(48_000.0, 256)?;
/// controller.play()?;
/// # Ok::<(), cadenza::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: EngineConfig,
    bpm: f64,
    numerator: u32,
    denominator: u32,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            bpm: 120.0,
            numerator: 4,
            denominator: 4,
        }
    }
}

impl EngineBuilder {
    /// Start from a complete configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 48000
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Default: 512
    pub fn max_block_size(mut self, frames: usize) -> Self {
        self.config.max_block_size = frames;
        self
    }

    /// Channels of the driver input and output. Default: 2
    pub fn channels(mut self, channels: usize) -> Self {
        self.config.max_channels = channels;
        self
    }

    pub fn max_nodes(mut self, nodes: usize) -> Self {
        self.config.max_nodes = nodes;
        self
    }

    pub fn command_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.command_queue_capacity = capacity;
        self
    }

    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.event_queue_capacity = capacity;
        self
    }

    pub fn max_commands_per_block(mut self, count: usize) -> Self {
        self.config.max_commands_per_block = count;
        self
    }

    pub fn max_recording_seconds(mut self, seconds: f64) -> Self {
        self.config.max_recording_seconds = seconds;
        self
    }

    pub fn recording_tracks(mut self, tracks: usize) -> Self {
        self.config.recording_tracks = tracks;
        self
    }

    pub fn sequencer_tracks(mut self, tracks: usize) -> Self {
        self.config.sequencer_tracks = tracks;
        self
    }

    pub fn midi_events_per_track(mut self, events: usize) -> Self {
        self.config.midi_events_per_track = events;
        self
    }

    pub fn metering_interval_blocks(mut self, blocks: u32) -> Self {
        self.config.metering_interval_blocks = blocks;
        self
    }

    /// Zero disables the worker pool.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    pub fn worker_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.worker_queue_capacity = capacity;
        self
    }

    /// Initial tempo. Default: 120 BPM
    pub fn tempo(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    /// Initial meter. Default: 4/4
    pub fn time_signature(mut self, numerator: u32, denominator: u32) -> Self {
        self.numerator = numerator;
        self.denominator = denominator;
        self
    }

    pub fn build(self) -> Result<(Controller, AudioCore)> {
        let config = self.config;
        config.validate()?;
        let time_map = TimeMap::new(self.bpm, self.numerator, self.denominator, config.sample_rate)?;

        let (command_tx, command_rx) = spsc::<Command>(config.command_queue_capacity);
        let (event_tx, event_rx) = spsc::<Event>(config.event_queue_capacity);
        let (return_tx, return_rx) = spsc::<Box<NodeSlot>>(config.max_nodes);

        let epoch = Epoch::new();
        // Room for everything one full command queue could hand back.
        let (reclaimer, garbage) =
            Reclaimer::new(epoch.clone(), config.command_queue_capacity + config.max_nodes);
        let master_levels = Arc::new(AtomicLevels::new());
        let graph = GraphRuntime::new(
            config.max_nodes,
            garbage,
            return_tx,
            master_levels.clone(),
            config.metering_interval_blocks,
        );

        let workers = if config.worker_threads > 0 {
            Some(Arc::new(WorkerPool::new(
                config.worker_threads,
                config.worker_queue_capacity,
            )?))
        } else {
            None
        };

        let shared_map = Arc::new(ArcSwap::from_pointee(time_map.clone()));
        let shared_arrangement = Arc::new(ArcSwap::from_pointee(ArrangementSnapshot::default()));
        let transport_info = Arc::new(TransportInfo::new());

        let mut controller = Controller::new(ControlParts {
            config: config.clone(),
            commands: command_tx,
            events: event_rx,
            returns: return_rx,
            editor: GraphEditor::new(config.max_nodes, config.max_block_size),
            reclaimer,
            services: Services { workers },
            time_map,
            shared_map: shared_map.clone(),
            shared_arrangement: shared_arrangement.clone(),
            info: transport_info.clone(),
            master_levels,
        });
        let core = AudioCore::new(CoreParts {
            config: config.clone(),
            commands: command_rx,
            events: event_tx,
            graph,
            time_map: shared_map,
            arrangement: shared_arrangement,
            info: transport_info,
            epoch,
        });

        controller.add_node(Box::new(BusNode::master(config.max_channels)))?;

        info!(
            sample_rate = config.sample_rate,
            max_block_size = config.max_block_size,
            channels = config.max_channels,
            max_nodes = config.max_nodes,
            workers = config.worker_threads,
            "engine built"
        );
        Ok((controller, core))
    }
}
