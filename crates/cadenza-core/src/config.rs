//! Engine configuration.

use crate::error::{Error, Result};

/// Hard limit on channels per [`AudioBlock`](crate::AudioBlock).
pub const MAX_CHANNELS: usize = 64;

/// Largest block the driver may hand us in one call.
pub const MAX_BLOCK_SIZE: usize = 8192;

/// Capacities and rates fixed for the lifetime of an engine.
///
/// Everything that sizes a pre-allocated structure lives here, so that
/// nothing on the audio thread has to grow after `prepare`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: f64,
    pub max_block_size: usize,
    /// Channels of the driver input and output blocks.
    pub max_channels: usize,
    pub max_nodes: usize,
    pub command_queue_capacity: usize,
    pub event_queue_capacity: usize,
    /// Upper bound on commands applied per block.
    pub max_commands_per_block: usize,
    pub max_recording_seconds: f64,
    pub recording_tracks: usize,
    pub sequencer_tracks: usize,
    pub midi_events_per_track: usize,
    /// Metering events are published every N blocks.
    pub metering_interval_blocks: u32,
    pub worker_threads: usize,
    pub worker_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            max_block_size: 512,
            max_channels: 2,
            max_nodes: 256,
            command_queue_capacity: 1024,
            event_queue_capacity: 4096,
            max_commands_per_block: 64,
            max_recording_seconds: 600.0,
            recording_tracks: 8,
            sequencer_tracks: 32,
            midi_events_per_track: 512,
            metering_interval_blocks: 4,
            worker_threads: 2,
            worker_queue_capacity: 32,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8_000.0..=384_000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.max_block_size == 0 || self.max_block_size > MAX_BLOCK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "max block size {} out of range (1-{MAX_BLOCK_SIZE})",
                self.max_block_size
            )));
        }
        if self.max_channels == 0 || self.max_channels > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "channel count {} out of range (1-{MAX_CHANNELS})",
                self.max_channels
            )));
        }
        let capacities = [
            ("max_nodes", self.max_nodes),
            ("command_queue_capacity", self.command_queue_capacity),
            ("event_queue_capacity", self.event_queue_capacity),
            ("max_commands_per_block", self.max_commands_per_block),
            ("midi_events_per_track", self.midi_events_per_track),
            ("worker_queue_capacity", self.worker_queue_capacity),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{name} must be non-zero")));
        }
        if self.max_recording_seconds.is_nan() || self.max_recording_seconds <= 0.0 {
            return Err(Error::InvalidConfig(
                "max_recording_seconds must be positive".into(),
            ));
        }
        if self.metering_interval_blocks == 0 {
            return Err(Error::InvalidConfig(
                "metering_interval_blocks must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Frames each recording track must hold.
    pub fn recording_capacity_frames(&self) -> usize {
        (self.max_recording_seconds * self.sample_rate).ceil() as usize
    }
}
