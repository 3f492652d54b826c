//! Transport state, per-block snapshots and the lock-free mirror.

use core::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::lockfree::{AtomicCounter, AtomicDouble, AtomicFlag};
use crate::time::LoopRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Recording,
}

impl TransportState {
    /// Playhead advances in these states.
    #[inline]
    pub fn is_rolling(self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Recording)
    }

    fn to_u8(self) -> u8 {
        match self {
            TransportState::Stopped => 0,
            TransportState::Playing => 1,
            TransportState::Paused => 2,
            TransportState::Recording => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Playing,
            2 => TransportState::Paused,
            3 => TransportState::Recording,
            _ => TransportState::Stopped,
        }
    }
}

/// What the audio thread knows about the transport for one (sub-)block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransportSnapshot {
    pub state: TransportState,
    /// Timeline sample at the first frame of the (sub-)block.
    pub playhead_sample: u64,
    pub start_beat: f64,
    pub end_beat: f64,
    pub loop_region: LoopRegion,
    /// A loop seam sits right before the first frame.
    pub after_wrap: bool,
}

impl TransportSnapshot {
    #[inline]
    pub fn is_rolling(&self) -> bool {
        self.state.is_rolling()
    }
}

/// Transport status readable from any thread without locking.
#[derive(Debug, Default)]
pub struct TransportInfo {
    state: AtomicU8,
    playhead: AtomicCounter,
    beat: AtomicDouble,
    bpm: AtomicDouble,
    loop_enabled: AtomicFlag,
}

impl TransportInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audio thread only.
    pub fn publish(&self, state: TransportState, playhead: u64, beat: f64, bpm: f64, looping: bool) {
        self.state.store(state.to_u8(), Ordering::Release);
        self.playhead.set(playhead);
        self.beat.set(beat);
        self.bpm.set(bpm);
        self.loop_enabled.set(looping);
    }

    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn playhead_sample(&self) -> u64 {
        self.playhead.get()
    }

    pub fn beat(&self) -> f64 {
        self.beat.get()
    }

    pub fn bpm(&self) -> f64 {
        self.bpm.get()
    }

    pub fn is_looping(&self) -> bool {
        self.loop_enabled.get()
    }
}
