//! Transport state machine.
//!
//! Only the control side issues [`TransportCommand`]s; the audio thread
//! applies them between blocks and then calls [`Transport::plan_block`].

use super::state::{TransportSnapshot, TransportState};
use crate::time::{LoopRegion, TimeMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    Play,
    /// Stop and return to where playback last started. Stopping while
    /// already stopped returns to zero.
    Stop,
    Pause,
    /// Start recording at `start_beat`, rolling `preroll_bars` bars earlier.
    Record { start_beat: f64, preroll_bars: u32 },
    Seek(f64),
    SetLoop(LoopRegion),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionResult {
    None,
    StateChanged(TransportState),
    Located(u64),
    LoopChanged(LoopRegion),
}

#[derive(Debug, Clone)]
pub struct Transport {
    pub(super) state: TransportState,
    pub(super) playhead: u64,
    pub(super) start_position: u64,
    pub(super) loop_region: LoopRegion,
    pub(super) record_start: Option<u64>,
    pub(super) pending_wrap: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: TransportState::Stopped,
            playhead: 0,
            start_position: 0,
            loop_region: LoopRegion::default(),
            record_start: None,
            pending_wrap: false,
        }
    }

    #[inline]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[inline]
    pub fn playhead(&self) -> u64 {
        self.playhead
    }

    #[inline]
    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Sample at which a pending pre-roll flips into recording.
    #[inline]
    pub fn record_start(&self) -> Option<u64> {
        self.record_start
    }

    pub fn position_beat(&self, map: &TimeMap) -> f64 {
        map.sample_to_beat(self.playhead as f64)
    }

    /// Snapshot of the transport at the current playhead, not rolling forward.
    pub fn snapshot(&self, map: &TimeMap) -> TransportSnapshot {
        let beat = self.position_beat(map);
        TransportSnapshot {
            state: self.state,
            playhead_sample: self.playhead,
            start_beat: beat,
            end_beat: beat,
            loop_region: self.loop_region,
            after_wrap: false,
        }
    }

    pub fn apply(&mut self, command: TransportCommand, map: &TimeMap) -> TransitionResult {
        use TransportCommand::*;

        match command {
            Play => match self.state {
                TransportState::Stopped | TransportState::Paused => {
                    if self.state == TransportState::Stopped {
                        self.start_position = self.playhead;
                    }
                    self.state = TransportState::Playing;
                    TransitionResult::StateChanged(self.state)
                }
                TransportState::Playing | TransportState::Recording => TransitionResult::None,
            },

            Stop => {
                self.record_start = None;
                self.pending_wrap = false;
                if self.state == TransportState::Stopped {
                    if self.playhead == 0 {
                        return TransitionResult::None;
                    }
                    self.playhead = 0;
                    self.start_position = 0;
                    return TransitionResult::Located(0);
                }
                self.state = TransportState::Stopped;
                self.playhead = self.start_position;
                TransitionResult::StateChanged(self.state)
            }

            Pause => match self.state {
                TransportState::Playing | TransportState::Recording => {
                    self.state = TransportState::Paused;
                    TransitionResult::StateChanged(self.state)
                }
                TransportState::Stopped | TransportState::Paused => TransitionResult::None,
            },

            Record {
                start_beat,
                preroll_bars,
            } => {
                let start_beat = start_beat.max(0.0);
                let record_sample = map.beat_to_sample_index(start_beat);
                self.pending_wrap = false;
                if preroll_bars == 0 {
                    self.playhead = record_sample;
                    self.record_start = None;
                    self.state = TransportState::Recording;
                } else {
                    let bar_beats = map.meter_at_beat(start_beat).beats_per_bar();
                    let preroll_beat = (start_beat - preroll_bars as f64 * bar_beats).max(0.0);
                    self.playhead = map.beat_to_sample_index(preroll_beat);
                    self.record_start = Some(record_sample);
                    self.state = if self.playhead >= record_sample {
                        self.record_start = None;
                        TransportState::Recording
                    } else {
                        TransportState::Playing
                    };
                }
                self.start_position = self.playhead;
                TransitionResult::StateChanged(self.state)
            }

            Seek(beat) => {
                let target = map.beat_to_sample_index(beat.max(0.0));
                if target == self.playhead && !self.pending_wrap {
                    return TransitionResult::None;
                }
                self.playhead = target;
                self.pending_wrap = false;
                if !self.state.is_rolling() {
                    self.start_position = target;
                }
                TransitionResult::Located(target)
            }

            SetLoop(region) => {
                if region == self.loop_region {
                    return TransitionResult::None;
                }
                self.loop_region = region;
                if !region.enabled {
                    self.pending_wrap = false;
                }
                TransitionResult::LoopChanged(region)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> TimeMap {
        TimeMap::default()
    }

    #[test]
    fn test_play_stop_returns_to_start() {
        let map = map();
        let mut t = Transport::new();
        t.apply(TransportCommand::Seek(4.0), &map);
        assert_eq!(t.playhead(), 96_000);

        assert_eq!(
            t.apply(TransportCommand::Play, &map),
            TransitionResult::StateChanged(TransportState::Playing)
        );
        t.playhead = 150_000;
        t.apply(TransportCommand::Stop, &map);
        assert_eq!(t.state(), TransportState::Stopped);
        assert_eq!(t.playhead(), 96_000);

        // Second stop goes home.
        assert_eq!(t.apply(TransportCommand::Stop, &map), TransitionResult::Located(0));
        assert_eq!(t.playhead(), 0);
    }

    #[test]
    fn test_pause_keeps_playhead() {
        let map = map();
        let mut t = Transport::new();
        t.apply(TransportCommand::Play, &map);
        t.playhead = 1234;
        t.apply(TransportCommand::Pause, &map);
        assert_eq!(t.state(), TransportState::Paused);
        assert_eq!(t.playhead(), 1234);
        t.apply(TransportCommand::Play, &map);
        assert_eq!(t.playhead(), 1234);
        assert_eq!(t.state(), TransportState::Playing);
    }

    #[test]
    fn test_seek_twice_is_noop() {
        let map = map();
        let mut t = Transport::new();
        assert_eq!(t.apply(TransportCommand::Seek(2.5), &map), TransitionResult::Located(60_000));
        let before = t.clone();
        assert_eq!(t.apply(TransportCommand::Seek(2.5), &map), TransitionResult::None);
        assert_eq!(t.playhead, before.playhead);
        assert_eq!(t.start_position, before.start_position);
    }

    #[test]
    fn test_record_with_preroll() {
        let map = map();
        let mut t = Transport::new();
        let result = t.apply(
            TransportCommand::Record {
                start_beat: 8.0,
                preroll_bars: 1,
            },
            &map,
        );
        assert_eq!(result, TransitionResult::StateChanged(TransportState::Playing));
        assert_eq!(t.playhead(), 96_000);
        assert_eq!(t.record_start(), Some(192_000));
    }

    #[test]
    fn test_record_preroll_clamped_at_zero() {
        let map = map();
        let mut t = Transport::new();
        t.apply(
            TransportCommand::Record {
                start_beat: 2.0,
                preroll_bars: 2,
            },
            &map,
        );
        assert_eq!(t.playhead(), 0);
        assert_eq!(t.state(), TransportState::Playing);
        assert_eq!(t.record_start(), Some(48_000));
    }

    #[test]
    fn test_record_without_preroll() {
        let map = map();
        let mut t = Transport::new();
        t.apply(
            TransportCommand::Record {
                start_beat: 1.0,
                preroll_bars: 0,
            },
            &map,
        );
        assert_eq!(t.state(), TransportState::Recording);
        assert_eq!(t.playhead(), 24_000);
    }

    #[test]
    fn test_set_same_loop_is_noop() {
        let map = map();
        let mut t = Transport::new();
        let region = LoopRegion::new(0.0, 4.0, true).unwrap();
        assert_eq!(
            t.apply(TransportCommand::SetLoop(region), &map),
            TransitionResult::LoopChanged(region)
        );
        assert_eq!(t.apply(TransportCommand::SetLoop(region), &map), TransitionResult::None);
    }
}
