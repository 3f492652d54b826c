//! Splits one driver block into transport-coherent segments.
//!
//! A segment boundary sits wherever the timeline stops being a straight
//! line: the loop seam, the pre-roll flip into recording and action markers.

use super::fsm::Transport;
use super::state::{TransportSnapshot, TransportState};
use crate::time::{LoopRegion, MarkerAction, TimeMap};

/// Upper bound on segments per block.
pub const MAX_SEGMENTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Segment {
    /// First frame of the segment within the driver block.
    pub offset: usize,
    pub frames: usize,
    pub start_sample: u64,
    pub start_beat: f64,
    pub end_beat: f64,
    /// The loop wrapped right before this segment.
    pub after_wrap: bool,
    pub state: TransportState,
}

impl Segment {
    #[inline]
    pub fn is_recording(&self) -> bool {
        self.state == TransportState::Recording
    }

    #[inline]
    pub fn is_rolling(&self) -> bool {
        self.state.is_rolling()
    }

    pub fn snapshot(&self, loop_region: LoopRegion) -> TransportSnapshot {
        TransportSnapshot {
            state: self.state,
            playhead_sample: self.start_sample,
            start_beat: self.start_beat,
            end_beat: self.end_beat,
            loop_region,
            after_wrap: self.after_wrap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockPlan {
    segments: [Segment; MAX_SEGMENTS],
    len: usize,
    pub loop_region: LoopRegion,
    /// Final state if it changed during the block.
    pub state_changed: Option<TransportState>,
    /// Number of loop seams crossed.
    pub wraps: u32,
}

impl BlockPlan {
    fn empty(loop_region: LoopRegion) -> Self {
        Self {
            segments: [Segment::default(); MAX_SEGMENTS],
            len: 0,
            loop_region,
            state_changed: None,
            wraps: 0,
        }
    }

    fn push(&mut self, segment: Segment) {
        debug_assert!(self.len < MAX_SEGMENTS);
        self.segments[self.len] = segment;
        self.len += 1;
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments[..self.len]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_frames(&self) -> usize {
        self.segments().iter().map(|s| s.frames).sum()
    }
}

enum Boundary {
    LoopEnd,
    RecordStart,
    Marker(MarkerAction),
    BlockEnd,
}

impl Transport {
    /// Plan `frames` of output and advance the playhead past them.
    ///
    /// A zero-frame block yields an empty plan and leaves the transport
    /// untouched.
    pub fn plan_block(&mut self, frames: usize, map: &TimeMap) -> BlockPlan {
        let mut plan = BlockPlan::empty(self.loop_region);
        if frames == 0 {
            return plan;
        }

        if !self.state.is_rolling() {
            let beat = map.sample_to_beat(self.playhead as f64);
            plan.push(Segment {
                offset: 0,
                frames,
                start_sample: self.playhead,
                start_beat: beat,
                end_beat: beat,
                after_wrap: false,
                state: self.state,
            });
            return plan;
        }

        let looping = self.loop_region.enabled && self.loop_region.length() > 0.0;
        let loop_start = map.beat_to_sample_index(self.loop_region.start_beat);
        let loop_end = map.beat_to_sample_index(self.loop_region.end_beat);
        let initial_state = self.state;

        let mut offset = 0usize;
        let mut pos = self.playhead;
        let mut after_wrap = core::mem::take(&mut self.pending_wrap);
        let mut overflowed = false;

        while offset < frames {
            let remaining = (frames - offset) as u64;

            if !self.state.is_rolling() {
                // A marker halted playback mid-block.
                let beat = map.sample_to_beat(pos as f64);
                plan.push(Segment {
                    offset,
                    frames: remaining as usize,
                    start_sample: pos,
                    start_beat: beat,
                    end_beat: beat,
                    after_wrap: false,
                    state: self.state,
                });
                break;
            }

            // A previous block may have ended exactly on the record point.
            if let Some(record_at) = self.record_start {
                if record_at <= pos {
                    self.record_start = None;
                    if self.state == TransportState::Playing {
                        self.state = TransportState::Recording;
                    }
                }
            }

            let mut len = remaining;
            let mut boundary = Boundary::BlockEnd;

            if plan.len + 1 < MAX_SEGMENTS {
                if looping && pos < loop_end && loop_end - pos <= len {
                    len = loop_end - pos;
                    boundary = Boundary::LoopEnd;
                }
                if let Some(record_at) = self.record_start {
                    if record_at > pos && record_at - pos < len {
                        len = record_at - pos;
                        boundary = Boundary::RecordStart;
                    }
                }
                if let Some((at, action)) = next_marker(map, pos, pos + len) {
                    if at - pos < len || matches!(boundary, Boundary::BlockEnd) {
                        len = at - pos;
                        boundary = Boundary::Marker(action);
                    }
                }
            } else {
                overflowed = looping && pos < loop_end && pos + len > loop_end;
            }

            let end = pos + len;
            plan.push(Segment {
                offset,
                frames: len as usize,
                start_sample: pos,
                start_beat: map.sample_to_beat(pos as f64),
                end_beat: map.sample_to_beat(end as f64),
                after_wrap,
                state: self.state,
            });
            offset += len as usize;
            pos = end;
            after_wrap = false;

            match boundary {
                Boundary::LoopEnd => {
                    pos = loop_start;
                    plan.wraps += 1;
                    if offset < frames {
                        after_wrap = true;
                    } else {
                        self.pending_wrap = true;
                    }
                }
                Boundary::RecordStart => {
                    self.record_start = None;
                    if self.state == TransportState::Playing {
                        self.state = TransportState::Recording;
                    }
                }
                Boundary::Marker(MarkerAction::Stop) => {
                    self.state = TransportState::Stopped;
                    self.record_start = None;
                }
                Boundary::Marker(MarkerAction::Pause) => {
                    self.state = TransportState::Paused;
                }
                Boundary::Marker(MarkerAction::None) | Boundary::BlockEnd => {}
            }
        }

        if overflowed && pos > loop_end {
            // Loop shorter than a segment slot; fold back onto the loop.
            let span = loop_end.saturating_sub(loop_start).max(1);
            pos = loop_start + (pos - loop_end) % span;
            plan.wraps += 1;
        }

        self.playhead = if self.state == TransportState::Stopped {
            self.start_position
        } else {
            pos
        };
        if self.state != initial_state {
            plan.state_changed = Some(self.state);
        }
        plan
    }
}

/// First action marker strictly after `from` and at or before `to`.
fn next_marker(map: &TimeMap, from: u64, to: u64) -> Option<(u64, MarkerAction)> {
    let from_beat = map.sample_to_beat(from as f64);
    map.markers()
        .iter()
        .skip_while(|m| m.beat < from_beat)
        .filter(|m| m.action != MarkerAction::None)
        .map(|m| (map.beat_to_sample_index(m.beat), m.action))
        .skip_while(|(at, _)| *at <= from)
        .take_while(|(at, _)| *at <= to)
        .next()
}
