//! Audio-thread side of multi-track recording.

use std::sync::Arc;

use cadenza_core::{AudioBlock, Event, EventSink, Segment};
use serde::{Deserialize, Serialize};

use crate::take::TakeBuffer;

/// Whether every recording segment is captured or only a punch range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordMode {
    #[default]
    Normal,
    /// Capture only `punch_in <= sample < punch_out`.
    ///
    /// When the loop brings the playhead back through the range, each pass
    /// starts a new take that replaces the previous one, and
    /// `RecordingStarted` is sent again. The take holds the last pass.
    AutoPunch { punch_in: u64, punch_out: u64 },
}

impl RecordMode {
    /// Part of `[start, start + len)` that may be captured, as
    /// `(skip, len)` relative to `start`.
    fn gate(self, start: u64, len: usize) -> Option<(usize, usize)> {
        match self {
            RecordMode::Normal => Some((0, len)),
            RecordMode::AutoPunch {
                punch_in,
                punch_out,
            } => {
                let end = start + len as u64;
                let lo = start.max(punch_in);
                let hi = end.min(punch_out);
                (hi > lo).then(|| ((lo - start) as usize, (hi - lo) as usize))
            }
        }
    }
}

/// Messages from the control side. Take buffers arrive ready-made; nothing
/// here allocates on the audio thread.
#[derive(Debug)]
pub enum RecorderCommand {
    /// Hand a freshly allocated take buffer to `track`.
    Attach {
        track: usize,
        take: Arc<TakeBuffer>,
    },
    Arm {
        track: usize,
        armed: bool,
    },
    SetMonitoring {
        track: usize,
        monitoring: bool,
    },
    /// First host input channel recorded by `track`.
    SetInput {
        track: usize,
        first_channel: usize,
    },
    SetVolume {
        track: usize,
        gain: f32,
    },
    SetMode(RecordMode),
}

#[derive(Debug, Default)]
struct RecordingTrack {
    take: Option<Arc<TakeBuffer>>,
    armed: bool,
    monitoring: bool,
    first_channel: usize,
    volume: f32,
    capturing: bool,
    overrun_reported: bool,
}

impl RecordingTrack {
    fn stop_capture(&mut self) {
        if self.capturing {
            if let Some(take) = &self.take {
                take.end();
            }
            self.capturing = false;
        }
    }
}

/// Owned by the audio thread.
pub struct Recorder {
    tracks: Vec<RecordingTrack>,
    mode: RecordMode,
}

impl Recorder {
    pub fn new(tracks: usize) -> Self {
        Self {
            tracks: (0..tracks)
                .map(|_| RecordingTrack {
                    volume: 1.0,
                    ..RecordingTrack::default()
                })
                .collect(),
            mode: RecordMode::Normal,
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn mode(&self) -> RecordMode {
        self.mode
    }

    pub fn is_armed(&self, track: usize) -> bool {
        self.tracks.get(track).is_some_and(|t| t.armed)
    }

    pub fn is_monitoring(&self, track: usize) -> bool {
        self.tracks.get(track).is_some_and(|t| t.monitoring)
    }

    pub fn is_capturing(&self, track: usize) -> bool {
        self.tracks.get(track).is_some_and(|t| t.capturing)
    }

    /// Apply one command. Commands naming a track that does not exist are
    /// ignored and reported back as `false`.
    pub fn apply(&mut self, command: RecorderCommand) -> bool {
        if let RecorderCommand::SetMode(mode) = command {
            self.mode = mode;
            return true;
        }
        let index = match &command {
            RecorderCommand::Attach { track, .. }
            | RecorderCommand::Arm { track, .. }
            | RecorderCommand::SetMonitoring { track, .. }
            | RecorderCommand::SetInput { track, .. }
            | RecorderCommand::SetVolume { track, .. } => *track,
            RecorderCommand::SetMode(_) => return true,
        };
        let Some(track) = self.tracks.get_mut(index) else {
            return false;
        };
        match command {
            RecorderCommand::Attach { take, .. } => {
                track.stop_capture();
                // The control side keeps its own clone, so the old buffer is
                // never freed here.
                track.take = Some(take);
            }
            RecorderCommand::Arm { armed, .. } => {
                if !armed {
                    track.stop_capture();
                }
                track.armed = armed;
            }
            RecorderCommand::SetMonitoring { monitoring, .. } => track.monitoring = monitoring,
            RecorderCommand::SetInput { first_channel, .. } => track.first_channel = first_channel,
            RecorderCommand::SetVolume { gain, .. } => {
                track.volume = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
            }
            RecorderCommand::SetMode(_) => {}
        }
        true
    }

    /// Capture the part of `input` covered by `segment`. A track that is not
    /// capturing starts a fresh take, discarding what its buffer held.
    pub fn record_segment(
        &mut self,
        segment: &Segment,
        input: &AudioBlock,
        events: &mut dyn EventSink,
    ) {
        if !segment.is_recording() {
            self.stop_all();
            return;
        }
        let gate = self.mode.gate(segment.start_sample, segment.frames);
        let past_punch = matches!(
            self.mode,
            RecordMode::AutoPunch { punch_out, .. } if segment.start_sample + segment.frames as u64 >= punch_out
        );

        for (index, track) in self.tracks.iter_mut().enumerate() {
            if !track.armed {
                continue;
            }
            let Some(take) = &track.take else {
                continue;
            };
            if let Some((skip, len)) = gate {
                if !track.capturing {
                    let start = segment.start_sample + skip as u64;
                    if take.begin(start) {
                        track.capturing = true;
                        track.overrun_reported = false;
                        events.emit(Event::RecordingStarted {
                            track: index,
                            sample: start,
                        });
                    } else if !track.overrun_reported {
                        // A view is open on the take; this pass is lost.
                        track.overrun_reported = true;
                        events.emit(Event::RecorderOverrun { track: index });
                    }
                }
                if track.capturing {
                    let written = take.append(input, track.first_channel, segment.offset + skip, len);
                    if written < len && !track.overrun_reported {
                        track.overrun_reported = true;
                        events.emit(Event::RecorderOverrun { track: index });
                    }
                }
            }
            if past_punch {
                track.stop_capture();
            }
        }
    }

    /// Mix armed, monitored inputs into `out` at each track's volume. Runs
    /// in every transport state.
    pub fn monitor(&self, input: &AudioBlock, out: &mut AudioBlock) {
        let out_channels = out.channels();
        if out_channels == 0 {
            return;
        }
        for track in self.tracks.iter().filter(|t| t.armed && t.monitoring) {
            let channels = track.take.as_ref().map_or(1, |t| t.channels());
            for c in 0..channels {
                let src = track.first_channel + c;
                if src >= input.channels() {
                    continue;
                }
                if channels == 1 {
                    for dest in 0..out_channels {
                        out.add_from(dest, input, src, track.volume);
                    }
                } else if c < out_channels {
                    out.add_from(c, input, src, track.volume);
                }
            }
        }
    }

    /// End every take in progress.
    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            track.stop_capture();
        }
    }
}
