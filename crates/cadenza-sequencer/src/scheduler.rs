//! Per-block MIDI scheduling.
//!
//! For every transport segment the scheduler turns the pattern instances and
//! step grids of each track into note and controller messages at
//! block-relative offsets, and keeps track of which notes are sounding so
//! that stops, seeks, mutes, instance edges and loop seams never leave a note
//! hanging.
//!
//! A segment covering samples `[S, S + F)` owns the beat window
//! `[beat(S - 0.5), beat(S + F - 0.5))`: every event whose rounded sample
//! position falls in the segment is emitted exactly once, whatever the block
//! size.

use cadenza_core::{Event, EventSink, LoopRegion, Segment, TimeMap};
use cadenza_midi::{clamp_velocity, MidiBuffer, MidiEvent};

use crate::arrangement::{ArrangementSnapshot, ResolvedInstance, TrackPlan};
use crate::notes::{ActiveNotes, HeldNote, NoteSource};
use crate::pattern::PatternEventKind;
use crate::rng;

/// Held notes tracked per track.
pub const MAX_HELD_NOTES: usize = 128;

/// Tolerance for deciding that a note outlives the loop end.
const WRAP_EPSILON: f64 = 1e-9;

struct TrackState {
    out: MidiBuffer,
    notes: ActiveNotes,
}

/// Beat window of one segment plus the mapping back to block offsets.
#[derive(Clone, Copy)]
struct Window {
    start: f64,
    end: f64,
    start_sample: u64,
    frames: u64,
    base: u32,
}

impl Window {
    fn new(segment: &Segment, map: &TimeMap) -> Self {
        let s = segment.start_sample as f64;
        let f = segment.frames as f64;
        let start = if segment.start_sample == 0 {
            0.0
        } else {
            map.sample_to_beat(s - 0.5)
        };
        Self {
            start,
            end: map.sample_to_beat(s + f - 0.5),
            start_sample: segment.start_sample,
            frames: segment.frames as u64,
            base: segment.offset as u32,
        }
    }

    /// Nearest timeline sample of `beat`.
    #[inline]
    fn sample_of(&self, beat: f64, map: &TimeMap) -> u64 {
        map.beat_to_sample_index(beat)
    }

    /// Block offset of `beat`, clamped into the segment.
    #[inline]
    fn offset(&self, beat: f64, map: &TimeMap) -> u32 {
        let local = self
            .sample_of(beat, map)
            .saturating_sub(self.start_sample)
            .min(self.frames.saturating_sub(1));
        self.base + local as u32
    }
}

/// Turns the arrangement into per-track MIDI, one segment at a time.
pub struct MidiScheduler {
    tracks: Vec<TrackState>,
    expected_sample: Option<u64>,
}

impl MidiScheduler {
    pub fn new(tracks: usize, events_per_track: usize) -> Self {
        let tracks = (0..tracks)
            .map(|_| TrackState {
                out: MidiBuffer::with_capacity(events_per_track),
                notes: ActiveNotes::with_capacity(MAX_HELD_NOTES),
            })
            .collect();
        Self {
            tracks,
            expected_sample: None,
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Messages produced for `track` since [`begin_block`](Self::begin_block).
    pub fn output(&self, track: usize) -> Option<&MidiBuffer> {
        self.tracks.get(track).map(|t| &t.out)
    }

    pub fn held_notes(&self, track: usize) -> usize {
        self.tracks.get(track).map_or(0, |t| t.notes.len())
    }

    pub fn begin_block(&mut self) {
        for track in &mut self.tracks {
            track.out.clear();
        }
    }

    /// Note-off for every sounding note on every track, at `offset`.
    pub fn release_all(&mut self, offset: u32, events: &mut dyn EventSink) {
        for (index, track) in self.tracks.iter_mut().enumerate() {
            release_track(track, index, offset, events);
        }
    }

    /// Forget sounding notes without emitting anything; used after the
    /// consumers have been reset.
    pub fn reset(&mut self) {
        for track in &mut self.tracks {
            track.notes.clear();
            track.out.clear();
        }
        self.expected_sample = None;
    }

    pub fn render_segment(
        &mut self,
        segment: &Segment,
        loop_region: LoopRegion,
        arrangement: &ArrangementSnapshot,
        map: &TimeMap,
        events: &mut dyn EventSink,
    ) {
        let base = segment.offset as u32;
        if segment.frames == 0 {
            return;
        }
        if !segment.is_rolling() {
            self.release_all(base, events);
            self.expected_sample = None;
            return;
        }

        let jumped = !segment.after_wrap
            && self
                .expected_sample
                .is_some_and(|expected| expected != segment.start_sample);
        if jumped {
            self.release_all(base, events);
        }

        let window = Window::new(segment, map);
        for (index, track) in self.tracks.iter_mut().enumerate() {
            let plan = match arrangement.track(index) {
                Some(plan) if !plan.muted => plan,
                _ => {
                    release_track(track, index, base, events);
                    continue;
                }
            };
            if segment.after_wrap {
                wrap_track(track, index, base, loop_region, events);
            }
            render_track(track, index, plan, &window, map, events);
        }

        self.expected_sample = Some(segment.start_sample + segment.frames as u64);
    }
}

#[inline]
fn put(out: &mut MidiBuffer, event: MidiEvent, track: usize, events: &mut dyn EventSink) {
    if out.insert_sorted(event).is_err() {
        events.emit(Event::EventDropped {
            track,
            offset: event.offset,
        });
    }
}

fn release_track(track: &mut TrackState, index: usize, offset: u32, events: &mut dyn EventSink) {
    let TrackState { out, notes } = track;
    notes.drain(|note| {
        put(
            out,
            MidiEvent::note_off(offset, note.channel, note.pitch),
            index,
            events,
        )
    });
}

/// Close every held note at the seam, then restart the ones that were meant
/// to sound past the loop end with their remaining length. Restarted notes
/// keep their slot, so every held note can be carried.
fn wrap_track(
    track: &mut TrackState,
    index: usize,
    offset: u32,
    region: LoopRegion,
    events: &mut dyn EventSink,
) {
    let TrackState { out, notes } = track;
    for note in notes.iter() {
        put(
            out,
            MidiEvent::note_off(offset, note.channel, note.pitch),
            index,
            events,
        );
    }
    notes.retain(|note| {
        let remaining = note.off_beat - region.end_beat;
        if remaining <= WRAP_EPSILON {
            return false;
        }
        note.off_beat = region.start_beat + remaining;
        put(
            out,
            MidiEvent::note_on(offset, note.channel, note.pitch, note.velocity),
            index,
            events,
        );
        true
    });
}

struct NoteOn {
    on_beat: f64,
    off_beat: f64,
    channel: u8,
    pitch: u8,
    velocity: u8,
    source: NoteSource,
}

fn start_note(
    track: &mut TrackState,
    index: usize,
    note: NoteOn,
    window: &Window,
    map: &TimeMap,
    events: &mut dyn EventSink,
) {
    let on = window.offset(note.on_beat, map);
    let held = HeldNote {
        channel: note.channel,
        pitch: note.pitch,
        velocity: note.velocity,
        off_beat: note.off_beat,
        source: note.source,
    };
    let replaced = match track.notes.hold(held) {
        Ok(replaced) => replaced,
        Err(_) => {
            events.emit(Event::EventDropped { track: index, offset: on });
            return;
        }
    };
    if let Some(previous) = replaced {
        // The later note wins; the earlier one ends no later than it starts.
        let off = window.offset(previous.off_beat.min(note.on_beat), map);
        put(
            &mut track.out,
            MidiEvent::note_off(off, note.channel, note.pitch),
            index,
            events,
        );
    }
    put(
        &mut track.out,
        MidiEvent::note_on(on, note.channel, note.pitch, note.velocity),
        index,
        events,
    );
}

fn emit_due_offs(
    track: &mut TrackState,
    index: usize,
    window: &Window,
    map: &TimeMap,
    events: &mut dyn EventSink,
) {
    while let Some(note) = track.notes.pop_due(window.end) {
        let off = window.offset(note.off_beat, map);
        put(
            &mut track.out,
            MidiEvent::note_off(off, note.channel, note.pitch),
            index,
            events,
        );
    }
}

fn render_track(
    track: &mut TrackState,
    index: usize,
    plan: &TrackPlan,
    window: &Window,
    map: &TimeMap,
    events: &mut dyn EventSink,
) {
    // Notes that started earlier and end inside this window go first, so an
    // off and an on at the same offset come out in that order.
    emit_due_offs(track, index, window, map, events);

    for entry in plan.instances.query(window.start, window.end) {
        render_instance(
            track,
            index,
            &entry.value,
            entry.start,
            entry.end,
            window,
            map,
            events,
        );
    }

    if let Some(steps) = &plan.steps {
        steps.notes_in(window.start, window.end, map, index as u32, |n| {
            start_note(
                track,
                index,
                NoteOn {
                    on_beat: n.on_beat,
                    off_beat: n.off_beat,
                    channel: n.channel,
                    pitch: n.pitch,
                    velocity: n.velocity,
                    source: NoteSource::Steps,
                },
                window,
                map,
                events,
            );
        });
    }

    // Short notes that both start and end inside the window.
    emit_due_offs(track, index, window, map, events);
}

#[allow(clippy::too_many_arguments)]
fn render_instance(
    track: &mut TrackState,
    index: usize,
    instance: &ResolvedInstance,
    start: f64,
    end: f64,
    window: &Window,
    map: &TimeMap,
    events: &mut dyn EventSink,
) {
    let pattern = &instance.pattern;
    let pass = instance.pattern_beats;
    let count = pattern.events().len();
    if count == 0 || pass <= 0.0 {
        return;
    }
    // Timeline beat of pattern position zero.
    let origin = start - instance.offset_beats;
    let from = window.start.max(start) - origin;
    let to = window.end.min(end) - origin;
    if to <= from {
        return;
    }

    let first_pass = (from / pass).floor().max(0.0) as u64;
    let last_pass = (to / pass).floor() as u64;
    for k in first_pass..=last_pass {
        let pass_start = k as f64 * pass;
        let local_from = (from - pass_start).max(0.0);
        let local_to = (to - pass_start).min(pass);
        if local_to <= local_from {
            continue;
        }
        for i in pattern.range(local_from, local_to) {
            let event = &pattern.events()[i];
            let beat = origin + pass_start + event.beat;
            let offset = window.offset(beat, map);
            if event.validate().is_err() {
                events.emit(Event::EventDropped { track: index, offset });
                continue;
            }
            match event.kind {
                PatternEventKind::Note {
                    channel,
                    pitch,
                    velocity,
                    duration,
                    probability,
                } => {
                    let ordinal = (i as u64 + k * count as u64) as u32;
                    let seed =
                        rng::event_seed(window.sample_of(beat, map), instance.id.0, ordinal);
                    if !rng::chance(seed, probability) {
                        continue;
                    }
                    let velocity = clamp_velocity(
                        i32::from(velocity) + i32::from(instance.velocity_offset),
                    );
                    start_note(
                        track,
                        index,
                        NoteOn {
                            on_beat: beat,
                            off_beat: (beat + duration).min(end),
                            channel,
                            pitch,
                            velocity,
                            source: NoteSource::Instance(instance.id.0),
                        },
                        window,
                        map,
                        events,
                    );
                }
                _ => {
                    if let Some(message) = event.to_midi(offset) {
                        put(&mut track.out, message, index, events);
                    }
                }
            }
        }
    }
}
