//! Playlist model: tracks, pattern instances and the snapshot the scheduler
//! reads.
//!
//! [`Arrangement`] is edited on the control thread. [`Arrangement::snapshot`]
//! resolves bars to beats against a [`TimeMap`] and builds one interval index
//! per track; the result is immutable and is what gets published to the
//! audio thread.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use cadenza_core::{NodeId, TimeMap};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::index::{Interval, IntervalIndex};
use crate::pattern::{Pattern, PatternBank, PatternId};
use crate::step::StepPattern;

/// Default snap grid, in bars.
pub const DEFAULT_GRID_BARS: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    /// Node that receives this track's MIDI.
    pub target: Option<NodeId>,
    pub muted: bool,
    pub steps: Option<StepPattern>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            muted: false,
            steps: None,
        }
    }
}

/// Placement of a pattern on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInstance {
    pub id: InstanceId,
    pub pattern: PatternId,
    pub track: usize,
    pub start_bar: f64,
    pub length_bars: f64,
    /// Pattern position at the instance start, in bars. Non-zero after a split.
    pub offset_bars: f64,
    /// Added to every note-on velocity, result clamped to 1..=127.
    pub velocity_offset: i16,
    pub muted: bool,
    /// The referenced pattern is a private copy.
    pub unique: bool,
}

impl PatternInstance {
    #[inline]
    pub fn end_bar(&self) -> f64 {
        self.start_bar + self.length_bars
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrangement {
    tracks: Vec<Track>,
    patterns: PatternBank,
    /// Kept sorted by id.
    instances: Vec<PatternInstance>,
    next_instance: u32,
    grid_bars: f64,
}

impl Default for Arrangement {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            patterns: PatternBank::new(),
            instances: Vec::new(),
            next_instance: 0,
            grid_bars: DEFAULT_GRID_BARS,
        }
    }
}

fn check_bars(what: &str, value: f64, allow_zero: bool) -> Result<()> {
    let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("{what} {value} out of range")))
    }
}

impl Arrangement {
    pub fn new() -> Self {
        Self::default()
    }

    // -- tracks --------------------------------------------------------------

    pub fn add_track(&mut self, name: impl Into<String>) -> usize {
        self.tracks.push(Track::new(name));
        self.tracks.len() - 1
    }

    /// Remove a track with its instances. Later tracks shift down by one.
    pub fn remove_track(&mut self, index: usize) -> Result<Track> {
        self.check_track(index)?;
        let track = self.tracks.remove(index);
        self.instances.retain(|i| i.track != index);
        for instance in &mut self.instances {
            if instance.track > index {
                instance.track -= 1;
            }
        }
        debug!(track = index, "track removed");
        Ok(track)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Result<&Track> {
        self.tracks.get(index).ok_or(Error::UnknownTrack(index))
    }

    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track> {
        self.tracks.get_mut(index).ok_or(Error::UnknownTrack(index))
    }

    pub fn set_track_target(&mut self, index: usize, target: Option<NodeId>) -> Result<()> {
        self.track_mut(index)?.target = target;
        Ok(())
    }

    pub fn set_track_muted(&mut self, index: usize, muted: bool) -> Result<()> {
        self.track_mut(index)?.muted = muted;
        Ok(())
    }

    pub fn set_step_pattern(&mut self, index: usize, steps: Option<StepPattern>) -> Result<()> {
        self.track_mut(index)?.steps = steps;
        Ok(())
    }

    fn check_track(&self, index: usize) -> Result<()> {
        if index < self.tracks.len() {
            Ok(())
        } else {
            Err(Error::UnknownTrack(index))
        }
    }

    // -- patterns ------------------------------------------------------------

    pub fn patterns(&self) -> &PatternBank {
        &self.patterns
    }

    pub fn patterns_mut(&mut self) -> &mut PatternBank {
        &mut self.patterns
    }

    /// Delete a pattern that no instance references.
    pub fn remove_pattern(&mut self, id: PatternId) -> Result<Pattern> {
        if self.instances.iter().any(|i| i.pattern == id) {
            return Err(Error::InvalidArgument(format!(
                "pattern {id} is still placed in the arrangement"
            )));
        }
        self.patterns.remove(id)
    }

    // -- instances -----------------------------------------------------------

    /// Place `pattern` on `track` at `start_bar`, one pattern length long.
    pub fn create_instance(
        &mut self,
        pattern: PatternId,
        track: usize,
        start_bar: f64,
    ) -> Result<InstanceId> {
        let length = self.patterns.get(pattern)?.length_bars();
        self.create_instance_with_length(pattern, track, start_bar, length)
    }

    pub fn create_instance_with_length(
        &mut self,
        pattern: PatternId,
        track: usize,
        start_bar: f64,
        length_bars: f64,
    ) -> Result<InstanceId> {
        self.check_track(track)?;
        if !self.patterns.contains(pattern) {
            return Err(Error::UnknownPattern(pattern));
        }
        check_bars("start bar", start_bar, true)?;
        check_bars("length", length_bars, false)?;
        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.instances.push(PatternInstance {
            id,
            pattern,
            track,
            start_bar,
            length_bars,
            offset_bars: 0.0,
            velocity_offset: 0,
            muted: false,
            unique: false,
        });
        debug!(%id, %pattern, track, start_bar, "pattern instance created");
        Ok(id)
    }

    pub fn instances(&self) -> &[PatternInstance] {
        &self.instances
    }

    pub fn instances_on(&self, track: usize) -> impl Iterator<Item = &PatternInstance> {
        self.instances.iter().filter(move |i| i.track == track)
    }

    fn position(&self, id: InstanceId) -> Result<usize> {
        self.instances
            .binary_search_by_key(&id, |i| i.id)
            .map_err(|_| Error::UnknownInstance(id))
    }

    pub fn instance(&self, id: InstanceId) -> Result<&PatternInstance> {
        Ok(&self.instances[self.position(id)?])
    }

    fn instance_mut(&mut self, id: InstanceId) -> Result<&mut PatternInstance> {
        let pos = self.position(id)?;
        Ok(&mut self.instances[pos])
    }

    pub fn remove_instance(&mut self, id: InstanceId) -> Result<PatternInstance> {
        let pos = self.position(id)?;
        Ok(self.instances.remove(pos))
    }

    pub fn move_instance(&mut self, id: InstanceId, track: usize, start_bar: f64) -> Result<()> {
        self.check_track(track)?;
        check_bars("start bar", start_bar, true)?;
        let instance = self.instance_mut(id)?;
        instance.track = track;
        instance.start_bar = start_bar;
        Ok(())
    }

    pub fn resize_instance(&mut self, id: InstanceId, length_bars: f64) -> Result<()> {
        check_bars("length", length_bars, false)?;
        self.instance_mut(id)?.length_bars = length_bars;
        Ok(())
    }

    pub fn set_velocity_offset(&mut self, id: InstanceId, offset: i16) -> Result<()> {
        if !(-127..=127).contains(&offset) {
            return Err(Error::InvalidArgument(format!(
                "velocity offset {offset} outside -127..=127"
            )));
        }
        self.instance_mut(id)?.velocity_offset = offset;
        Ok(())
    }

    pub fn set_instance_muted(&mut self, id: InstanceId, muted: bool) -> Result<()> {
        self.instance_mut(id)?.muted = muted;
        Ok(())
    }

    /// Cut an instance at absolute bar `at_bar`. The right half continues the
    /// pattern where the left half stops. Returns the right half's id.
    pub fn split_instance(&mut self, id: InstanceId, at_bar: f64) -> Result<InstanceId> {
        let original = self.instance(id)?.clone();
        if !(at_bar > original.start_bar && at_bar < original.end_bar()) {
            return Err(Error::InvalidArgument(format!(
                "split point {at_bar} is not inside {id}"
            )));
        }
        let left = at_bar - original.start_bar;
        let new_id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.instance_mut(id)?.length_bars = left;
        self.instances.push(PatternInstance {
            id: new_id,
            start_bar: at_bar,
            length_bars: original.length_bars - left,
            offset_bars: original.offset_bars + left,
            ..original
        });
        Ok(new_id)
    }

    /// Copy an instance and place the copy right after it.
    pub fn duplicate_instance(&mut self, id: InstanceId) -> Result<InstanceId> {
        let original = self.instance(id)?.clone();
        let new_id = InstanceId(self.next_instance);
        self.next_instance += 1;
        self.instances.push(PatternInstance {
            id: new_id,
            start_bar: original.end_bar(),
            ..original
        });
        Ok(new_id)
    }

    /// Give the instance a private copy of its pattern.
    pub fn make_unique(&mut self, id: InstanceId) -> Result<PatternId> {
        let shared = self.instance(id)?.pattern;
        let copy = self.patterns.duplicate(shared)?;
        let instance = self.instance_mut(id)?;
        instance.pattern = copy;
        instance.unique = true;
        debug!(%id, from = %shared, to = %copy, "instance made unique");
        Ok(copy)
    }

    pub fn grid_bars(&self) -> f64 {
        self.grid_bars
    }

    pub fn set_grid_bars(&mut self, grid: f64) -> Result<()> {
        check_bars("grid", grid, false)?;
        self.grid_bars = grid;
        Ok(())
    }

    /// Nearest grid line to `bar`.
    pub fn snap_bar(&self, bar: f64) -> f64 {
        ((bar / self.grid_bars).round() * self.grid_bars).max(0.0)
    }

    /// Snap an instance's start and length to the grid. Length never snaps
    /// below one grid step.
    pub fn snap_instance(&mut self, id: InstanceId) -> Result<()> {
        let grid = self.grid_bars;
        let start = self.snap_bar(self.instance(id)?.start_bar);
        let instance = self.instance_mut(id)?;
        instance.start_bar = start;
        instance.length_bars = ((instance.length_bars / grid).round() * grid).max(grid);
        Ok(())
    }

    // -- snapshot ------------------------------------------------------------

    /// Resolve against `map` into the read-only form the scheduler consumes.
    pub fn snapshot(&self, map: &TimeMap) -> ArrangementSnapshot {
        let mut shared: BTreeMap<PatternId, Arc<Pattern>> = BTreeMap::new();
        let mut per_track: Vec<Vec<Interval<ResolvedInstance>>> =
            (0..self.tracks.len()).map(|_| Vec::new()).collect();

        for instance in self.instances.iter().filter(|i| !i.muted) {
            let Ok(pattern) = self.patterns.get(instance.pattern) else {
                continue;
            };
            let pattern = shared
                .entry(instance.pattern)
                .or_insert_with(|| Arc::new(pattern.clone()))
                .clone();
            let start = map.bar_to_beat(instance.start_bar);
            let end = map.bar_to_beat(instance.end_bar());
            let beats_per_bar = map.meter_at_beat(start).beats_per_bar();
            per_track[instance.track].push(Interval {
                start,
                end,
                value: ResolvedInstance {
                    id: instance.id,
                    velocity_offset: instance.velocity_offset,
                    pattern_beats: pattern.length_bars() * beats_per_bar,
                    offset_beats: instance.offset_bars * beats_per_bar,
                    pattern,
                },
            });
        }

        let tracks = self
            .tracks
            .iter()
            .zip(per_track)
            .map(|(track, entries)| TrackPlan {
                muted: track.muted,
                target: track.target,
                instances: IntervalIndex::build(entries),
                steps: track.steps.clone(),
            })
            .collect();
        ArrangementSnapshot { tracks }
    }
}

/// An instance with its time span resolved to beats.
#[derive(Debug, Clone)]
pub struct ResolvedInstance {
    pub id: InstanceId,
    pub velocity_offset: i16,
    pub pattern: Arc<Pattern>,
    /// Beats per pass through the pattern.
    pub pattern_beats: f64,
    /// Pattern position at the instance start, in beats.
    pub offset_beats: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TrackPlan {
    pub muted: bool,
    pub target: Option<NodeId>,
    pub instances: IntervalIndex<ResolvedInstance>,
    pub steps: Option<StepPattern>,
}

/// Immutable view of the arrangement for the audio thread.
#[derive(Debug, Clone, Default)]
pub struct ArrangementSnapshot {
    pub tracks: Vec<TrackPlan>,
}

impl ArrangementSnapshot {
    pub fn track(&self, index: usize) -> Option<&TrackPlan> {
        self.tracks.get(index)
    }
}
