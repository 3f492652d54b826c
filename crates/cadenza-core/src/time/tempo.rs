//! Tempo curve with closed-form beat/second integrals.
//!
//! Each pair of consecutive [`TempoPoint`]s forms a segment whose shape is the
//! earlier point's [`CurveKind`]. The elapsed time at every segment start is
//! cached when the map is edited, and within a segment the integral of
//! `60 / bpm(beat)` is evaluated analytically, so both directions of the
//! mapping are a binary search plus a handful of flops.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MAX_BPM: f64 = 1000.0;

/// Beats closer than this are treated as the same position.
pub(crate) const BEAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CurveKind {
    /// Tempo jumps at the next point.
    #[default]
    Step,
    /// BPM moves linearly in beats towards the next point.
    Linear,
    /// BPM moves geometrically in beats towards the next point.
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoPoint {
    pub beat: f64,
    pub bpm: f64,
    pub curve: CurveKind,
}

impl TempoPoint {
    pub fn new(beat: f64, bpm: f64, curve: CurveKind) -> Self {
        Self { beat, bpm, curve }
    }

    pub fn step(beat: f64, bpm: f64) -> Self {
        Self::new(beat, bpm, CurveKind::Step)
    }
}

fn validate_bpm(bpm: f64) -> Result<()> {
    if bpm.is_finite() && bpm > 0.0 && bpm <= MAX_BPM {
        Ok(())
    } else {
        Err(Error::InvalidTempo(bpm))
    }
}

/// Precomputed piece of the tempo curve.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    start_beat: f64,
    start_seconds: f64,
    start_bpm: f64,
    /// `None` for a constant-tempo segment (step curve, equal endpoints, or the last point).
    ramp: Option<Ramp>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Ramp {
    /// bpm(x) = a + k x
    Linear { k: f64 },
    /// bpm(x) = a exp(g x)
    Exponential { g: f64 },
}

/// Below this slope a ramp is numerically indistinguishable from constant tempo.
const FLAT_RAMP: f64 = 1e-12;

impl Segment {
    /// Seconds elapsed `x` beats into the segment.
    fn seconds_at(&self, x: f64) -> f64 {
        let a = self.start_bpm;
        self.start_seconds
            + match self.ramp {
                None => 60.0 * x / a,
                Some(Ramp::Linear { k }) => 60.0 / k * (k * x / a).ln_1p(),
                Some(Ramp::Exponential { g }) => -60.0 / (a * g) * (-g * x).exp_m1(),
            }
    }

    /// Beats into the segment after `t` seconds from its start.
    fn beats_after(&self, t: f64) -> f64 {
        let a = self.start_bpm;
        match self.ramp {
            None => t * a / 60.0,
            Some(Ramp::Linear { k }) => a * (t * k / 60.0).exp_m1() / k,
            Some(Ramp::Exponential { g }) => -(-t * a * g / 60.0).ln_1p() / g,
        }
    }

    fn bpm_at(&self, x: f64) -> f64 {
        let a = self.start_bpm;
        match self.ramp {
            None => a,
            Some(Ramp::Linear { k }) => a + k * x,
            Some(Ramp::Exponential { g }) => a * (g * x).exp(),
        }
    }
}

/// Sorted tempo points plus their precomputed integrals.
///
/// There is always a point at beat 0. Negative beats extrapolate the first
/// tempo backwards so pre-roll arithmetic never falls off the map.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    points: Vec<TempoPoint>,
    segments: Vec<Segment>,
}

impl TempoMap {
    pub fn new(initial_bpm: f64) -> Result<Self> {
        validate_bpm(initial_bpm)?;
        let mut map = Self {
            points: vec![TempoPoint::step(0.0, initial_bpm)],
            segments: Vec::new(),
        };
        map.rebuild();
        Ok(map)
    }

    /// Build from an unsorted list; the list must contain a point at beat 0.
    pub fn from_points(points: &[TempoPoint]) -> Result<Self> {
        let first = points
            .iter()
            .find(|p| p.beat.abs() < BEAT_EPSILON)
            .ok_or_else(|| Error::InvalidArgument("tempo map needs a point at beat 0".into()))?;
        let mut map = Self::new(first.bpm)?;
        for point in points {
            map.add_tempo_point(*point)?;
        }
        Ok(map)
    }

    pub fn points(&self) -> &[TempoPoint] {
        &self.points
    }

    /// Insert a point, replacing any point at the same beat.
    pub fn add_tempo_point(&mut self, point: TempoPoint) -> Result<()> {
        validate_bpm(point.bpm)?;
        if !point.beat.is_finite() || point.beat < -BEAT_EPSILON {
            return Err(Error::InvalidBeat(point.beat));
        }
        let point = if point.beat.abs() < BEAT_EPSILON {
            TempoPoint { beat: 0.0, ..point }
        } else {
            point
        };

        match self
            .points
            .iter()
            .position(|p| (p.beat - point.beat).abs() < BEAT_EPSILON)
        {
            Some(i) => self.points[i] = point,
            None => {
                let at = self.points.partition_point(|p| p.beat < point.beat);
                self.points.insert(at, point);
            }
        }
        self.rebuild();
        Ok(())
    }

    /// Remove the point at `beat`. The beat-0 anchor cannot be removed.
    pub fn remove_tempo_point(&mut self, beat: f64) -> Result<TempoPoint> {
        if beat.abs() < BEAT_EPSILON {
            return Err(Error::InvalidArgument(
                "the tempo point at beat 0 cannot be removed".into(),
            ));
        }
        let i = self
            .points
            .iter()
            .position(|p| (p.beat - beat).abs() < BEAT_EPSILON)
            .ok_or(Error::InvalidBeat(beat))?;
        let removed = self.points.remove(i);
        self.rebuild();
        Ok(removed)
    }

    fn rebuild(&mut self) {
        self.segments.clear();
        let mut seconds = 0.0;
        for (i, point) in self.points.iter().enumerate() {
            let ramp = self.points.get(i + 1).and_then(|next| {
                let len = next.beat - point.beat;
                let ramp = match point.curve {
                    CurveKind::Step => return None,
                    CurveKind::Linear => Ramp::Linear {
                        k: (next.bpm - point.bpm) / len,
                    },
                    CurveKind::Exponential => Ramp::Exponential {
                        g: (next.bpm / point.bpm).ln() / len,
                    },
                };
                let slope = match ramp {
                    Ramp::Linear { k } => k,
                    Ramp::Exponential { g } => g,
                };
                (slope.abs() > FLAT_RAMP).then_some(ramp)
            });
            let segment = Segment {
                start_beat: point.beat,
                start_seconds: seconds,
                start_bpm: point.bpm,
                ramp,
            };
            if let Some(next) = self.points.get(i + 1) {
                seconds = segment.seconds_at(next.beat - point.beat);
            }
            self.segments.push(segment);
        }
    }

    fn segment_for_beat(&self, beat: f64) -> &Segment {
        let i = self.segments.partition_point(|s| s.start_beat <= beat);
        &self.segments[i.saturating_sub(1)]
    }

    fn segment_for_seconds(&self, seconds: f64) -> &Segment {
        let i = self.segments.partition_point(|s| s.start_seconds <= seconds);
        &self.segments[i.saturating_sub(1)]
    }

    pub fn tempo_at_beat(&self, beat: f64) -> f64 {
        if beat <= 0.0 {
            return self.segments[0].start_bpm;
        }
        let segment = self.segment_for_beat(beat);
        segment.bpm_at(beat - segment.start_beat)
    }

    pub fn beat_to_seconds(&self, beat: f64) -> f64 {
        if beat <= 0.0 {
            return 60.0 * beat / self.segments[0].start_bpm;
        }
        let segment = self.segment_for_beat(beat);
        segment.seconds_at(beat - segment.start_beat)
    }

    pub fn seconds_to_beat(&self, seconds: f64) -> f64 {
        if seconds <= 0.0 {
            return seconds * self.segments[0].start_bpm / 60.0;
        }
        let segment = self.segment_for_seconds(seconds);
        segment.start_beat + segment.beats_after(seconds - segment.start_seconds)
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        let mut map = Self {
            points: vec![TempoPoint::step(0.0, 120.0)],
            segments: Vec::new(),
        };
        map.rebuild();
        map
    }
}
