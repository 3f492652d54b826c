//! Combined tempo + meter view with sample conversions.

use super::meter::{Bbt, MeterChange, MeterMap};
use super::region::{Marker, MarkerAction};
use super::tempo::{TempoMap, TempoPoint};
use crate::error::{Error, Result};

/// Everything needed to move between samples, beats, bars and BBT, plus the
/// timeline markers.
///
/// Edited off the audio thread and published as an immutable snapshot; the
/// audio thread only calls the `&self` lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMap {
    tempo: TempoMap,
    meter: MeterMap,
    markers: Vec<Marker>,
    sample_rate: f64,
}

impl TimeMap {
    pub fn new(bpm: f64, numerator: u32, denominator: u32, sample_rate: f64) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "sample rate {sample_rate} must be positive"
            )));
        }
        Ok(Self {
            tempo: TempoMap::new(bpm)?,
            meter: MeterMap::new(numerator, denominator)?,
            markers: Vec::new(),
            sample_rate,
        })
    }

    pub fn from_parts(tempo: TempoMap, meter: MeterMap, sample_rate: f64) -> Self {
        Self {
            tempo,
            meter,
            markers: Vec::new(),
            sample_rate,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    pub fn meter(&self) -> &MeterMap {
        &self.meter
    }

    pub fn add_tempo_point(&mut self, point: TempoPoint) -> Result<()> {
        self.tempo.add_tempo_point(point)
    }

    pub fn remove_tempo_point(&mut self, beat: f64) -> Result<TempoPoint> {
        self.tempo.remove_tempo_point(beat)
    }

    pub fn add_meter_change(&mut self, change: MeterChange) -> Result<()> {
        self.meter.add_meter_change(change)
    }

    pub fn remove_meter_change(&mut self, beat: f64) -> Result<MeterChange> {
        self.meter.remove_meter_change(beat)
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Insert keeping beat order; a marker at the same beat is replaced.
    pub fn add_marker(&mut self, marker: Marker) -> Result<()> {
        if !marker.beat.is_finite() || marker.beat < 0.0 {
            return Err(Error::InvalidBeat(marker.beat));
        }
        match self.markers.iter().position(|m| m.beat == marker.beat) {
            Some(i) => self.markers[i] = marker,
            None => {
                let at = self.markers.partition_point(|m| m.beat < marker.beat);
                self.markers.insert(at, marker);
            }
        }
        Ok(())
    }

    pub fn remove_marker(&mut self, beat: f64) -> Result<Marker> {
        let i = self
            .markers
            .iter()
            .position(|m| m.beat == beat)
            .ok_or(Error::InvalidBeat(beat))?;
        Ok(self.markers.remove(i))
    }

    /// First marker carrying an action in `[from_beat, to_beat)`.
    pub fn next_action_marker(&self, from_beat: f64, to_beat: f64) -> Option<&Marker> {
        let start = self.markers.partition_point(|m| m.beat < from_beat);
        self.markers[start..]
            .iter()
            .take_while(|m| m.beat < to_beat)
            .find(|m| m.action != MarkerAction::None)
    }

    /// Fractional sample position of `beat`.
    #[inline]
    pub fn beat_to_sample(&self, beat: f64) -> f64 {
        self.tempo.beat_to_seconds(beat) * self.sample_rate
    }

    #[inline]
    pub fn sample_to_beat(&self, sample: f64) -> f64 {
        self.tempo.seconds_to_beat(sample / self.sample_rate)
    }

    /// Nearest whole frame at or after transport zero.
    #[inline]
    pub fn beat_to_sample_index(&self, beat: f64) -> u64 {
        self.beat_to_sample(beat).round().max(0.0) as u64
    }

    #[inline]
    pub fn tempo_at_beat(&self, beat: f64) -> f64 {
        self.tempo.tempo_at_beat(beat)
    }

    #[inline]
    pub fn meter_at_beat(&self, beat: f64) -> &MeterChange {
        self.meter.meter_at_beat(beat)
    }

    #[inline]
    pub fn beat_to_bbt(&self, beat: f64) -> Bbt {
        self.meter.beat_to_bbt(beat)
    }

    #[inline]
    pub fn bbt_to_beat(&self, bbt: Bbt) -> f64 {
        self.meter.bbt_to_beat(bbt)
    }

    #[inline]
    pub fn bar_to_beat(&self, bar: f64) -> f64 {
        self.meter.bar_to_beat(bar)
    }

    #[inline]
    pub fn beat_to_bar(&self, beat: f64) -> f64 {
        self.meter.beat_to_bar(beat)
    }

    /// Beats spanned by one sample at `beat`.
    pub fn beats_per_sample(&self, beat: f64) -> f64 {
        self.tempo_at_beat(beat) / (60.0 * self.sample_rate)
    }
}

impl Default for TimeMap {
    fn default() -> Self {
        Self {
            tempo: TempoMap::default(),
            meter: MeterMap::default(),
            markers: Vec::new(),
            sample_rate: 48_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::CurveKind;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_quarter_notes_at_120() {
        let map = TimeMap::new(120.0, 4, 4, 48_000.0).unwrap();
        assert_eq!(map.beat_to_sample_index(1.0), 24_000);
        assert_eq!(map.beat_to_sample_index(4.0), 96_000);
        assert_relative_eq!(map.sample_to_beat(72_000.0), 3.0);
    }

    #[test]
    fn test_bar_positions() {
        let map = TimeMap::new(120.0, 3, 4, 44_100.0).unwrap();
        assert_relative_eq!(map.bar_to_beat(2.0), 6.0);
        assert_eq!(map.beat_to_bbt(6.0), Bbt::new(3, 1, 0));
    }

    #[test]
    fn test_action_markers() {
        let mut map = TimeMap::default();
        map.add_marker(Marker::new(2.0, "verse")).unwrap();
        map.add_marker(Marker::new(8.0, "end").with_action(MarkerAction::Stop))
            .unwrap();
        assert_eq!(map.markers().len(), 2);
        assert!(map.next_action_marker(0.0, 8.0).is_none());
        assert_eq!(map.next_action_marker(0.0, 8.5).unwrap().name, "end");
        assert!(map.remove_marker(3.0).is_err());
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        assert!(TimeMap::new(120.0, 4, 4, 0.0).is_err());
    }

    proptest! {
        #[test]
        fn prop_sample_round_trip(
            bpm in 30.0f64..300.0,
            ramp_to in 30.0f64..300.0,
            ramp_len in 1.0f64..32.0,
            exponential in any::<bool>(),
            beat in 0.0f64..256.0,
        ) {
            let mut map = TimeMap::new(bpm, 4, 4, 48_000.0).unwrap();
            let curve = if exponential { CurveKind::Exponential } else { CurveKind::Linear };
            map.add_tempo_point(TempoPoint::new(0.0, bpm, curve)).unwrap();
            map.add_tempo_point(TempoPoint::step(ramp_len, ramp_to)).unwrap();

            let back = map.sample_to_beat(map.beat_to_sample(beat));
            prop_assert!((back - beat).abs() < 1e-9);
        }
    }
}
