//! Loop region and timeline markers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start_beat: f64,
    pub end_beat: f64,
    pub enabled: bool,
}

impl LoopRegion {
    pub fn new(start_beat: f64, end_beat: f64, enabled: bool) -> Result<Self> {
        let region = Self {
            start_beat,
            end_beat,
            enabled,
        };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = self.start_beat.is_finite() && self.end_beat.is_finite();
        if !finite || self.start_beat < 0.0 || (self.enabled && self.end_beat <= self.start_beat) {
            return Err(Error::InvalidLoopRange {
                start: self.start_beat,
                end: self.end_beat,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.end_beat - self.start_beat
    }
}

/// What the transport does when the playhead crosses a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarkerAction {
    #[default]
    None,
    Stop,
    Pause,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub beat: f64,
    pub name: String,
    pub action: MarkerAction,
}

impl Marker {
    pub fn new(beat: f64, name: impl Into<String>) -> Self {
        Self {
            beat,
            name: name.into(),
            action: MarkerAction::None,
        }
    }

    pub fn with_action(mut self, action: MarkerAction) -> Self {
        self.action = action;
        self
    }
}
