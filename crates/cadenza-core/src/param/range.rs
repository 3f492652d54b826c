//! Parameter ranges, scaling and descriptors.
//!
//! Normalized (0.0-1.0) values are what automation lanes and UI controls
//! store; nodes receive real values.

use serde::{Deserialize, Serialize};

/// How a parameter value is scaled between normalized (0-1) and real values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ParameterScale {
    /// `real = min + normalized * (max - min)`
    #[default]
    Linear,

    /// `real = min * (max/min)^normalized`. Requires `min > 0`.
    Logarithmic,

    /// `curve > 1.0` gives more resolution at the low end.
    Exponential { curve: f32 },

    /// Normalized < 0.5 is `min`, otherwise `max`.
    Toggle,

    /// Values snap to whole numbers.
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub scale: ParameterScale,
}

impl ParameterRange {
    pub fn new(min: f32, max: f32, default: f32, scale: ParameterScale) -> Self {
        let (min, max) = if max >= min { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            default: default.clamp(min, max),
            scale,
        }
    }

    pub fn linear(min: f32, max: f32, default: f32) -> Self {
        Self::new(min, max, default, ParameterScale::Linear)
    }

    pub fn logarithmic(min: f32, max: f32, default: f32) -> Self {
        Self::new(min, max, default, ParameterScale::Logarithmic)
    }

    pub fn toggle(default_on: bool) -> Self {
        Self::new(0.0, 1.0, if default_on { 1.0 } else { 0.0 }, ParameterScale::Toggle)
    }

    pub fn integer(min: i32, max: i32, default: i32) -> Self {
        Self::new(min as f32, max as f32, default as f32, ParameterScale::Integer)
    }

    /// Gain in decibels, linear in dB.
    pub fn decibels(min_db: f32, max_db: f32, default_db: f32) -> Self {
        Self::linear(min_db, max_db, default_db)
    }

    pub fn normalize(&self, value: f32) -> f32 {
        let value = self.clamp(value);
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        match self.scale {
            ParameterScale::Logarithmic if self.min > 0.0 => {
                (value.ln() - self.min.ln()) / (self.max.ln() - self.min.ln())
            }
            ParameterScale::Exponential { curve } if curve > 0.0 && curve != 1.0 => {
                ((value - self.min) / span).powf(1.0 / curve)
            }
            ParameterScale::Toggle => {
                if value >= (self.min + self.max) / 2.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ParameterScale::Integer => (value.round() - self.min) / span,
            _ => (value - self.min) / span,
        }
    }

    pub fn denormalize(&self, normalized: f32) -> f32 {
        let n = normalized.clamp(0.0, 1.0);
        let span = self.max - self.min;
        match self.scale {
            ParameterScale::Logarithmic if self.min > 0.0 => {
                (self.min.ln() + n * (self.max.ln() - self.min.ln())).exp()
            }
            ParameterScale::Exponential { curve } if curve > 0.0 && curve != 1.0 => {
                self.min + n.powf(curve) * span
            }
            ParameterScale::Toggle => {
                if n >= 0.5 {
                    self.max
                } else {
                    self.min
                }
            }
            ParameterScale::Integer => (self.min + n * span).round(),
            _ => self.min + n * span,
        }
    }

    /// Clamp into range; NaN falls back to the default.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// True for scales that jump rather than glide.
    #[inline]
    pub fn is_discrete(&self) -> bool {
        matches!(self.scale, ParameterScale::Toggle | ParameterScale::Integer)
    }
}

impl Default for ParameterRange {
    fn default() -> Self {
        Self::linear(0.0, 1.0, 0.5)
    }
}

/// One entry of a node's parameter layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub id: u32,
    pub name: String,
    pub unit: String,
    pub range: ParameterRange,
    pub automatable: bool,
    /// Ramps are rendered per sample instead of once per block.
    pub sample_accurate: bool,
}

impl ParameterDescriptor {
    pub fn new(id: u32, name: impl Into<String>, range: ParameterRange) -> Self {
        Self {
            id,
            name: name.into(),
            unit: String::new(),
            range,
            automatable: true,
            sample_accurate: false,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn sample_accurate(mut self) -> Self {
        self.sample_accurate = true;
        self
    }

    pub fn not_automatable(mut self) -> Self {
        self.automatable = false;
        self
    }
}

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// -inf for amplitude <= 0.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}
