//! Tolerance constants for audio testing.
//!
//! Different operations require different precision levels.

/// Floating point rounding errors (passthrough, exact gain, DC levels).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// DSP processing tolerance (envelopes, smoothed gains).
pub const DSP_EPSILON: f32 = 1e-4;

/// Audio perceptual tolerance (~-60dB, inaudible differences).
pub const PERCEPTUAL_EPSILON: f32 = 0.001;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

/// Beat/sample conversions must agree to this many beats.
pub const BEAT_EPSILON: f64 = 1e-9;

/// 16-bit quantization step size.
/// Use when checking takes exported to 16-bit WAV.
pub const INT16_EPSILON: f32 = 1.0 / 32768.0;
