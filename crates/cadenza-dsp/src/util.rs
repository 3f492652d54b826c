//! Small conversions shared by the nodes.

/// Level floor for the detector.
pub(crate) const DB_FLOOR: f32 = -96.0;

#[inline]
pub(crate) fn amplitude_to_db(amp: f32) -> f32 {
    if amp <= 0.0 {
        DB_FLOOR
    } else {
        (20.0 * amp.log10()).max(DB_FLOOR)
    }
}

#[inline]
pub(crate) fn db_to_amplitude(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// One-pole smoothing coefficient for a time constant in seconds.
#[inline]
pub(crate) fn time_to_coeff(time_seconds: f32, sample_rate: f64) -> f32 {
    if time_seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (f64::from(time_seconds) * sample_rate)).exp() as f32
    }
}

/// Block-rate parameter value, or `fallback` when the node runs without a
/// parameter layout bound (e.g. driven directly in a test).
#[inline]
pub(crate) fn param_or(params: &cadenza_core::ParamValues<'_>, index: usize, fallback: f32) -> f32 {
    if index < params.len() {
        params.get(index)
    } else {
        fallback
    }
}
