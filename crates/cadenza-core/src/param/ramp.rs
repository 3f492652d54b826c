//! Linear value ramps for continuous parameter changes.

/// Value gliding linearly to a target over a fixed number of samples.
///
/// Unlike a fixed-time smoother, every target carries its own ramp length,
/// because continuous parameter commands specify the duration explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl LinearRamp {
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Start gliding towards `target`. A zero-length ramp jumps.
    #[inline]
    pub fn set_target(&mut self, target: f32, ramp_samples: u32) {
        if ramp_samples == 0 {
            self.set_immediate(target);
            return;
        }
        self.target = target;
        self.remaining = ramp_samples;
        self.step = (target - self.current) / ramp_samples as f32;
    }

    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Move `samples` forward and return the value reached.
    #[inline]
    pub fn advance(&mut self, samples: u32) -> f32 {
        if self.remaining == 0 {
            return self.current;
        }
        if samples >= self.remaining {
            self.set_immediate(self.target);
        } else {
            self.current += self.step * samples as f32;
            self.remaining -= samples;
        }
        self.current
    }

    /// Per-sample values for the next `out.len()` samples.
    #[inline]
    pub fn fill(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            if self.remaining > 0 {
                self.current += self.step;
                self.remaining -= 1;
                if self.remaining == 0 {
                    // snap to avoid accumulated drift
                    self.current = self.target;
                }
            }
            *sample = self.current;
        }
    }
}

impl Default for LinearRamp {
    fn default() -> Self {
        Self::new(0.0)
    }
}
