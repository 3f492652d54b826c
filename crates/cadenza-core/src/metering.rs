//! Peak/RMS metering.
//!
//! [`MeterLevels`] accumulates on the audio thread across the blocks of one
//! metering interval; [`AtomicLevels`] mirrors the last reading for UI
//! threads that poll instead of draining events.

use crate::buffer::AudioBlock;
use crate::lockfree::AtomicFloat;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterReading {
    pub peak_l: f32,
    pub peak_r: f32,
    /// RMS over both channels and the whole interval.
    pub rms: f32,
}

#[derive(Debug, Clone, Default)]
pub struct MeterLevels {
    peak_l: f32,
    peak_r: f32,
    sum_sq: f64,
    samples: u64,
}

impl MeterLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the active frames of `block` in. Mono blocks meter as both sides.
    pub fn accumulate(&mut self, block: &AudioBlock) {
        if block.channels() == 0 || block.frames() == 0 {
            return;
        }
        let left = block.channel(0);
        let right = if block.channels() > 1 {
            block.channel(1)
        } else {
            left
        };
        for (&l, &r) in left.iter().zip(right) {
            self.peak_l = self.peak_l.max(l.abs());
            self.peak_r = self.peak_r.max(r.abs());
            self.sum_sq += f64::from(l) * f64::from(l) + f64::from(r) * f64::from(r);
        }
        self.samples += 2 * left.len() as u64;
    }

    pub fn reading(&self) -> MeterReading {
        let rms = if self.samples == 0 {
            0.0
        } else {
            (self.sum_sq / self.samples as f64).sqrt() as f32
        };
        MeterReading {
            peak_l: self.peak_l,
            peak_r: self.peak_r,
            rms,
        }
    }

    /// Return the reading and start a new interval.
    pub fn take(&mut self) -> MeterReading {
        let reading = self.reading();
        *self = Self::default();
        reading
    }
}

/// Lock-free copy of the latest reading.
#[derive(Debug, Default)]
pub struct AtomicLevels {
    peak_l: AtomicFloat,
    peak_r: AtomicFloat,
    rms: AtomicFloat,
}

impl AtomicLevels {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, reading: MeterReading) {
        self.peak_l.set(reading.peak_l);
        self.peak_r.set(reading.peak_r);
        self.rms.set(reading.rms);
    }

    #[inline]
    pub fn get(&self) -> MeterReading {
        MeterReading {
            peak_l: self.peak_l.get(),
            peak_r: self.peak_r.get(),
            rms: self.rms.get(),
        }
    }
}
