//! Fixed-capacity multi-channel audio block.

use crate::config::MAX_CHANNELS;

/// Planar float block with a fixed channel count and frame capacity.
///
/// Storage is one contiguous allocation made at construction; channel `c`
/// lives at `[c * max_frames, c * max_frames + frames)`. The active frame
/// count can shrink for sub-blocks but never grows past `max_frames`, so no
/// method here allocates.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    data: Vec<f32>,
    channels: usize,
    max_frames: usize,
    frames: usize,
}

impl AudioBlock {
    /// Channels beyond [`MAX_CHANNELS`] are clamped.
    pub fn new(channels: usize, max_frames: usize) -> Self {
        let channels = channels.min(MAX_CHANNELS);
        Self {
            data: vec![0.0; channels * max_frames],
            channels,
            max_frames,
            frames: max_frames,
        }
    }

    /// Block filled with `value` on every channel.
    pub fn filled(channels: usize, frames: usize, value: f32) -> Self {
        let mut block = Self::new(channels, frames);
        block.data.fill(value);
        block
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Set the active frame count, clamped to capacity.
    #[inline]
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.max_frames);
    }

    /// Zero every sample, active or not.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Zero only the active frames of every channel.
    pub fn clear_active(&mut self) {
        for ch in 0..self.channels {
            self.channel_mut(ch).fill(0.0);
        }
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.max_frames;
        &self.data[start..start + self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.max_frames;
        &mut self.data[start..start + self.frames]
    }

    /// Two distinct channels mutably at once.
    pub fn channel_pair_mut(&mut self, a: usize, b: usize) -> (&mut [f32], &mut [f32]) {
        assert!(a != b && a < self.channels && b < self.channels);
        let (lo, hi, swap) = if a < b { (a, b, false) } else { (b, a, true) };
        let frames = self.frames;
        let (head, tail) = self.data.split_at_mut(hi * self.max_frames);
        let first = &mut head[lo * self.max_frames..lo * self.max_frames + frames];
        let second = &mut tail[..frames];
        if swap {
            (second, first)
        } else {
            (first, second)
        }
    }

    /// `self[dest_ch] += src[src_ch] * gain` over the active frames.
    pub fn add_from(&mut self, dest_ch: usize, src: &AudioBlock, src_ch: usize, gain: f32) {
        let frames = self.frames.min(src.frames);
        let src = &src.channel(src_ch)[..frames];
        let dest = &mut self.channel_mut(dest_ch)[..frames];
        for (d, s) in dest.iter_mut().zip(src) {
            *d += s * gain;
        }
    }

    /// `self[dest_ch] = src[src_ch] * gain` over the active frames.
    pub fn copy_from(&mut self, dest_ch: usize, src: &AudioBlock, src_ch: usize, gain: f32) {
        let frames = self.frames.min(src.frames);
        let src = &src.channel(src_ch)[..frames];
        let dest = &mut self.channel_mut(dest_ch)[..frames];
        if gain == 1.0 {
            dest.copy_from_slice(src);
        } else {
            for (d, s) in dest.iter_mut().zip(src) {
                *d = s * gain;
            }
        }
    }

    /// Copy `len` frames of every shared channel from `src[src_start..]` into
    /// `self[dest_start..]`. Used to carve sub-blocks out of host buffers.
    pub fn copy_range_from(
        &mut self,
        src: &AudioBlock,
        src_start: usize,
        dest_start: usize,
        len: usize,
    ) {
        let channels = self.channels.min(src.channels);
        let len = len
            .min(src.max_frames.saturating_sub(src_start))
            .min(self.max_frames.saturating_sub(dest_start));
        for ch in 0..channels {
            let s = ch * src.max_frames + src_start;
            let d = ch * self.max_frames + dest_start;
            self.data[d..d + len].copy_from_slice(&src.data[s..s + len]);
        }
    }

    /// Add `len` frames of every shared channel from `src[src_start..]` into
    /// `self[dest_start..]` with `gain`.
    pub fn add_range_from(
        &mut self,
        src: &AudioBlock,
        src_start: usize,
        dest_start: usize,
        len: usize,
        gain: f32,
    ) {
        let channels = self.channels.min(src.channels);
        let len = len
            .min(src.max_frames.saturating_sub(src_start))
            .min(self.max_frames.saturating_sub(dest_start));
        for ch in 0..channels {
            let s = ch * src.max_frames + src_start;
            let d = ch * self.max_frames + dest_start;
            for (out, sample) in self.data[d..d + len].iter_mut().zip(&src.data[s..s + len]) {
                *out += sample * gain;
            }
        }
    }

    pub fn apply_gain(&mut self, gain: f32) {
        for ch in 0..self.channels {
            self.apply_gain_channel(ch, gain);
        }
    }

    pub fn apply_gain_channel(&mut self, ch: usize, gain: f32) {
        for sample in self.channel_mut(ch) {
            *sample *= gain;
        }
    }

    /// Peak absolute value of channel `ch` over the active frames.
    pub fn magnitude(&self, ch: usize) -> f32 {
        self.channel(ch)
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Peak absolute value across every channel.
    pub fn magnitude_all(&self) -> f32 {
        (0..self.channels).fold(0.0f32, |peak, ch| peak.max(self.magnitude(ch)))
    }

    pub fn rms_level(&self, ch: usize) -> f32 {
        let samples = self.channel(ch);
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
        (sum / samples.len() as f64).sqrt() as f32
    }

    /// Fill from an interleaved host buffer holding `frames` frames of
    /// `channels` channels.
    pub fn copy_from_interleaved(&mut self, interleaved: &[f32], channels: usize) {
        let channels_here = self.channels.min(channels);
        let frames = (interleaved.len() / channels.max(1)).min(self.max_frames);
        self.frames = frames;
        for ch in 0..channels_here {
            let base = ch * self.max_frames;
            for frame in 0..frames {
                self.data[base + frame] = interleaved[frame * channels + ch];
            }
        }
    }

    /// Write the active frames into an interleaved host buffer.
    pub fn write_interleaved(&self, interleaved: &mut [f32], channels: usize) {
        let frames = (interleaved.len() / channels.max(1)).min(self.frames);
        for frame in 0..frames {
            for ch in 0..channels {
                interleaved[frame * channels + ch] = if ch < self.channels {
                    self.data[ch * self.max_frames + frame]
                } else {
                    0.0
                };
            }
        }
    }

    /// True when every active sample is finite.
    pub fn is_finite(&self) -> bool {
        (0..self.channels).all(|ch| self.channel(ch).iter().all(|s| s.is_finite()))
    }
}
