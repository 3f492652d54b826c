//! Delay stage inserted on connections that need latency compensation.

use crate::buffer::AudioBlock;

/// Multi-channel fixed delay with its own output scratch block.
///
/// Allocated when the graph is compiled; `process` only touches
/// pre-sized storage.
#[derive(Debug, Clone)]
pub struct DelayAlign {
    lines: Vec<Vec<f32>>,
    write_pos: usize,
    delay_samples: usize,
    output: AudioBlock,
}

impl DelayAlign {
    pub fn new(channels: usize, delay_samples: usize, max_frames: usize) -> Self {
        let len = delay_samples.max(1);
        Self {
            lines: (0..channels).map(|_| vec![0.0; len]).collect(),
            write_pos: 0,
            delay_samples,
            output: AudioBlock::new(channels, max_frames),
        }
    }

    #[inline]
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    /// Delay the first `frames` frames of `input` and return the result.
    pub fn process(&mut self, input: &AudioBlock, frames: usize) -> &AudioBlock {
        let frames = frames.min(input.frames());
        self.output.set_frames(frames);

        if self.delay_samples == 0 {
            for ch in 0..self.output.channels().min(input.channels()) {
                self.output.copy_from(ch, input, ch, 1.0);
            }
            return &self.output;
        }

        let buffer_len = self.delay_samples;
        let start = self.write_pos;
        for (ch, line) in self.lines.iter_mut().enumerate() {
            if ch >= input.channels() {
                break;
            }
            let source = &input.channel(ch)[..frames];
            let dest = self.output.channel_mut(ch);
            let mut pos = start;
            for (out, &sample) in dest.iter_mut().zip(source) {
                // Ring length equals the delay, so the slot about to be
                // written holds the sample from `delay` frames ago.
                *out = line[pos];
                line[pos] = sample;
                pos += 1;
                if pos == buffer_len {
                    pos = 0;
                }
            }
        }
        self.write_pos = (start + frames) % buffer_len;
        &self.output
    }

    pub fn clear(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.output.clear();
        self.write_pos = 0;
    }
}
