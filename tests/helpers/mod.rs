//! Test helpers and fixtures for Cadenza integration tests
//!
//! Every test drives the audio half by hand: no device, no thread, one
//! `process` call per block. That keeps rendering deterministic and lets
//! a test stop at any block boundary to inspect state.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (passthrough, unity gain)
//! - `DSP_EPSILON` (1e-4): DSP processing (envelopes, smoothing)
//! - `PERCEPTUAL_EPSILON` (0.001): Perceptual equivalence (-60dB)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

pub mod tolerances;

pub use tolerances::*;

use cadenza::prelude::*;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard block size for deterministic testing
pub const TEST_BLOCK_SIZE: usize = 512;

/// Samples per beat at the default 120 BPM.
pub const SAMPLES_PER_BEAT: usize = 24_000;

/// Route engine logs to the test harness output. Safe to call from every
/// test; only the first call installs the subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Builder preset for tests: no worker threads, default capacities.
pub fn test_builder() -> EngineBuilder {
    EngineBuilder::default()
        .sample_rate(TEST_SAMPLE_RATE)
        .max_block_size(TEST_BLOCK_SIZE)
        .worker_threads(0)
}

/// Build and prepare an engine from the test preset.
pub fn test_engine() -> (Controller, AudioCore) {
    prepared(test_builder())
}

/// Build `builder` and prepare the audio half at its configured block size.
pub fn prepared(builder: EngineBuilder) -> (Controller, AudioCore) {
    init_tracing();
    let (controller, mut core) = builder.build().expect("Failed to build test engine");
    let max_block = core.config().max_block_size;
    let sample_rate = core.config().sample_rate;
    core.prepare(sample_rate, max_block)
        .expect("Failed to prepare audio core");
    (controller, core)
}

/// Master bus id of a freshly built engine.
pub fn master(controller: &Controller) -> NodeId {
    controller.master().expect("builder adds a master bus")
}

/// Drives an [`AudioCore`] block by block and keeps every rendered output
/// frame of the first channel.
pub struct BlockRunner {
    input: AudioBlock,
    output: AudioBlock,
    frames: usize,
    pub rendered: Vec<f32>,
}

impl BlockRunner {
    /// Silent input, `frames` per block.
    pub fn new(frames: usize) -> Self {
        Self::with_input(AudioBlock::new(2, frames), frames)
    }

    /// Every block reads `input` as the driver input.
    pub fn with_input(input: AudioBlock, frames: usize) -> Self {
        Self {
            input,
            output: AudioBlock::new(2, frames),
            frames,
            rendered: Vec::new(),
        }
    }

    /// Render one block and return the output of the first channel.
    pub fn block(&mut self, core: &mut AudioCore) -> &[f32] {
        core.process(&self.input, &mut self.output, self.frames)
            .expect("process failed");
        let start = self.rendered.len();
        self.rendered.extend_from_slice(self.output.channel(0));
        &self.rendered[start..]
    }

    /// Render `blocks` blocks.
    pub fn run(&mut self, core: &mut AudioCore, blocks: usize) {
        for _ in 0..blocks {
            self.block(core);
        }
    }

    /// Keep rendering until at least `samples` frames have been produced.
    pub fn run_until(&mut self, core: &mut AudioCore, samples: usize) {
        while self.rendered.len() < samples {
            self.block(core);
        }
    }

    pub fn output(&self) -> &AudioBlock {
        &self.output
    }
}

/// Render `blocks` silent-input blocks and return the first output channel.
pub fn render(core: &mut AudioCore, blocks: usize) -> Vec<f32> {
    let mut runner = BlockRunner::new(TEST_BLOCK_SIZE);
    runner.run(core, blocks);
    runner.rendered
}

/// Constant-valued driver input on every channel.
pub fn constant_input(value: f32, channels: usize, frames: usize) -> AudioBlock {
    AudioBlock::filled(channels, frames, value)
}

/// Calculate RMS (root mean square) of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Calculate peak (maximum absolute value) of samples.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
}

/// Check if samples are silent (below threshold).
pub fn is_silent(samples: &[f32]) -> bool {
    peak(samples) < SILENCE_THRESHOLD
}

/// Assert that samples are silent.
pub fn assert_silence(samples: &[f32], context: &str) {
    let p = peak(samples);
    assert!(
        p < SILENCE_THRESHOLD,
        "{}: expected silence, got peak {:.6}",
        context,
        p
    );
}

/// Index of the first sample whose magnitude exceeds the silence threshold.
pub fn first_sound(samples: &[f32]) -> Option<usize> {
    samples.iter().position(|s| s.abs() >= SILENCE_THRESHOLD)
}

/// Sample indices where the signal goes from silent to sounding.
pub fn onsets(samples: &[f32]) -> Vec<usize> {
    let mut found = Vec::new();
    let mut sounding = false;
    for (i, s) in samples.iter().enumerate() {
        let now = s.abs() >= SILENCE_THRESHOLD;
        if now && !sounding {
            found.push(i);
        }
        sounding = now;
    }
    found
}

/// Compare two audio buffers with tolerance, returning the worst deviation
/// and where it happened.
pub fn compare_audio(a: &[f32], b: &[f32], tolerance: f32) -> std::result::Result<(), (usize, f32)> {
    assert_eq!(a.len(), b.len(), "buffers differ in length");
    let (index, diff) = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .enumerate()
        .fold((0, 0.0f32), |worst, (i, d)| if d > worst.1 { (i, d) } else { worst });
    if diff > tolerance {
        Err((index, diff))
    } else {
        Ok(())
    }
}
