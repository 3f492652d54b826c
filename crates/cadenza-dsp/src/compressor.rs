//! Sidechain compressor (stereo audio, mono key)

use std::sync::Arc;

use cadenza_core::{
    AtomicFloat, AudioBlock, BlockContext, ChannelPolicy, MidiBuffer, NodeFault, NodeKind,
    ParameterDescriptor, ParameterRange, PortDescriptor, PrepareContext, Processor, Result,
};

use crate::util::{amplitude_to_db, db_to_amplitude, param_or, time_to_coeff};

pub const THRESHOLD: usize = 0;
pub const RATIO: usize = 1;
pub const ATTACK: usize = 2;
pub const RELEASE: usize = 3;
pub const MAKEUP: usize = 4;
pub const KNEE: usize = 5;

/// Feed-forward compressor keyed by the sidechain input when one is
/// connected, otherwise by its own input.
///
/// The detector follows peaks instantly and falls with the release time, so
/// a single-sample impulse on the key still holds the gain down for roughly
/// one release period. Gain reduction itself moves with the attack and
/// release times.
pub struct SidechainCompressor {
    threshold_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    makeup_db: f32,
    knee_db: f32,

    sample_rate: f64,
    attack_coeff: f32,
    release_coeff: f32,
    last_attack: f32,
    last_release: f32,

    detector: f32,
    gain_reduction: f32,
    gains: Vec<f32>,
    meter: Arc<AtomicFloat>,
}

impl SidechainCompressor {
    /// `attack` and `release` in seconds.
    pub fn new(threshold_db: f32, ratio: f32, attack: f32, release: f32) -> Self {
        Self {
            threshold_db,
            ratio: ratio.max(1.0),
            attack: attack.max(0.0),
            release: release.max(0.0),
            makeup_db: 0.0,
            knee_db: 0.0,
            sample_rate: 48_000.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            last_attack: -1.0,
            last_release: -1.0,
            detector: 0.0,
            gain_reduction: 0.0,
            gains: Vec::new(),
            meter: Arc::new(AtomicFloat::new(0.0)),
        }
    }

    pub fn with_soft_knee(mut self, knee_db: f32) -> Self {
        self.knee_db = knee_db.max(0.0);
        self
    }

    pub fn with_makeup(mut self, makeup_db: f32) -> Self {
        self.makeup_db = makeup_db;
        self
    }

    /// Current gain reduction in dB (positive means attenuation).
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction
    }

    /// Gain reduction at the end of the last block, readable from any
    /// thread after the node has moved into the graph.
    pub fn gain_reduction_meter(&self) -> Arc<AtomicFloat> {
        Arc::clone(&self.meter)
    }

    #[inline]
    fn update_coefficients(&mut self, attack: f32, release: f32) {
        if (attack - self.last_attack).abs() > 0.00001 {
            self.attack_coeff = time_to_coeff(attack, self.sample_rate);
            self.last_attack = attack;
        }
        if (release - self.last_release).abs() > 0.00001 {
            self.release_coeff = time_to_coeff(release, self.sample_rate);
            self.last_release = release;
        }
    }

    #[inline]
    fn target_reduction(input_db: f32, threshold: f32, ratio: f32, knee: f32) -> f32 {
        let slope = 1.0 - 1.0 / ratio;
        if knee <= 0.0 {
            return (input_db - threshold).max(0.0) * slope;
        }
        let below = threshold - knee / 2.0;
        let above = threshold + knee / 2.0;
        if input_db <= below {
            0.0
        } else if input_db >= above {
            (input_db - threshold) * slope
        } else {
            let x = input_db - below;
            slope * x * x / (2.0 * knee)
        }
    }

    #[inline]
    fn step(&mut self, level: f32, threshold: f32, ratio: f32, knee: f32) -> f32 {
        self.detector = if level > self.detector {
            level
        } else {
            self.release_coeff * self.detector + (1.0 - self.release_coeff) * level
        };
        let target = Self::target_reduction(amplitude_to_db(self.detector), threshold, ratio, knee);
        let coeff = if target > self.gain_reduction {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain_reduction = coeff * self.gain_reduction + (1.0 - coeff) * target;
        self.gain_reduction
    }
}

#[inline]
fn peak_at(block: &AudioBlock, i: usize) -> f32 {
    (0..block.channels())
        .map(|ch| block.channel(ch).get(i).map_or(0.0, |s| s.abs()))
        .fold(0.0, f32::max)
}

impl Processor for SidechainCompressor {
    fn kind(&self) -> NodeKind {
        NodeKind::Sidechain
    }

    fn name(&self) -> &str {
        "sidechain-compressor"
    }

    fn prepare(&mut self, ctx: &PrepareContext<'_>) -> Result<()> {
        self.sample_rate = ctx.sample_rate;
        self.attack_coeff = time_to_coeff(self.attack, ctx.sample_rate);
        self.release_coeff = time_to_coeff(self.release, ctx.sample_rate);
        self.last_attack = self.attack;
        self.last_release = self.release;
        self.gains = vec![1.0; ctx.max_frames];
        Ok(())
    }

    fn reset(&mut self) {
        self.detector = 0.0;
        self.gain_reduction = 0.0;
        self.meter.set(0.0);
    }

    fn process(
        &mut self,
        ctx: &BlockContext<'_>,
        inputs: &[AudioBlock],
        outputs: &mut [AudioBlock],
        _midi_out: &mut MidiBuffer,
    ) -> core::result::Result<(), NodeFault> {
        let (Some(input), Some(out)) = (inputs.first(), outputs.first_mut()) else {
            return Err(NodeFault::MissingInput);
        };
        let frames = ctx.frames;
        if frames > self.gains.len() {
            return Err(NodeFault::InvalidState);
        }

        let p = &ctx.params;
        let threshold = param_or(p, THRESHOLD, self.threshold_db);
        let ratio = param_or(p, RATIO, self.ratio).max(1.0);
        let attack = param_or(p, ATTACK, self.attack);
        let release = param_or(p, RELEASE, self.release);
        let makeup = param_or(p, MAKEUP, self.makeup_db);
        let knee = param_or(p, KNEE, self.knee_db);
        self.update_coefficients(attack, release);

        let key = ctx.sidechain_in.unwrap_or(input);
        for i in 0..frames {
            let reduction = self.step(peak_at(key, i), threshold, ratio, knee);
            self.gains[i] = db_to_amplitude(makeup - reduction);
        }

        for ch in 0..out.channels() {
            let src = ch.min(input.channels().saturating_sub(1));
            let dest = out.channel_mut(ch);
            let source = input.channel(src);
            for ((d, s), g) in dest.iter_mut().zip(source).zip(&self.gains[..frames]) {
                *d = s * g;
            }
        }
        self.meter.set(self.gain_reduction);
        Ok(())
    }

    fn input_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::stereo("in").policy(ChannelPolicy::WidenMono)]
    }

    fn sidechain_port(&self) -> Option<PortDescriptor> {
        Some(PortDescriptor::mono("key").policy(ChannelPolicy::MixDown))
    }

    fn parameter_layout(&self) -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::new(
                THRESHOLD as u32,
                "threshold",
                ParameterRange::decibels(-60.0, 0.0, self.threshold_db),
            )
            .unit("dB"),
            ParameterDescriptor::new(RATIO as u32, "ratio", ParameterRange::linear(1.0, 20.0, self.ratio)),
            ParameterDescriptor::new(ATTACK as u32, "attack", ParameterRange::linear(0.0, 1.0, self.attack))
                .unit("s"),
            ParameterDescriptor::new(
                RELEASE as u32,
                "release",
                ParameterRange::linear(0.0, 5.0, self.release),
            )
            .unit("s"),
            ParameterDescriptor::new(
                MAKEUP as u32,
                "makeup",
                ParameterRange::decibels(0.0, 24.0, self.makeup_db),
            )
            .unit("dB"),
            ParameterDescriptor::new(KNEE as u32, "knee", ParameterRange::decibels(0.0, 24.0, self.knee_db))
                .unit("dB"),
        ]
    }
}
