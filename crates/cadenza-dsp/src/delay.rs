//! Feedback delay: the one node allowed to close a cycle.

use cadenza_core::{
    AudioBlock, BlockContext, ChannelPolicy, MidiBuffer, NodeFault, NodeKind, ParameterDescriptor,
    ParameterRange, PortDescriptor, PrepareContext, Processor, Result,
};

use crate::util::param_or;

pub const FEEDBACK: usize = 0;
pub const MIX: usize = 1;

const MAX_FEEDBACK: f32 = 0.95;

/// Stereo delay line with internal feedback.
///
/// The delay is never shorter than the engine's maximum block size, which
/// is what lets the graph accept an edge leaving this node back into an
/// earlier one: whatever reads it only sees samples from a previous block.
pub struct FeedbackDelay {
    requested: usize,
    delay: usize,
    feedback: f32,
    mix: f32,
    lines: Vec<Vec<f32>>,
    write: usize,
}

impl FeedbackDelay {
    pub fn new(delay_samples: usize, feedback: f32) -> Self {
        Self {
            requested: delay_samples,
            delay: delay_samples.max(1),
            feedback: feedback.clamp(0.0, MAX_FEEDBACK),
            mix: 1.0,
            lines: Vec::new(),
            write: 0,
        }
    }

    /// Wet/dry balance, 1.0 is wet only.
    pub fn with_mix(mut self, mix: f32) -> Self {
        self.mix = mix.clamp(0.0, 1.0);
        self
    }

    /// Effective delay once prepared.
    pub fn delay_samples(&self) -> usize {
        self.delay
    }
}

impl Processor for FeedbackDelay {
    fn kind(&self) -> NodeKind {
        NodeKind::Effect
    }

    fn name(&self) -> &str {
        "feedback-delay"
    }

    fn prepare(&mut self, ctx: &PrepareContext<'_>) -> Result<()> {
        self.delay = self.requested.max(ctx.max_frames).max(1);
        self.lines = vec![vec![0.0; self.delay]; 2];
        self.write = 0;
        Ok(())
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write = 0;
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
        if self.lines.is_empty() {
            return Err(NodeFault::InvalidState);
        }
        let feedback = param_or(&ctx.params, FEEDBACK, self.feedback).clamp(0.0, MAX_FEEDBACK);
        let mix = param_or(&ctx.params, MIX, self.mix);
        let len = self.delay;

        for (ch, line) in self.lines.iter_mut().enumerate().take(out.channels()) {
            let src = ch.min(input.channels().saturating_sub(1));
            let dry = input.channel(src);
            let mut pos = self.write;
            for (i, o) in out.channel_mut(ch).iter_mut().enumerate() {
                let x = dry.get(i).copied().unwrap_or(0.0);
                let delayed = line[pos];
                line[pos] = x + delayed * feedback;
                *o = x * (1.0 - mix) + delayed * mix;
                pos += 1;
                if pos == len {
                    pos = 0;
                }
            }
        }
        self.write = (self.write + ctx.frames) % len;
        Ok(())
    }

    fn input_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::stereo("in").policy(ChannelPolicy::WidenMono)]
    }

    fn is_feedback_delay(&self) -> bool {
        true
    }

    fn parameter_layout(&self) -> Vec<ParameterDescriptor> {
        vec![
            ParameterDescriptor::new(
                FEEDBACK as u32,
                "feedback",
                ParameterRange::linear(0.0, MAX_FEEDBACK, self.feedback),
            ),
            ParameterDescriptor::new(MIX as u32, "mix", ParameterRange::linear(0.0, 1.0, self.mix)),
        ]
    }
}
