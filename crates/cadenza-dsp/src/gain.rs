//! Gain stage and summing buses.

use cadenza_core::{
    db_to_linear, AudioBlock, BlockContext, ChannelPolicy, MidiBuffer, NodeFault, NodeKind,
    ParameterDescriptor, ParameterRange, PortDescriptor, PrepareContext, Processor, Result,
};

use crate::util::param_or;

/// Parameter index of the level in dB, for both nodes here.
pub const LEVEL: usize = 0;

const MIN_DB: f32 = -96.0;
const MAX_DB: f32 = 24.0;

/// Copy `input` to `out` scaled by `gain`, widening mono. `ramp`, when
/// present, holds per-sample dB values.
fn apply_level(input: &AudioBlock, out: &mut AudioBlock, gain: f32, ramp: Option<&[f32]>) {
    for ch in 0..out.channels() {
        let src = ch.min(input.channels().saturating_sub(1));
        if src >= input.channels() {
            out.channel_mut(ch).fill(0.0);
            continue;
        }
        match ramp {
            Some(ramp) => {
                let source = input.channel(src);
                for ((d, s), db) in out.channel_mut(ch).iter_mut().zip(source).zip(ramp) {
                    *d = s * level_to_gain(*db);
                }
            }
            None => out.copy_from(ch, input, src, gain),
        }
    }
}

#[inline]
fn level_to_gain(db: f32) -> f32 {
    if db <= MIN_DB {
        0.0
    } else {
        db_to_linear(db)
    }
}

/// Stereo gain in dB. The level parameter is sample accurate, so automated
/// fades ramp per sample instead of stepping per block.
pub struct GainNode {
    level_db: f32,
}

impl GainNode {
    pub fn new(level_db: f32) -> Self {
        Self {
            level_db: level_db.clamp(MIN_DB, MAX_DB),
        }
    }

    pub fn unity() -> Self {
        Self::new(0.0)
    }
}

impl Processor for GainNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Effect
    }

    fn name(&self) -> &str {
        "gain"
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}

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
        let db = param_or(&ctx.params, LEVEL, self.level_db);
        apply_level(input, out, level_to_gain(db), ctx.params.ramp(LEVEL));
        Ok(())
    }

    fn input_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::stereo("in").policy(ChannelPolicy::WidenMono)]
    }

    fn parameter_layout(&self) -> Vec<ParameterDescriptor> {
        vec![ParameterDescriptor::new(
            LEVEL as u32,
            "level",
            ParameterRange::decibels(MIN_DB, MAX_DB, self.level_db),
        )
        .unit("dB")
        .sample_accurate()]
    }
}

/// Summing point. Every connection into the input port is mixed by the
/// graph before `process`; the bus applies its fader and passes the sum on.
///
/// [`BusNode::master`] builds the single master node whose output is the
/// engine output.
pub struct BusNode {
    kind: NodeKind,
    name: String,
    channels: usize,
    level_db: f32,
}

impl BusNode {
    pub fn new(name: impl Into<String>, channels: usize) -> Self {
        Self {
            kind: NodeKind::Bus,
            name: name.into(),
            channels: channels.max(1),
            level_db: 0.0,
        }
    }

    pub fn master(channels: usize) -> Self {
        Self {
            kind: NodeKind::Master,
            ..Self::new("master", channels)
        }
    }

    pub fn with_level(mut self, level_db: f32) -> Self {
        self.level_db = level_db.clamp(MIN_DB, MAX_DB);
        self
    }
}

impl Processor for BusNode {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self, ctx: &PrepareContext<'_>) -> Result<()> {
        if self.channels > ctx.max_channels {
            return Err(cadenza_core::Error::InvalidArgument(format!(
                "bus '{}' needs {} channels, engine allows {}",
                self.name, self.channels, ctx.max_channels
            )));
        }
        Ok(())
    }

    fn reset(&mut self) {}

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
        let db = param_or(&ctx.params, LEVEL, self.level_db);
        apply_level(input, out, level_to_gain(db), None);
        Ok(())
    }

    fn input_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::new("in", self.channels).policy(ChannelPolicy::WidenMono)]
    }

    fn output_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::new("out", self.channels)]
    }

    fn parameter_layout(&self) -> Vec<ParameterDescriptor> {
        vec![ParameterDescriptor::new(
            LEVEL as u32,
            "level",
            ParameterRange::decibels(MIN_DB, MAX_DB, self.level_db),
        )
        .unit("dB")]
    }
}
