//! Signal sources: constants, impulse trains, the driver input and a few
//! nodes that are mostly useful for exercising an engine.

use cadenza_core::{
    AudioBlock, BlockContext, MidiBuffer, NodeFault, NodeKind, PortDescriptor, PrepareContext,
    Processor, Result,
};

fn fill_all(outputs: &mut [AudioBlock], value: f32) {
    for out in outputs {
        for ch in 0..out.channels() {
            out.channel_mut(ch).fill(value);
        }
    }
}

/// DC on every output channel.
pub struct ConstantSource {
    value: f32,
    channels: usize,
}

impl ConstantSource {
    pub fn new(value: f32, channels: usize) -> Self {
        Self {
            value,
            channels: channels.max(1),
        }
    }
}

impl Processor for ConstantSource {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn name(&self) -> &str {
        "constant"
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn process(
        &mut self,
        _ctx: &BlockContext<'_>,
        _inputs: &[AudioBlock],
        outputs: &mut [AudioBlock],
        _midi_out: &mut MidiBuffer,
    ) -> core::result::Result<(), NodeFault> {
        fill_all(outputs, self.value);
        Ok(())
    }

    fn output_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::new("out", self.channels)]
    }
}

/// Pulse of `amplitude` lasting `width` samples at the start of every
/// `interval` samples. Free-running: the phase counts processed frames, not
/// timeline position.
pub struct ImpulseSource {
    interval: usize,
    width: usize,
    amplitude: f32,
    channels: usize,
    phase: usize,
}

impl ImpulseSource {
    pub fn new(interval: usize, amplitude: f32) -> Self {
        Self {
            interval: interval.max(1),
            width: 1,
            amplitude,
            channels: 1,
            phase: 0,
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.clamp(1, self.interval);
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }
}

impl Processor for ImpulseSource {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn name(&self) -> &str {
        "impulse"
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.phase = 0;
    }

    fn process(
        &mut self,
        ctx: &BlockContext<'_>,
        _inputs: &[AudioBlock],
        outputs: &mut [AudioBlock],
        _midi_out: &mut MidiBuffer,
    ) -> core::result::Result<(), NodeFault> {
        let Some(out) = outputs.first_mut() else {
            return Ok(());
        };
        for ch in 0..out.channels() {
            let mut phase = self.phase;
            for s in out.channel_mut(ch) {
                *s = if phase < self.width { self.amplitude } else { 0.0 };
                phase += 1;
                if phase == self.interval {
                    phase = 0;
                }
            }
        }
        self.phase = (self.phase + ctx.frames) % self.interval;
        Ok(())
    }

    fn output_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::new("out", self.channels)]
    }
}

/// Driver input channels `[first_channel, first_channel + channels)`.
/// Channels the driver does not provide come out silent.
pub struct HostInput {
    first_channel: usize,
    channels: usize,
}

impl HostInput {
    pub fn new(first_channel: usize, channels: usize) -> Self {
        Self {
            first_channel,
            channels: channels.max(1),
        }
    }
}

impl Processor for HostInput {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn name(&self) -> &str {
        "host-input"
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn process(
        &mut self,
        ctx: &BlockContext<'_>,
        _inputs: &[AudioBlock],
        outputs: &mut [AudioBlock],
        _midi_out: &mut MidiBuffer,
    ) -> core::result::Result<(), NodeFault> {
        let Some(out) = outputs.first_mut() else {
            return Ok(());
        };
        let Some(host) = ctx.host_input else {
            out.clear_active();
            return Ok(());
        };
        for ch in 0..out.channels() {
            let src = self.first_channel + ch;
            if src < host.channels() {
                let frames = out.frames().min(host.frames());
                out.channel_mut(ch)[..frames].copy_from_slice(&host.channel(src)[..frames]);
            } else {
                out.channel_mut(ch).fill(0.0);
            }
        }
        Ok(())
    }

    fn output_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::new("out", self.channels)]
    }
}

/// Outputs a constant until block `fail_at`, then reports `fault` every
/// block after. For checking that an engine isolates a failing node.
pub struct FaultInjector {
    fail_at: u64,
    fault: NodeFault,
    blocks: u64,
    value: f32,
}

impl FaultInjector {
    pub fn new(value: f32, fail_at: u64, fault: NodeFault) -> Self {
        Self {
            fail_at,
            fault,
            blocks: 0,
            value,
        }
    }

    /// Emits NaN instead of returning an error; the graph has to catch it.
    pub fn non_finite(fail_at: u64) -> Self {
        Self::new(0.5, fail_at, NodeFault::NonFinite)
    }
}

impl Processor for FaultInjector {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn name(&self) -> &str {
        "fault-injector"
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.blocks = 0;
    }

    fn process(
        &mut self,
        _ctx: &BlockContext<'_>,
        _inputs: &[AudioBlock],
        outputs: &mut [AudioBlock],
        _midi_out: &mut MidiBuffer,
    ) -> core::result::Result<(), NodeFault> {
        let block = self.blocks;
        self.blocks += 1;
        if block < self.fail_at {
            fill_all(outputs, self.value);
            return Ok(());
        }
        if self.fault == NodeFault::NonFinite {
            fill_all(outputs, f32::NAN);
            return Ok(());
        }
        Err(self.fault)
    }
}

/// Minimal MIDI instrument: outputs `velocity / 127` as DC while any note
/// is held, and forwards its MIDI input unchanged on its MIDI output.
///
/// Note state changes at the exact event offset, so the output shows where
/// inside a block each note started and stopped.
pub struct GateInstrument {
    held: [u8; 128],
    level: f32,
}

impl GateInstrument {
    pub fn new() -> Self {
        Self {
            held: [0; 128],
            level: 0.0,
        }
    }

    pub fn held_notes(&self) -> usize {
        self.held.iter().filter(|&&v| v > 0).count()
    }

    fn refresh_level(&mut self) {
        let loudest = self.held.iter().copied().max().unwrap_or(0);
        self.level = f32::from(loudest) / 127.0;
    }
}

impl Default for GateInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for GateInstrument {
    fn kind(&self) -> NodeKind {
        NodeKind::Instrument
    }

    fn name(&self) -> &str {
        "gate"
    }

    fn prepare(&mut self, _ctx: &PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.held = [0; 128];
        self.level = 0.0;
    }

    fn process(
        &mut self,
        ctx: &BlockContext<'_>,
        _inputs: &[AudioBlock],
        outputs: &mut [AudioBlock],
        midi_out: &mut MidiBuffer,
    ) -> core::result::Result<(), NodeFault> {
        let Some(out) = outputs.first_mut() else {
            return Ok(());
        };
        let frames = ctx.frames.min(out.frames());
        let mut cursor = 0;
        let mut events = ctx.midi_in.iter().peekable();
        while cursor < frames {
            while let Some(event) = events.next_if(|e| (e.offset as usize) <= cursor) {
                if event.is_note_on() {
                    self.held[usize::from(event.data1 & 0x7f)] = event.velocity().unwrap_or(1).max(1);
                } else if event.is_note_off() {
                    self.held[usize::from(event.data1 & 0x7f)] = 0;
                } else if event.is_all_notes_off() {
                    self.held = [0; 128];
                }
                self.refresh_level();
                let _ = midi_out.push(*event);
            }
            let until = events
                .peek()
                .map_or(frames, |e| (e.offset as usize).min(frames));
            for ch in 0..out.channels() {
                out.channel_mut(ch)[cursor..until].fill(self.level);
            }
            cursor = until;
        }
        for event in events {
            let _ = midi_out.push(*event);
        }
        Ok(())
    }

    fn accepts_midi(&self) -> bool {
        true
    }

    fn produces_midi(&self) -> bool {
        true
    }
}
