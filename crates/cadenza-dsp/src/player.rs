//! Timeline-anchored playback of a buffer delivered from off the audio
//! thread.

use cadenza_core::{
    AudioBlock, AudioData, BlockContext, MidiBuffer, NodeFault, NodeKind, PortDescriptor,
    PrepareContext, Processor, Result,
};

/// Plays an [`AudioData`] placed at a fixed timeline sample while the
/// transport rolls.
///
/// Buffers arrive through [`Processor::accept_buffer`], typically the result
/// of a worker job. The previous buffer is handed back so the graph can free
/// it off the audio thread. A buffer whose sample rate differs from the
/// engine's is ignored (played as silence) rather than resampled.
pub struct BufferPlayer {
    anchor: u64,
    channels: usize,
    gain: f32,
    sample_rate: f64,
    data: Option<Box<AudioData>>,
}

impl BufferPlayer {
    /// Play from timeline sample `anchor` with `channels` output channels.
    pub fn new(anchor: u64, channels: usize) -> Self {
        Self {
            anchor,
            channels: channels.max(1),
            gain: 1.0,
            sample_rate: 0.0,
            data: None,
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Preload a buffer before the node is inserted.
    pub fn with_data(mut self, data: AudioData) -> Self {
        self.data = Some(Box::new(data));
        self
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    fn playable(&self) -> Option<&AudioData> {
        self.data
            .as_deref()
            .filter(|d| (d.sample_rate - self.sample_rate).abs() < 1e-6 && !d.channels.is_empty())
    }
}

impl Processor for BufferPlayer {
    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn name(&self) -> &str {
        "buffer-player"
    }

    fn prepare(&mut self, ctx: &PrepareContext<'_>) -> Result<()> {
        self.sample_rate = ctx.sample_rate;
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
        out.clear_active();
        if !ctx.transport.is_rolling() {
            return Ok(());
        }
        let Some(data) = self.playable() else {
            return Ok(());
        };

        let playhead = ctx.transport.playhead_sample;
        let total = data.frames() as u64;
        let block_end = playhead + ctx.frames as u64;
        let from = playhead.max(self.anchor);
        let to = block_end.min(self.anchor + total);
        if from >= to {
            return Ok(());
        }
        let dest_at = (from - playhead) as usize;
        let src_at = (from - self.anchor) as usize;
        let len = (to - from) as usize;

        for ch in 0..out.channels() {
            let source = &data.channels[ch.min(data.channels.len() - 1)];
            let dest = &mut out.channel_mut(ch)[dest_at..dest_at + len];
            for (d, s) in dest.iter_mut().zip(&source[src_at..src_at + len]) {
                *d = s * self.gain;
            }
        }
        Ok(())
    }

    fn output_ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::new("out", self.channels)]
    }

    fn accept_buffer(&mut self, buffer: Box<AudioData>) -> Option<Box<AudioData>> {
        self.data.replace(buffer)
    }
}
