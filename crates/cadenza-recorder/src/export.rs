//! Take export off the audio thread.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::error::Result;
use crate::take::TakeView;

/// Serialises a finished take. The core hands over the view; where the bytes
/// go is up to the implementation.
pub trait TakeWriter {
    fn write_take(&mut self, view: &TakeView) -> Result<()>;
}

/// 32-bit float WAV, interleaved.
pub fn wav_spec(view: &TakeView) -> WavSpec {
    WavSpec {
        channels: view.channels() as u16,
        sample_rate: view.sample_rate().round() as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

/// Encode `view` into any seekable sink.
pub fn write_wav_to<W: Write + Seek>(view: &TakeView, sink: W) -> Result<()> {
    let mut writer = WavWriter::new(sink, wav_spec(view))?;
    let channels: Vec<&[f32]> = (0..view.channels()).map(|c| view.channel(c)).collect();
    for frame in 0..view.frames() {
        for channel in &channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Writes each take to a WAV file.
#[derive(Debug, Clone)]
pub struct WavFileWriter {
    path: std::path::PathBuf,
}

impl WavFileWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TakeWriter for WavFileWriter {
    fn write_take(&mut self, view: &TakeView) -> Result<()> {
        debug!(path = %self.path.display(), frames = view.frames(), "writing take");
        let file = BufWriter::new(File::create(&self.path)?);
        write_wav_to(view, file)?;
        info!(
            path = %self.path.display(),
            frames = view.frames(),
            channels = view.channels(),
            "take exported"
        );
        Ok(())
    }
}

/// Collects takes in memory; handy for previews and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryWriter {
    pub takes: Vec<Vec<Vec<f32>>>,
}

impl TakeWriter for MemoryWriter {
    fn write_take(&mut self, view: &TakeView) -> Result<()> {
        self.takes.push(view.to_channels());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::take::TakeBuffer;
    use cadenza_core::AudioBlock;
    use std::sync::Arc;

    fn finished_take() -> Arc<TakeBuffer> {
        let take = Arc::new(TakeBuffer::new(2, 32, 48_000.0));
        let input = AudioBlock::filled(2, 16, 0.25);
        assert!(take.begin(0));
        take.append(&input, 0, 0, 16);
        take.end();
        take
    }

    #[test]
    fn test_wav_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let view = TakeView::open(finished_take()).unwrap();
        WavFileWriter::new(&path).write_take(&view).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48_000);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 32);
        assert!(samples.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_memory_writer() {
        let view = TakeView::open(finished_take()).unwrap();
        let mut writer = MemoryWriter::default();
        writer.write_take(&view).unwrap();
        assert_eq!(writer.takes[0].len(), 2);
        assert_eq!(writer.takes[0][0].len(), 16);
    }
}
