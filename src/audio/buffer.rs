//! Audio buffers: recorded and loaded audio, WAV interchange, trimming and fades.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

/// Errors raised while decoding or encoding audio buffers.
#[derive(Debug)]
pub enum BufferError {
    /// WAV decoding, encoding or I/O error.
    Wav(hound::Error),
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::Wav(e) => write!(f, "WAV error: {e}"),
        }
    }
}

impl std::error::Error for BufferError {}

impl From<hound::Error> for BufferError {
    fn from(e: hound::Error) -> Self {
        BufferError::Wav(e)
    }
}

/// Planar f32 audio at a known sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Silent buffer with `channels` channels of `frames` frames.
    pub fn silent(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels.max(1)],
            sample_rate,
        }
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Build from planar channel data. Shorter channels are zero-padded.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        if channels.is_empty() {
            channels.push(Vec::new());
        }
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for ch in channels.iter_mut() {
            ch.resize(frames, 0.0);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average of all channels at `frame`.
    #[inline]
    pub fn mono_sample(&self, frame: usize) -> f32 {
        let n = self.channels.len() as f32;
        self.channels
            .iter()
            .map(|ch| ch.get(frame).copied().unwrap_or(0.0))
            .sum::<f32>()
            / n
    }

    /// All channels averaged into one.
    pub fn to_mono(&self) -> Vec<f32> {
        (0..self.frames()).map(|i| self.mono_sample(i)).collect()
    }

    /// Copy `len` frames starting at `start`, zero-padding past the end.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let channels = self
            .channels
            .iter()
            .map(|ch| {
                let mut out: Vec<f32> = ch.iter().skip(start).take(len).copied().collect();
                out.resize(len, 0.0);
                out
            })
            .collect();
        Self {
            channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Linear fade-in and fade-out of `fade_frames` each.
    pub fn apply_fades(&mut self, fade_frames: usize) {
        let frames = self.frames();
        let fade = fade_frames.min(frames / 2);
        if fade == 0 {
            return;
        }
        for ch in self.channels.iter_mut() {
            for i in 0..fade {
                let g = i as f32 / fade as f32;
                ch[i] *= g;
                ch[frames - 1 - i] *= g;
            }
        }
    }

    /// Root-mean-square level across every channel.
    pub fn rms(&self) -> f32 {
        let count = self.channels.iter().map(Vec::len).sum::<usize>();
        if count == 0 {
            return 0.0;
        }
        let sum: f32 = self.channels.iter().flatten().map(|s| s * s).sum();
        (sum / count as f32).sqrt()
    }

    /// Decode WAV data, keeping its channels. Resamples to
    /// `target_sample_rate` when given.
    ///
    /// Supports integer and 32-bit float WAV formats. A WAV with no samples
    /// decodes to an empty buffer.
    pub fn from_wav<R: Read + Seek>(
        reader: R,
        target_sample_rate: Option<u32>,
    ) -> Result<Self, BufferError> {
        let wav = hound::WavReader::new(reader)?;
        let spec = wav.spec();
        let channel_count = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max_val = (1u32 << (spec.bits_per_sample - 1)) as f32;
                wav.into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_val))
                    .collect::<Result<Vec<f32>, _>>()?
            }
            hound::SampleFormat::Float => {
                wav.into_samples::<f32>().collect::<Result<Vec<f32>, _>>()?
            }
        };

        let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }

        let buffer = Self {
            channels,
            sample_rate: spec.sample_rate,
        };
        Ok(match target_sample_rate {
            Some(rate) if rate != spec.sample_rate => buffer.resampled(rate),
            _ => buffer,
        })
    }

    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, BufferError> {
        Self::from_wav(Cursor::new(bytes), None)
    }

    pub fn read_wav_file(path: &Path, target_sample_rate: Option<u32>) -> Result<Self, BufferError> {
        let file = std::fs::File::open(path).map_err(hound::Error::IoError)?;
        Self::from_wav(std::io::BufReader::new(file), target_sample_rate)
    }

    /// Encode as 16-bit PCM mono WAV (channels are averaged).
    ///
    /// The output is a canonical 44-byte RIFF header followed by the samples.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, BufferError> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.frames() * 2));
        {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: self.sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for i in 0..self.frames() {
                let s = (self.mono_sample(i) * 32768.0).round();
                writer.write_sample(s.clamp(i16::MIN as f32, i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    pub fn write_wav_file(&self, path: &Path) -> Result<(), BufferError> {
        let bytes = self.to_wav_bytes()?;
        std::fs::write(path, bytes).map_err(|e| BufferError::Wav(hound::Error::IoError(e)))
    }

    /// Linear-interpolation resample of every channel to `target_rate`.
    pub fn resampled(&self, target_rate: u32) -> Self {
        Self {
            channels: self
                .channels
                .iter()
                .map(|ch| resample_linear(ch, self.sample_rate, target_rate))
                .collect(),
            sample_rate: target_rate,
        }
    }
}

/// Linear-interpolation resampling from `source_rate` to `target_rate`.
fn resample_linear(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if input.len() < 2 || source_rate == target_rate {
        return input.to_vec();
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let output_len = (input.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let idx = src_pos as usize;
            let frac = (src_pos - idx as f64) as f32;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
                (Some(&a), None) => a,
                _ => input[input.len() - 1],
            }
        })
        .collect()
}
