//! Audio engine: the pull-rendered audio clock, its voices and its mixer.
//!
//! [`AudioEngine`] is a plain context object: nothing renders unless the host
//! asks for a block. Its clock is the number of frames rendered so far, so
//! every timestamp the scheduler produces lives on the same timeline as the
//! samples. A real-time host pushes the blocks to an [`OutputDevice`]; tests
//! and offline bounces just collect them.

pub mod buffer;
pub mod callback;
pub mod capture;
pub mod command;
pub mod device;
pub mod param;

pub use buffer::{AudioBuffer, BufferError};
pub use capture::{CaptureError, CaptureHub, InputSource, RecordingLease, RingInput};
pub use command::AudioCommand;
pub use device::OutputDevice;
pub use param::{AudioParam, SmoothedParam};

use crate::config::EngineConfig;
use crate::mixer::MixerGraph;
use crate::voice::VoiceEngine;

/// Audio device errors.
#[derive(Debug)]
pub enum AudioError {
    /// No audio output device found.
    NoOutputDevice,
    /// No audio input device found.
    NoInputDevice,
    /// Failed to query device configuration.
    DeviceConfig(String),
    /// Failed to build the audio stream.
    StreamBuild(String),
    /// Failed to start or pause the audio stream.
    StreamPlay(String),
    /// The output queue is full; the device is not draining fast enough.
    BufferFull,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NoOutputDevice => write!(f, "no audio output device found"),
            AudioError::NoInputDevice => write!(f, "no audio input device found"),
            AudioError::DeviceConfig(e) => write!(f, "device config error: {e}"),
            AudioError::StreamBuild(e) => write!(f, "stream build error: {e}"),
            AudioError::StreamPlay(e) => write!(f, "stream play error: {e}"),
            AudioError::BufferFull => write!(f, "audio output queue is full"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Delay before voices are cut by [`AudioEngine::stop_all_sounds`], so the
/// master dip lands first.
const STOP_VOICE_DELAY: f64 = 0.01;

/// The audio context: clock, voices, mixer and the shared microphone.
pub struct AudioEngine {
    sample_rate: u32,
    frames_rendered: u64,
    pub mixer: MixerGraph,
    pub voices: VoiceEngine,
    pub capture: CaptureHub,
    mono: Vec<f32>,
}

impl AudioEngine {
    pub fn new(sample_rate: u32, max_pooled_voices: usize, seed: u64) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            mixer: MixerGraph::new(sample_rate, seed),
            voices: VoiceEngine::new(sample_rate, max_pooled_voices, seed),
            capture: CaptureHub::new(sample_rate),
            mono: Vec::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sample_rate, config.max_pooled_voices, config.seed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// The audio clock in seconds.
    pub fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// Render one interleaved block of `out.len() / channels` frames and
    /// advance the clock.
    pub fn render_block(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let start = self.current_time();

        self.mixer.prepare(frames);
        self.voices.render(start, self.mixer.buses_mut());
        self.mono.clear();
        self.mono.resize(frames, 0.0);
        self.mixer.process(start, &mut self.mono);

        for (frame, &sample) in out.chunks_mut(channels).zip(&self.mono) {
            frame.fill(sample);
        }
        self.frames_rendered += frames as u64;
    }

    /// Render `frames` mono frames into a new vector.
    pub fn render_mono(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.render_block(&mut out, 1);
        out
    }

    /// Silence everything now: dip the master and cut every voice just
    /// after the dip. The mixer graph keeps its settings.
    pub fn stop_all_sounds(&mut self) {
        let now = self.current_time();
        self.mixer.flash_mute(now);
        self.voices.stop_all(now + STOP_VOICE_DELAY);
        tracing::info!(now, "all sounds stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::TrackId;

    const SR: u32 = 8000;

    #[test]
    fn clock_follows_rendered_frames() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        assert_eq!(engine.current_time(), 0.0);
        let mut out = vec![0.0; 800 * 2];
        engine.render_block(&mut out, 2);
        assert_eq!(engine.frames_rendered(), 800);
        assert!((engine.current_time() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn voices_reach_every_channel() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        engine
            .voices
            .start_note(220.0, Some("a"), "organ", 0.0, None, TrackId::Chords);
        let mut out = vec![0.0; 1600 * 2];
        engine.render_block(&mut out, 2);
        assert!(out.iter().any(|s| s.abs() > 0.01));
        for frame in out.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn stop_all_sounds_clears_voices() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        engine
            .voices
            .start_note(220.0, Some("a"), "organ", 0.0, None, TrackId::Chords);
        engine.render_mono(400);
        engine.stop_all_sounds();
        engine.render_mono(800);
        assert_eq!(engine.voices.active_count(), 0);
        // The master comes back to its level after the dip.
        let level = engine.mixer.master_level();
        assert!((engine.mixer.master_gain_at(engine.current_time() + 0.2) - level).abs() < 1e-6);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            AudioError::NoOutputDevice.to_string(),
            "no audio output device found"
        );
        assert_eq!(
            AudioError::DeviceConfig("test".to_string()).to_string(),
            "device config error: test"
        );
        assert_eq!(AudioError::BufferFull.to_string(), "audio output queue is full");
    }
}
