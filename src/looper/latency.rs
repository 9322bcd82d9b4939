//! Round-trip latency calibration: play a tone, time its arrival at the mic.

use std::sync::Arc;

use crate::audio::{AudioBuffer, AudioEngine};
use crate::instrument::drum_synth::generate_tone;
use crate::mixer::TrackId;
use crate::voice::VoiceHandle;

pub const REFERENCE_HZ: f64 = 1000.0;
pub const REFERENCE_SECONDS: f64 = 0.05;
pub const REFERENCE_LEVEL: f32 = 0.5;
/// Input RMS that counts as hearing the tone.
pub const DETECTION_THRESHOLD: f32 = 0.1;
/// Fixed processing time removed from the measurement.
pub const PROCESSING_OFFSET: f64 = 0.020;
pub const TIMEOUT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// The tone was not heard within [`TIMEOUT`].
    Timeout,
    /// No microphone to listen with.
    NoInput,
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CalibrationError::Timeout => write!(f, "reference tone not detected within {TIMEOUT}s"),
            CalibrationError::NoInput => write!(f, "no input device for calibration"),
        }
    }
}

impl std::error::Error for CalibrationError {}

/// A calibration in progress.
///
/// Only input drained after the tone starts counts, and the level has to
/// rise through [`DETECTION_THRESHOLD`] from below.
#[derive(Debug)]
pub struct LatencyCalibrator {
    started_at: f64,
    tone: VoiceHandle,
    seen: u64,
    quiet: bool,
}

impl LatencyCalibrator {
    /// Play the reference tone now and start listening.
    pub fn start(engine: &mut AudioEngine) -> Result<Self, CalibrationError> {
        if !engine.capture.has_input() {
            return Err(CalibrationError::NoInput);
        }
        let sample_rate = engine.sample_rate();
        let tone = AudioBuffer::from_mono(
            generate_tone(sample_rate, REFERENCE_HZ, REFERENCE_SECONDS, REFERENCE_LEVEL),
            sample_rate,
        );
        let started_at = engine.current_time();
        let tone = engine
            .voices
            .play_buffer(Arc::new(tone), started_at, 1.0, TrackId::Samples);
        tracing::info!(started_at, "latency calibration started");
        Ok(Self {
            started_at,
            tone,
            seen: engine.capture.samples_drained(),
            quiet: engine.capture.input_level() <= DETECTION_THRESHOLD,
        })
    }

    /// Check the input level. `Some` once the measurement is done or timed out.
    pub fn poll(&mut self, engine: &AudioEngine) -> Option<Result<f64, CalibrationError>> {
        let elapsed = engine.current_time() - self.started_at;
        let drained = engine.capture.samples_drained();
        if drained > self.seen {
            self.seen = drained;
            if engine.capture.input_level() <= DETECTION_THRESHOLD {
                self.quiet = true;
            } else if self.quiet {
                let latency = (elapsed - PROCESSING_OFFSET).max(0.0);
                tracing::info!(latency, "latency measured");
                return Some(Ok(latency));
            }
        }
        if elapsed > TIMEOUT {
            tracing::warn!(elapsed, "latency calibration timed out");
            return Some(Err(CalibrationError::Timeout));
        }
        None
    }

    /// Stop the tone early.
    pub fn abort(self, engine: &mut AudioEngine) {
        let now = engine.current_time();
        engine.voices.stop_voice(self.tone, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RingInput;
    use ringbuf::traits::Producer;

    const SR: u32 = 8000;

    #[test]
    fn needs_an_input() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        assert_eq!(
            LatencyCalibrator::start(&mut engine).unwrap_err(),
            CalibrationError::NoInput
        );
    }

    #[test]
    fn measures_arrival_minus_offset() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        let (mut mic, input) = RingInput::channel(SR, 8000);
        engine.capture.attach(Box::new(input));
        let mut cal = LatencyCalibrator::start(&mut engine).unwrap();

        // 50 ms of silence, then the tone comes back.
        for _ in 0..400 {
            mic.try_push(0.0).unwrap();
        }
        engine.render_mono(400);
        engine.capture.pump();
        assert!(cal.poll(&engine).is_none());

        for _ in 0..400 {
            mic.try_push(0.4).unwrap();
        }
        engine.render_mono(400);
        engine.capture.pump();
        let latency = cal.poll(&engine).unwrap().unwrap();
        assert!((latency - 0.080).abs() < 1e-9);
    }

    #[test]
    fn level_from_before_the_tone_is_ignored() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        let (mut mic, input) = RingInput::channel(SR, 8000);
        engine.capture.attach(Box::new(input));
        for _ in 0..400 {
            mic.try_push(0.5).unwrap();
        }
        engine.capture.pump();

        let mut cal = LatencyCalibrator::start(&mut engine).unwrap();
        engine.render_mono(80);
        engine.capture.pump();
        assert!(cal.poll(&engine).is_none());
    }

    #[test]
    fn steady_loud_input_never_crosses() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        let (mut mic, input) = RingInput::channel(SR, 16000);
        engine.capture.attach(Box::new(input));
        for _ in 0..400 {
            mic.try_push(0.5).unwrap();
        }
        engine.capture.pump();

        let mut cal = LatencyCalibrator::start(&mut engine).unwrap();
        for _ in 0..22 {
            for _ in 0..400 {
                mic.try_push(0.5).unwrap();
            }
            engine.render_mono(400);
            engine.capture.pump();
            if let Some(result) = cal.poll(&engine) {
                assert_eq!(result, Err(CalibrationError::Timeout));
                return;
            }
        }
        panic!("calibration never finished");
    }

    #[test]
    fn silence_times_out() {
        let mut engine = AudioEngine::new(SR, 30, 1);
        let (_mic, input) = RingInput::channel(SR, 8000);
        engine.capture.attach(Box::new(input));
        let mut cal = LatencyCalibrator::start(&mut engine).unwrap();
        engine.render_mono(8800);
        engine.capture.pump();
        assert_eq!(cal.poll(&engine), Some(Err(CalibrationError::Timeout)));
    }
}
