//! Looper: four bar-locked record/playback banks.
//!
//! Banks move through `Empty → Armed → Recording → Playing` on loop
//! boundaries (step 0 of the first progression bar). Recording starts at the
//! first boundary after a full count-in cycle and stops at the next one; the
//! captured audio is trimmed to the loop, latency-compensated and restarted
//! at every boundary from then on.

pub mod bank;
pub mod latency;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use bank::{BankState, BankStatus, LooperBank, Recording};
pub use latency::{CalibrationError, LatencyCalibrator};

use crate::audio::{AudioBuffer, AudioEngine, CaptureError};
use crate::mixer::TrackId;
use crate::scheduler::{StepContext, StepEvent, StepListener};

pub const BANK_COUNT: usize = 4;
/// Capture headroom beyond the loop and its latency, absorbing lookahead and jitter.
pub const CAPTURE_MARGIN: f64 = 0.5;
/// Fade applied to both ends of a finished loop.
pub const LOOP_FADE: f64 = 0.005;
/// Manual stops shorter than this discard the take.
pub const MIN_RECORDING: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum LooperError {
    InvalidBank(usize),
    InvalidTransition {
        bank: usize,
        from: BankStatus,
        action: &'static str,
    },
    Capture(CaptureError),
    Calibration(CalibrationError),
}

impl std::fmt::Display for LooperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LooperError::InvalidBank(i) => write!(f, "no looper bank {i}"),
            LooperError::InvalidTransition { bank, from, action } => {
                write!(f, "cannot {action} bank {bank} while {from}")
            }
            LooperError::Capture(e) => write!(f, "capture error: {e}"),
            LooperError::Calibration(e) => write!(f, "calibration error: {e}"),
        }
    }
}

impl std::error::Error for LooperError {}

impl From<CaptureError> for LooperError {
    fn from(e: CaptureError) -> Self {
        LooperError::Capture(e)
    }
}

impl From<CalibrationError> for LooperError {
    fn from(e: CalibrationError) -> Self {
        LooperError::Calibration(e)
    }
}

/// Things the looper reports for the outside world to act on.
#[derive(Debug, Clone)]
pub enum LooperEvent {
    /// A take was finalized; persist it if needed.
    Recorded {
        bank: usize,
        buffer: Arc<AudioBuffer>,
    },
    /// A take was too short and thrown away.
    Discarded { bank: usize },
    /// Recording could not start.
    CaptureFailed { bank: usize, error: CaptureError },
    Calibrated { latency: f64 },
    CalibrationFailed(CalibrationError),
}

/// Mute and volume of one bank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankSnapshot {
    pub muted: bool,
    pub volume: f32,
}

impl Default for BankSnapshot {
    fn default() -> Self {
        Self {
            muted: false,
            volume: 1.0,
        }
    }
}

/// Looper settings stored in presets. Audio is not included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LooperSnapshot {
    pub latency_ms: f64,
    pub banks: Vec<BankSnapshot>,
}

impl Default for LooperSnapshot {
    fn default() -> Self {
        Self {
            latency_ms: 0.0,
            banks: vec![BankSnapshot::default(); BANK_COUNT],
        }
    }
}

pub struct LooperEngine {
    banks: Vec<LooperBank>,
    latency: f64,
    calibrator: Option<LatencyCalibrator>,
    events: Vec<LooperEvent>,
}

impl LooperEngine {
    /// `latency` is the input round trip, in seconds, skipped at the start
    /// of every take.
    pub fn new(latency: f64) -> Self {
        Self {
            banks: vec![LooperBank::default(); BANK_COUNT],
            latency: latency.max(0.0),
            calibrator: None,
            events: Vec::new(),
        }
    }

    pub fn bank(&self, index: usize) -> Option<&LooperBank> {
        self.banks.get(index)
    }

    pub fn banks(&self) -> &[LooperBank] {
        &self.banks
    }

    pub fn status(&self, index: usize) -> Option<BankStatus> {
        self.banks.get(index).map(LooperBank::status)
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn set_latency(&mut self, latency: f64) {
        self.latency = latency.max(0.0);
    }

    pub fn is_recording(&self) -> bool {
        self.banks
            .iter()
            .any(|b| matches!(b.state, BankState::Recording(_)))
    }

    /// Drain pending events.
    pub fn take_events(&mut self) -> Vec<LooperEvent> {
        std::mem::take(&mut self.events)
    }

    fn bank_mut(&mut self, index: usize) -> Result<&mut LooperBank, LooperError> {
        self.banks
            .get_mut(index)
            .ok_or(LooperError::InvalidBank(index))
    }

    /// Arm a bank to record from the next loop boundary. Any other armed
    /// bank is disarmed.
    pub fn arm(&mut self, index: usize) -> Result<(), LooperError> {
        let status = self.bank_mut(index)?.status();
        if self.is_recording() {
            return Err(LooperError::InvalidTransition {
                bank: index,
                from: status,
                action: "arm",
            });
        }
        for (i, bank) in self.banks.iter_mut().enumerate() {
            if i != index && bank.status() == BankStatus::Armed {
                bank.revert();
            }
        }
        self.banks[index].state = BankState::Armed;
        tracing::info!(bank = index, "looper bank armed");
        Ok(())
    }

    pub fn disarm(&mut self, index: usize) -> Result<(), LooperError> {
        let bank = self.bank_mut(index)?;
        match bank.status() {
            BankStatus::Armed => {
                bank.revert();
                Ok(())
            }
            from => Err(LooperError::InvalidTransition {
                bank: index,
                from,
                action: "disarm",
            }),
        }
    }

    /// Stop a recording by hand. Takes under [`MIN_RECORDING`] are thrown away.
    pub fn stop_recording(
        &mut self,
        index: usize,
        engine: &mut AudioEngine,
    ) -> Result<(), LooperError> {
        let now = engine.current_time();
        let latency = self.latency;
        let bank = self.bank_mut(index)?;
        let BankState::Recording(mut rec) = bank.state else {
            return Err(LooperError::InvalidTransition {
                bank: index,
                from: bank.status(),
                action: "stop recording",
            });
        };
        if rec.stopping {
            return Ok(());
        }
        if now - rec.boundary < MIN_RECORDING {
            engine.capture.cancel(rec.lease);
            bank.revert();
            self.events.push(LooperEvent::Discarded { bank: index });
            tracing::info!(bank = index, "short take discarded");
            return Ok(());
        }
        // Keep listening long enough to cover the input latency.
        let until = now - rec.capture_started + latency;
        engine.capture.stop_recording_after(rec.lease, until)?;
        rec.stopping = true;
        bank.state = BankState::Recording(rec);
        Ok(())
    }

    pub fn mute(&mut self, index: usize, engine: &mut AudioEngine) -> Result<(), LooperError> {
        self.set_muted(index, true, engine)
    }

    pub fn unmute(&mut self, index: usize, engine: &mut AudioEngine) -> Result<(), LooperError> {
        self.set_muted(index, false, engine)
    }

    fn set_muted(
        &mut self,
        index: usize,
        muted: bool,
        engine: &mut AudioEngine,
    ) -> Result<(), LooperError> {
        let bank = self.bank_mut(index)?;
        bank.muted = muted;
        if let Some(voice) = bank.live_voice {
            engine
                .voices
                .set_voice_gain(voice, bank.playback_gain(), engine.current_time());
        }
        Ok(())
    }

    pub fn set_volume(
        &mut self,
        index: usize,
        volume: f32,
        engine: &mut AudioEngine,
    ) -> Result<(), LooperError> {
        let bank = self.bank_mut(index)?;
        bank.volume = volume.clamp(0.0, 1.0);
        if let Some(voice) = bank.live_voice {
            engine
                .voices
                .set_voice_gain(voice, bank.playback_gain(), engine.current_time());
        }
        Ok(())
    }

    /// Forget a bank's loop, cancelling any recording.
    pub fn clear(&mut self, index: usize, engine: &mut AudioEngine) -> Result<(), LooperError> {
        let now = engine.current_time();
        let bank = self.bank_mut(index)?;
        if let BankState::Recording(rec) = bank.state {
            engine.capture.cancel(rec.lease);
        }
        if let Some(voice) = bank.live_voice.take() {
            engine.voices.stop_voice(voice, now);
        }
        bank.buffer = None;
        bank.state = BankState::Empty;
        tracing::info!(bank = index, "looper bank cleared");
        Ok(())
    }

    /// Install a loop restored from elsewhere. It starts at the next boundary.
    pub fn load_buffer(&mut self, index: usize, buffer: AudioBuffer) -> Result<(), LooperError> {
        let bank = self.bank_mut(index)?;
        if let BankState::Recording(_) = bank.state {
            return Err(LooperError::InvalidTransition {
                bank: index,
                from: BankStatus::Recording,
                action: "load",
            });
        }
        bank.buffer = Some(Arc::new(buffer));
        if bank.status() != BankStatus::Armed {
            bank.state = BankState::Playing;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> LooperSnapshot {
        LooperSnapshot {
            latency_ms: self.latency * 1000.0,
            banks: self
                .banks
                .iter()
                .map(|b| BankSnapshot {
                    muted: b.muted,
                    volume: b.volume,
                })
                .collect(),
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &LooperSnapshot, engine: &mut AudioEngine) {
        self.set_latency(snapshot.latency_ms / 1000.0);
        for (index, levels) in snapshot.banks.iter().enumerate().take(BANK_COUNT) {
            // Indices are in range, so neither call can fail.
            let _ = self.set_volume(index, levels.volume, engine);
            let _ = self.set_muted(index, levels.muted, engine);
        }
    }

    /// Play the reference tone and start measuring latency.
    pub fn start_calibration(&mut self, engine: &mut AudioEngine) -> Result<(), LooperError> {
        if let Some(previous) = self.calibrator.take() {
            previous.abort(engine);
        }
        self.calibrator = Some(LatencyCalibrator::start(engine)?);
        Ok(())
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrator.is_some()
    }

    /// Collect finished captures and calibration results. Call after
    /// [`crate::audio::CaptureHub::pump`].
    pub fn poll(&mut self, engine: &mut AudioEngine) {
        let now = engine.current_time();
        for index in 0..self.banks.len() {
            let BankState::Recording(rec) = self.banks[index].state else {
                continue;
            };
            if !rec.stopping {
                continue;
            }
            let Some(done) = engine.capture.take_completed(rec.lease) else {
                if !engine.capture.holds(rec.lease) {
                    tracing::warn!(bank = index, "recording lost");
                    self.banks[index].revert();
                } else if now > rec.take_end(self.latency) + CAPTURE_MARGIN {
                    // Input stalled: finish with what arrived.
                    let _ = engine.capture.stop_recording(rec.lease);
                }
                continue;
            };
            let buffer = Arc::new(self.finalize(&rec, done.started_at, &done.buffer));
            let bank = &mut self.banks[index];
            bank.buffer = Some(Arc::clone(&buffer));
            bank.state = BankState::Playing;
            tracing::info!(bank = index, frames = buffer.frames(), "loop recorded");
            self.events.push(LooperEvent::Recorded {
                bank: index,
                buffer,
            });
        }

        if let Some(calibrator) = &mut self.calibrator {
            match calibrator.poll(engine) {
                Some(Ok(latency)) => {
                    self.latency = latency;
                    self.calibrator = None;
                    self.events.push(LooperEvent::Calibrated { latency });
                }
                Some(Err(e)) => {
                    self.calibrator = None;
                    self.events.push(LooperEvent::CalibrationFailed(e));
                }
                None => {}
            }
        }
    }

    /// Cut a raw capture down to the loop: skip the mic latency plus however
    /// early the capture opened, then take exactly one loop with short fades.
    fn finalize(&self, rec: &Recording, started_at: f64, raw: &AudioBuffer) -> AudioBuffer {
        let sample_rate = raw.sample_rate() as f64;
        let skip = self.latency + (rec.boundary - started_at).max(0.0);
        let skip_frames = (skip * sample_rate).round() as usize;
        let loop_frames = (rec.loop_duration * sample_rate).round() as usize;
        let mut buffer = raw.slice(skip_frames, loop_frames);
        buffer.apply_fades((LOOP_FADE * sample_rate).round() as usize);
        buffer
    }

    fn on_boundary(&mut self, event: &StepEvent, engine: &mut AudioEngine) {
        let now = engine.current_time();
        let loop_duration = event.loop_duration();
        let latency = self.latency;
        for (index, bank) in self.banks.iter_mut().enumerate() {
            match bank.state {
                BankState::Armed if event.cycle_count > 0 => {
                    let max_seconds = loop_duration + latency + CAPTURE_MARGIN;
                    match engine.capture.start_recording(max_seconds, now) {
                        Ok(lease) => {
                            if let Some(voice) = bank.live_voice.take() {
                                engine.voices.stop_voice(voice, event.time);
                            }
                            bank.state = BankState::Recording(Recording {
                                lease,
                                capture_started: now,
                                boundary: event.time,
                                loop_duration,
                                stopping: false,
                            });
                            tracing::info!(bank = index, at = event.time, loop_duration, "recording");
                        }
                        Err(error) => {
                            tracing::warn!(bank = index, %error, "recording could not start");
                            bank.revert();
                            self.events.push(LooperEvent::CaptureFailed { bank: index, error });
                        }
                    }
                }
                // The boundary is dispatched ahead of time: capture runs on
                // until the whole loop, shifted by the latency, is in.
                BankState::Recording(mut rec) if !rec.stopping && event.time > rec.boundary => {
                    let until = rec.take_end(latency) - rec.capture_started;
                    match engine.capture.stop_recording_after(rec.lease, until) {
                        Ok(()) => {
                            rec.stopping = true;
                            bank.state = BankState::Recording(rec);
                        }
                        Err(error) => {
                            tracing::warn!(bank = index, %error, "recording lost");
                            bank.revert();
                        }
                    }
                }
                BankState::Playing => {
                    if let Some(voice) = bank.live_voice.take() {
                        engine.voices.stop_voice(voice, event.time);
                    }
                    if bank.muted {
                        continue;
                    }
                    if let Some(buffer) = &bank.buffer {
                        bank.live_voice = Some(engine.voices.play_buffer(
                            Arc::clone(buffer),
                            event.time,
                            bank.volume,
                            TrackId::Looper,
                        ));
                    }
                }
                _ => {}
            }
        }
    }
}

impl StepListener for LooperEngine {
    fn on_step(&mut self, event: &StepEvent, ctx: &mut StepContext<'_>) {
        if event.is_loop_boundary() {
            self.on_boundary(event, ctx.engine);
        }
    }

    fn on_stop(&mut self, engine: &mut AudioEngine) {
        for bank in self.banks.iter_mut() {
            match bank.state {
                BankState::Armed => bank.revert(),
                BankState::Recording(rec) => {
                    engine.capture.cancel(rec.lease);
                    bank.revert();
                }
                _ => {}
            }
            // The engine already cut every voice.
            bank.live_voice = None;
        }
        tracing::info!("looper stopped");
    }
}
