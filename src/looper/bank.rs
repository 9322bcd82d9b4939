//! One looper bank: its state machine, its loop and its playback voice.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioBuffer, RecordingLease};
use crate::voice::VoiceHandle;

/// An in-progress recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recording {
    pub lease: RecordingLease,
    /// Audio-clock time the capture was opened (at dispatch, ahead of the boundary).
    pub capture_started: f64,
    /// Loop start on the audio clock.
    pub boundary: f64,
    pub loop_duration: f64,
    /// Stop requested; waiting for the capture to complete.
    pub stopping: bool,
}

impl Recording {
    /// Audio-clock time by which the input holds the whole loop.
    pub fn take_end(&self, latency: f64) -> f64 {
        self.boundary + self.loop_duration + latency
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BankState {
    Empty,
    Armed,
    Recording(Recording),
    Playing,
}

/// [`BankState`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankStatus {
    Empty,
    Armed,
    Recording,
    Playing,
}

impl fmt::Display for BankStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BankStatus::Empty => "empty",
            BankStatus::Armed => "armed",
            BankStatus::Recording => "recording",
            BankStatus::Playing => "playing",
        })
    }
}

#[derive(Debug, Clone)]
pub struct LooperBank {
    pub(crate) state: BankState,
    pub(crate) buffer: Option<Arc<AudioBuffer>>,
    pub(crate) muted: bool,
    pub(crate) volume: f32,
    pub(crate) live_voice: Option<VoiceHandle>,
}

impl Default for LooperBank {
    fn default() -> Self {
        Self {
            state: BankState::Empty,
            buffer: None,
            muted: false,
            volume: 1.0,
            live_voice: None,
        }
    }
}

impl LooperBank {
    pub fn state(&self) -> &BankState {
        &self.state
    }

    pub fn status(&self) -> BankStatus {
        match self.state {
            BankState::Empty => BankStatus::Empty,
            BankState::Armed => BankStatus::Armed,
            BankState::Recording(_) => BankStatus::Recording,
            BankState::Playing => BankStatus::Playing,
        }
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn live_voice(&self) -> Option<VoiceHandle> {
        self.live_voice
    }

    /// The state to fall back to when arming or recording is abandoned.
    pub(crate) fn revert(&mut self) {
        self.state = if self.buffer.is_some() {
            BankState::Playing
        } else {
            BankState::Empty
        };
    }

    /// Gain the playback voice should have.
    pub(crate) fn playback_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_depends_on_buffer() {
        let mut bank = LooperBank::default();
        bank.state = BankState::Armed;
        bank.revert();
        assert_eq!(bank.status(), BankStatus::Empty);

        bank.buffer = Some(Arc::new(AudioBuffer::from_mono(vec![0.0; 4], 8000)));
        bank.state = BankState::Armed;
        bank.revert();
        assert_eq!(bank.status(), BankStatus::Playing);
    }

    #[test]
    fn muted_gain_is_zero() {
        let mut bank = LooperBank::default();
        bank.volume = 0.6;
        assert_eq!(bank.playback_gain(), 0.6);
        bank.muted = true;
        assert_eq!(bank.playback_gain(), 0.0);
    }
}
