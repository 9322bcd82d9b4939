//! Sequencer configuration: tempo, key, pattern selection and per-track voicing.

use serde::{Deserialize, Serialize};

use crate::pattern::STEPS_PER_BAR;
use crate::theory::PitchClass;

pub const MIN_BPM: f64 = 30.0;
pub const MAX_BPM: f64 = 300.0;
pub const MAX_SWING: f64 = 0.75;

/// Metronome clicks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metronome {
    pub enabled: bool,
    /// Steps between clicks; 4 clicks on every quarter note.
    pub subdivision: usize,
    pub volume: f32,
}

impl Default for Metronome {
    fn default() -> Self {
        Self {
            enabled: false,
            subdivision: 4,
            volume: 0.5,
        }
    }
}

/// Names of the patterns in play, resolved against the pattern bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSelection {
    pub progression: String,
    pub rhythm: String,
    pub drums: String,
    pub bass: String,
    pub lead: String,
    pub sample: String,
}

impl Default for PatternSelection {
    fn default() -> Self {
        Self {
            progression: "Pop Hit".to_string(),
            rhythm: "Quarter Notes".to_string(),
            drums: "Basic Rock".to_string(),
            bass: "Root Pulse".to_string(),
            lead: "Off".to_string(),
            sample: "Off".to_string(),
        }
    }
}

/// How one melodic track turns pattern steps into notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSettings {
    pub instrument: String,
    pub octave: i32,
    /// Lower notes that land above the key root by an octave.
    #[serde(default)]
    pub drop: bool,
    /// Note length in steps.
    #[serde(default = "default_gate")]
    pub gate: f64,
}

fn default_gate() -> f64 {
    1.0
}

impl TrackSettings {
    pub fn new(instrument: &str, octave: i32, gate: f64) -> Self {
        Self {
            instrument: instrument.to_string(),
            octave,
            drop: false,
            gate,
        }
    }
}

/// Voicing for the four pitched tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackVoicing {
    pub chords: TrackSettings,
    pub bass: TrackSettings,
    pub lead: TrackSettings,
    pub sample: TrackSettings,
}

impl Default for TrackVoicing {
    fn default() -> Self {
        Self {
            chords: TrackSettings::new("piano", 4, 2.0),
            bass: TrackSettings::new("bass", 2, 1.0),
            lead: TrackSettings::new("lead", 5, 1.0),
            sample: TrackSettings::new("tom_pitched", 3, 1.0),
        }
    }
}

/// Everything the scheduler reads while dispatching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub bpm: f64,
    pub key: PitchClass,
    pub scale: String,
    /// Shuffle amount, 0 (straight) to 0.75.
    pub swing: f64,
    pub metronome: Metronome,
    pub patterns: PatternSelection,
    pub tracks: TrackVoicing,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            bpm: 100.0,
            key: PitchClass::C,
            scale: "major".to_string(),
            swing: 0.0,
            metronome: Metronome::default(),
            patterns: PatternSelection::default(),
            tracks: TrackVoicing::default(),
        }
    }
}

impl SequencerConfig {
    /// Clamp tempo and swing into their supported ranges.
    pub fn normalized(mut self) -> Self {
        if !self.bpm.is_finite() {
            self.bpm = Self::default().bpm;
        }
        self.bpm = self.bpm.clamp(MIN_BPM, MAX_BPM);
        self.swing = if self.swing.is_finite() {
            self.swing.clamp(0.0, MAX_SWING)
        } else {
            0.0
        };
        self
    }

    /// Length of a straight sixteenth at the current tempo.
    pub fn base_step_duration(&self) -> f64 {
        0.25 * 60.0 / self.bpm
    }

    /// Length of `step`: swing stretches even steps and shortens odd ones
    /// by the same amount, so a bar always lasts 16 straight steps.
    pub fn step_duration(&self, step: usize) -> f64 {
        let base = self.base_step_duration();
        let swing = self.swing.clamp(0.0, MAX_SWING);
        if swing == 0.0 {
            base
        } else if step % 2 == 0 {
            base * (1.0 + swing)
        } else {
            base * (1.0 - swing)
        }
    }

    pub fn bar_duration(&self) -> f64 {
        self.base_step_duration() * STEPS_PER_BAR as f64
    }
}
