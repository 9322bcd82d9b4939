//! Presets: a complete, serializable workstation setup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::looper::LooperSnapshot;
use crate::mixer::MixerSettings;
use crate::scheduler::SequencerConfig;

/// Preset load/save errors.
#[derive(Debug)]
pub enum PresetError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for PresetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresetError::Io(e) => write!(f, "preset I/O error: {e}"),
            PresetError::Json(e) => write!(f, "preset JSON error: {e}"),
        }
    }
}

impl std::error::Error for PresetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PresetError::Io(e) => Some(e),
            PresetError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PresetError {
    fn from(e: std::io::Error) -> Self {
        PresetError::Io(e)
    }
}

impl From<serde_json::Error> for PresetError {
    fn from(e: serde_json::Error) -> Self {
        PresetError::Json(e)
    }
}

/// Tempo, key, patterns and voicing, mixer levels and looper levels.
///
/// Sequencer fields sit at the top level of the JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub sequencer: SequencerConfig,
    #[serde(default)]
    pub mixer: MixerSettings,
    #[serde(default)]
    pub looper: LooperSnapshot,
}

impl Preset {
    pub fn named(name: impl Into<String>, sequencer: SequencerConfig) -> Self {
        Self {
            name: name.into(),
            sequencer,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        let mut preset: Preset = serde_json::from_str(json)?;
        preset.sequencer = preset.sequencer.normalized();
        Ok(preset)
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, PresetError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PresetError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
