//! MIDI configuration: device selection and mapping rules loaded from ~/.chordstep/midi.yaml.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::mapping::MidiMapping;
use crate::instrument::DEFAULT_INSTRUMENT;
use crate::mixer::TrackId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiConfig {
    /// Preferred MIDI device name (substring match). None = first available.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Only accept messages on this MIDI channel (0-15). None = all channels.
    #[serde(default)]
    pub channel_filter: Option<u8>,
    /// Instrument for notes no `NoteRange` claims.
    #[serde(default = "MidiConfig::default_instrument")]
    pub instrument: String,
    #[serde(default = "MidiConfig::default_mappings")]
    pub mappings: Vec<MidiMapping>,
}

impl MidiConfig {
    /// Load from ~/.chordstep/midi.yaml. Returns None if there is no usable file.
    pub fn load() -> Option<Self> {
        let home = dirs::home_dir()?;
        Self::load_from(&home.join(".chordstep").join("midi.yaml"))
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_yaml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid MIDI config");
                None
            }
        }
    }

    fn default_instrument() -> String {
        DEFAULT_INSTRUMENT.to_string()
    }

    /// CC7 → lead volume, CC74 → lead brightness, CC91 → lead reverb.
    fn default_mappings() -> Vec<MidiMapping> {
        vec![
            MidiMapping::CcToVolume {
                cc: 7,
                track: TrackId::Lead,
            },
            MidiMapping::CcToBrightness {
                cc: 74,
                track: TrackId::Lead,
            },
            MidiMapping::CcToReverb {
                cc: 91,
                track: TrackId::Lead,
            },
        ]
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            channel_filter: None,
            instrument: Self::default_instrument(),
            mappings: Self::default_mappings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = MidiConfig::default();
        assert!(config.device_name.is_none());
        assert_eq!(config.instrument, "piano");
        assert_eq!(config.mappings.len(), 3);
    }

    #[test]
    fn custom_config_deserialize() {
        let yaml = r#"
device_name: "Arturia"
channel_filter: 0
mappings:
  - !CcToVolume
    cc: 1
    track: bass
  - !NoteRange
    note_range: [36, 47]
    instrument: bass
"#;
        let config: MidiConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device_name.as_deref(), Some("Arturia"));
        assert_eq!(config.channel_filter, Some(0));
        assert_eq!(config.instrument, "piano");
        assert_eq!(
            config.mappings[0],
            MidiMapping::CcToVolume {
                cc: 1,
                track: TrackId::Bass
            }
        );
    }

    #[test]
    fn invalid_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midi.yaml");
        std::fs::write(&path, "mappings: 12").unwrap();
        assert!(MidiConfig::load_from(&path).is_none());
        assert!(MidiConfig::load_from(&dir.path().join("missing.yaml")).is_none());
    }
}
