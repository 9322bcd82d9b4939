//! MIDI controller support: hardware keyboards play keyed voices.

pub mod config;
pub mod input;
pub mod mapping;

pub use config::MidiConfig;
pub use input::MidiInput;
pub use mapping::{apply_midi_message, MidiEvent, MidiMapping};
