//! Pitch classes, note-name lookup, and frequency conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical sharp spelling for each pitch class.
pub const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Flat spelling for each pitch class.
pub const FLAT_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Enharmonic aliases that are not covered by either spelling table.
const EXTRA_ALIASES: [(&str, u8); 4] = [("Cb", 11), ("Fb", 4), ("E#", 5), ("B#", 0)];

/// Errors raised at the note-name boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum TheoryError {
    /// The name does not denote any pitch class.
    UnknownNote(String),
}

impl fmt::Display for TheoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TheoryError::UnknownNote(name) => write!(f, "unknown note name: {name:?}"),
        }
    }
}

impl std::error::Error for TheoryError {}

/// One of the 12 semitone classes, independent of octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PitchClass(u8);

impl PitchClass {
    pub const C: PitchClass = PitchClass(0);
    pub const D: PitchClass = PitchClass(2);
    pub const E: PitchClass = PitchClass(4);
    pub const F: PitchClass = PitchClass(5);
    pub const G: PitchClass = PitchClass(7);
    pub const A: PitchClass = PitchClass(9);
    pub const B: PitchClass = PitchClass(11);

    /// Build from any integer; wraps modulo 12.
    pub fn new(semitone: i32) -> Self {
        Self(semitone.rem_euclid(12) as u8)
    }

    /// Look up a note name in the sharp, flat and alias tables.
    pub fn parse(name: &str) -> Result<Self, TheoryError> {
        let name = name.trim();
        if let Some(i) = SHARP_NAMES.iter().position(|n| *n == name) {
            return Ok(Self(i as u8));
        }
        if let Some(i) = FLAT_NAMES.iter().position(|n| *n == name) {
            return Ok(Self(i as u8));
        }
        EXTRA_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|&(_, pc)| Self(pc))
            .ok_or_else(|| TheoryError::UnknownNote(name.to_string()))
    }

    /// Semitone index 0..=11.
    pub fn index(self) -> u8 {
        self.0
    }

    /// Canonical (sharp) name.
    pub fn name(self) -> &'static str {
        SHARP_NAMES[self.0 as usize]
    }

    /// Name using the requested spelling.
    pub fn spelled(self, flats: bool) -> &'static str {
        if flats {
            FLAT_NAMES[self.0 as usize]
        } else {
            SHARP_NAMES[self.0 as usize]
        }
    }

    /// Transpose by a number of semitones.
    pub fn transpose(self, semitones: i32) -> Self {
        Self::new(self.0 as i32 + semitones)
    }

    /// Upward distance in semitones from `self` to `other` (0..=11).
    pub fn interval_to(self, other: PitchClass) -> u8 {
        (other.0 + 12 - self.0) % 12
    }

    /// MIDI note number of this pitch class in the given octave (C4 = 60).
    pub fn midi(self, octave: i32) -> i32 {
        (octave + 1) * 12 + self.0 as i32
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PitchClass {
    type Error = TheoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PitchClass> for String {
    fn from(pc: PitchClass) -> Self {
        pc.name().to_string()
    }
}

/// Convert a MIDI note number to frequency in Hz (A4 = 69 = 440 Hz).
pub fn midi_to_frequency(note: i32) -> f64 {
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}

/// Frequency of a pitch class in a given octave.
pub fn note_to_frequency(pc: PitchClass, octave: i32) -> f64 {
    midi_to_frequency(pc.midi(octave))
}
