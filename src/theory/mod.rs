//! Theory engine: pitch classes, scales, and chord derivation.
//!
//! Everything here is a pure function over static tables. The scheduler
//! queries it every bar to resolve scale degrees into concrete pitches.

pub mod chord;
pub mod pitch;
pub mod scale;

pub use chord::{borrowed_chords, diatonic_chords, Chord, ChordQuality};
pub use pitch::{midi_to_frequency, note_to_frequency, PitchClass, TheoryError};
pub use scale::{generate_scale, ScaleInstance, ScaleKind, ALL_SCALES};
