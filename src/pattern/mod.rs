//! Pattern model: 16-step alphabets and the layered libraries holding them.
//!
//! Four categories: rhythm (strum on/off), degree (scale-degree tokens for
//! melodic tracks), drums (five independent lanes) and chord progressions.
//! Built-ins are static; custom entries arrive from outside as
//! [`CustomPatterns`] and shadow built-ins of the same name.

pub mod builtin;
pub mod library;
pub mod types;

pub use library::{CustomPatterns, Library, PatternBank};
pub use types::{
    degrees, grid, DegreePattern, DegreeToken, DrumPattern, DrumVoice, PatternError, Progression,
    RhythmPattern, STEPS_PER_BAR,
};
