//! chordstep: a step-sequencing music workstation core.
//!
//! Theory engine, lookahead scheduler, synth/sampler voices, a mixer graph
//! with a shared master bus, and a bar-locked looper.

pub mod audio;
pub mod config;
pub mod instrument;
pub mod looper;
pub mod midi;
pub mod mixer;
pub mod pattern;
pub mod preset;
pub mod scheduler;
pub mod song;
pub mod theory;
pub mod voice;
pub mod workstation;

pub use workstation::Workstation;
