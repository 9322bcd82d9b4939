//! Oscillator primitives: waveform shapes and a phase-accumulating oscillator.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Available waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Saw,
    Square,
    Triangle,
}

/// Generate a single sample for the given waveform at the specified phase.
///
/// `phase` is in the range [0.0, 1.0), representing one full cycle.
/// Returns a value in [-1.0, 1.0].
pub fn oscillator(waveform: Waveform, phase: f64) -> f64 {
    match waveform {
        Waveform::Sine => (phase * 2.0 * PI).sin(),
        Waveform::Saw => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => {
            if phase < 0.25 {
                4.0 * phase
            } else if phase < 0.75 {
                2.0 - 4.0 * phase
            } else {
                4.0 * phase - 4.0
            }
        }
    }
}

/// Running oscillator at a fixed frequency.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    phase: f64,
    increment: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: u32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            increment: frequency / sample_rate as f64,
        }
    }

    pub fn frequency(&self, sample_rate: u32) -> f64 {
        self.increment * sample_rate as f64
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let out = oscillator(self.waveform, self.phase) as f32;
        self.phase = (self.phase + self.increment).fract();
        out
    }
}
