//! Instruments: oscillator and sampler definitions, envelopes and the drum kit.
//!
//! An instrument is plain data: a sound source, an ADSR envelope, an optional
//! fixed lowpass and whether chords on it are strummed. The voice engine
//! turns a definition plus a frequency into a running voice.

pub mod drum_synth;
pub mod envelope;
pub mod oscillator;
pub mod sample;

use serde::{Deserialize, Serialize};

use crate::pattern::Library;

pub use envelope::AdsrEnvelope;
pub use oscillator::{oscillator, Oscillator, Waveform};
pub use sample::SampleBank;

/// Name of the instrument unknown names fall back to.
pub const DEFAULT_INSTRUMENT: &str = "piano";

fn default_peak() -> f32 {
    0.5
}

/// Where an instrument's sound comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstrumentSource {
    Oscillator { waveform: Waveform },
    /// Pitched playback of a bank sample recorded at `base_frequency`.
    Sampler { sample: String, base_frequency: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentDef {
    pub source: InstrumentSource,
    pub envelope: AdsrEnvelope,
    #[serde(default = "default_peak")]
    pub peak: f32,
    /// Fixed lowpass cutoff in Hz.
    #[serde(default)]
    pub cutoff: Option<f32>,
    #[serde(default)]
    pub strummed: bool,
}

impl InstrumentDef {
    fn synth(waveform: Waveform, envelope: AdsrEnvelope, peak: f32, cutoff: Option<f32>) -> Self {
        Self {
            source: InstrumentSource::Oscillator { waveform },
            envelope,
            peak,
            cutoff,
            strummed: false,
        }
    }

    fn strummed(mut self) -> Self {
        self.strummed = true;
        self
    }
}

/// Built-in instruments.
pub fn builtin_instruments() -> Vec<(&'static str, InstrumentDef)> {
    use Waveform::*;
    vec![
        (
            "piano",
            InstrumentDef::synth(Triangle, AdsrEnvelope::new(0.005, 0.6, 0.25, 0.4), 0.6, None),
        ),
        (
            "guitar",
            InstrumentDef::synth(Saw, AdsrEnvelope::new(0.003, 0.8, 0.0, 0.2), 0.45, Some(2400.0))
                .strummed(),
        ),
        (
            "pluck",
            InstrumentDef::synth(Triangle, AdsrEnvelope::new(0.002, 0.3, 0.0, 0.1), 0.6, None)
                .strummed(),
        ),
        (
            "organ",
            InstrumentDef::synth(Square, AdsrEnvelope::new(0.01, 0.1, 0.8, 0.1), 0.3, Some(3000.0)),
        ),
        (
            "pad",
            InstrumentDef::synth(Saw, AdsrEnvelope::new(0.4, 0.5, 0.7, 0.8), 0.35, Some(1200.0)),
        ),
        (
            "bass",
            InstrumentDef::synth(Saw, AdsrEnvelope::new(0.005, 0.3, 0.6, 0.1), 0.7, Some(800.0)),
        ),
        (
            "lead",
            InstrumentDef::synth(Square, AdsrEnvelope::new(0.01, 0.2, 0.6, 0.15), 0.4, Some(3500.0)),
        ),
        (
            "sine",
            InstrumentDef::synth(Sine, AdsrEnvelope::new(0.005, 0.1, 0.8, 0.1), 0.5, None),
        ),
        (
            "tom_pitched",
            InstrumentDef {
                source: InstrumentSource::Sampler {
                    sample: "tom".to_string(),
                    base_frequency: 130.0,
                },
                envelope: AdsrEnvelope::new(0.001, 0.3, 0.0, 0.05),
                peak: 0.8,
                cutoff: None,
                strummed: false,
            },
        ),
    ]
}

/// Layered instrument table: built-ins plus custom definitions, falling
/// back to [`DEFAULT_INSTRUMENT`].
pub type InstrumentTable = Library<InstrumentDef>;

pub fn instrument_table() -> InstrumentTable {
    let builtin = builtin_instruments();
    let fallback = builtin
        .iter()
        .find(|(name, _)| *name == DEFAULT_INSTRUMENT)
        .map(|(_, def)| def.clone())
        .unwrap_or_else(|| {
            InstrumentDef::synth(Waveform::Sine, AdsrEnvelope::default(), default_peak(), None)
        });
    Library::new(builtin, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_instrument_falls_back_to_default() {
        let table = instrument_table();
        assert_eq!(table.resolve("theremin"), table.resolve(DEFAULT_INSTRUMENT));
    }

    #[test]
    fn strum_flags() {
        let table = instrument_table();
        assert!(table.resolve("guitar").strummed);
        assert!(!table.resolve("organ").strummed);
    }

    #[test]
    fn custom_instrument_from_json() {
        let json = r#"{
            "source": {"type": "sampler", "sample": "vox", "base_frequency": 220.0},
            "envelope": {"attack": 0.01, "decay": 0.2, "sustain": 0.5, "release": 0.3}
        }"#;
        let def: InstrumentDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.peak, 0.5);
        assert!(matches!(def.source, InstrumentSource::Sampler { .. }));

        let mut table = instrument_table();
        table.insert_custom("vox", def.clone());
        assert_eq!(table.resolve("vox"), &def);
    }
}
