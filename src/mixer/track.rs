//! Mixer tracks: the fixed per-source chain: gain, lowpass, volume, reverb send.

use std::fmt;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};
use serde::{Deserialize, Serialize};

use crate::audio::param::SmoothedParam;

/// Lowest cutoff of the brightness control, in Hz.
pub const MIN_CUTOFF_HZ: f32 = 100.0;
/// Highest cutoff of the brightness control, in Hz.
pub const MAX_CUTOFF_HZ: f32 = 20_000.0;

/// Filter coefficients are refreshed this often while brightness glides.
const FILTER_UPDATE_INTERVAL: usize = 32;

/// The named tracks of the mixer. The set is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackId {
    Chords,
    Bass,
    Lead,
    Drums,
    Samples,
    Looper,
    Vocal,
}

impl TrackId {
    pub const ALL: [TrackId; 7] = [
        TrackId::Chords,
        TrackId::Bass,
        TrackId::Lead,
        TrackId::Drums,
        TrackId::Samples,
        TrackId::Looper,
        TrackId::Vocal,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            TrackId::Chords => "chords",
            TrackId::Bass => "bass",
            TrackId::Lead => "lead",
            TrackId::Drums => "drums",
            TrackId::Samples => "samples",
            TrackId::Looper => "looper",
            TrackId::Vocal => "vocal",
        }
    }

    /// Fixed trim at the head of the chain. Tracks that stack many voices
    /// start lower.
    pub fn input_gain(self) -> f32 {
        match self {
            TrackId::Chords => 0.5,
            TrackId::Bass | TrackId::Drums => 0.9,
            TrackId::Lead => 0.7,
            TrackId::Samples => 0.8,
            TrackId::Looper | TrackId::Vocal => 1.0,
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a 0..1 brightness onto a logarithmic 100 Hz – 20 kHz cutoff.
pub fn brightness_to_cutoff(brightness: f32) -> f32 {
    let v = brightness.clamp(0.0, 1.0);
    (MIN_CUTOFF_HZ.ln() + v * (MAX_CUTOFF_HZ.ln() - MIN_CUTOFF_HZ.ln())).exp()
}

/// User-facing levels of one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackLevels {
    pub volume: f32,
    pub brightness: f32,
    pub reverb_send: f32,
}

impl Default for TrackLevels {
    fn default() -> Self {
        Self {
            volume: 0.8,
            brightness: 1.0,
            reverb_send: 0.15,
        }
    }
}

/// One track of the mixer graph.
pub struct MixerTrack {
    id: TrackId,
    sample_rate: u32,
    input_gain: f32,
    volume: SmoothedParam,
    brightness: SmoothedParam,
    reverb_send: SmoothedParam,
    filter: DirectForm2Transposed<f32>,
    applied_brightness: f32,
}

impl MixerTrack {
    pub fn new(id: TrackId, levels: TrackLevels, sample_rate: u32) -> Self {
        let tc = SmoothedParam::DEFAULT_TIME_CONSTANT;
        let brightness = levels.brightness.clamp(0.0, 1.0);
        let coeffs = lowpass(sample_rate, brightness_to_cutoff(brightness))
            .unwrap_or(Coefficients {
                a1: 0.0,
                a2: 0.0,
                b0: 1.0,
                b1: 0.0,
                b2: 0.0,
            });
        Self {
            id,
            sample_rate,
            input_gain: id.input_gain(),
            volume: SmoothedParam::new(levels.volume.clamp(0.0, 1.0), tc, sample_rate),
            brightness: SmoothedParam::new(brightness, tc, sample_rate),
            reverb_send: SmoothedParam::new(levels.reverb_send.clamp(0.0, 1.0), tc, sample_rate),
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            applied_brightness: brightness,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn set_volume(&mut self, v: f32) {
        self.volume.set_target(v.clamp(0.0, 1.0));
    }

    pub fn set_brightness(&mut self, v: f32) {
        self.brightness.set_target(v.clamp(0.0, 1.0));
    }

    pub fn set_reverb_send(&mut self, v: f32) {
        self.reverb_send.set_target(v.clamp(0.0, 1.0));
    }

    /// Target levels (what the controls are set to, not the glide position).
    pub fn levels(&self) -> TrackLevels {
        TrackLevels {
            volume: self.volume.target(),
            brightness: self.brightness.target(),
            reverb_send: self.reverb_send.target(),
        }
    }

    /// Current (smoothed) levels.
    pub fn current_levels(&self) -> TrackLevels {
        TrackLevels {
            volume: self.volume.value(),
            brightness: self.brightness.value(),
            reverb_send: self.reverb_send.value(),
        }
    }

    /// Cutoff the filter is currently tuned to.
    pub fn cutoff_hz(&self) -> f32 {
        brightness_to_cutoff(self.applied_brightness)
    }

    /// Run `input` through the chain, adding the post-volume signal to `dry`
    /// and the send signal to `send`.
    pub fn process(&mut self, input: &[f32], dry: &mut [f32], send: &mut [f32]) {
        for (i, (&x, (d, s))) in input.iter().zip(dry.iter_mut().zip(send.iter_mut())).enumerate() {
            let brightness = self.brightness.next_value();
            if i % FILTER_UPDATE_INTERVAL == 0 && (brightness - self.applied_brightness).abs() > 1e-4 {
                self.retune(brightness);
            }
            let filtered = self.filter.run(x * self.input_gain);
            let out = filtered * self.volume.next_value();
            *d += out;
            *s += out * self.reverb_send.next_value();
        }
    }

    fn retune(&mut self, brightness: f32) {
        match lowpass(self.sample_rate, brightness_to_cutoff(brightness)) {
            Ok(coeffs) => {
                self.filter.update_coefficients(coeffs);
                self.applied_brightness = brightness;
            }
            Err(e) => tracing::debug!(track = %self.id, ?e, "filter retune rejected"),
        }
    }
}

/// Butterworth lowpass, with the cutoff kept below Nyquist.
pub(crate) fn lowpass(sample_rate: u32, cutoff: f32) -> Result<Coefficients<f32>, biquad::Errors> {
    let fs = sample_rate as f32;
    let f0 = cutoff.min(fs * 0.45);
    Coefficients::<f32>::from_params(Type::LowPass, fs.hz(), f0.hz(), Q_BUTTERWORTH_F32)
}
