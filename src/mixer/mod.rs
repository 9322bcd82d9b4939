//! Mixer graph: fixed tracks into a compressed master bus with a convolution reverb.
//!
//! Signal flow per track: input gain → lowpass → volume → (dry, reverb send).
//! Master: Σ dry → compressor → + reverb return → master gain → limiter.
//! All user controls glide through one-pole smoothing; the master gain is a
//! scheduled [`AudioParam`] so a flash mute lands on an exact timestamp.

pub mod dynamics;
pub mod reverb;
pub mod track;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audio::param::{AudioParam, SmoothedParam};

pub use dynamics::{Compressor, CompressorSettings, Limiter};
pub use reverb::ConvolutionReverb;
pub use track::{brightness_to_cutoff, MixerTrack, TrackId, TrackLevels};

/// Length of the synthetic reverb impulse response.
pub const REVERB_SECONDS: f32 = 1.5;
/// Flash mute: time to reach silence.
pub const MUTE_FALL: f64 = 0.010;
/// Flash mute: time to come back to the master level.
pub const MUTE_RISE: f64 = 0.100;

/// Snapshot of every user-facing mixer control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    pub tracks: BTreeMap<TrackId, TrackLevels>,
    pub master: f32,
    pub reverb_return: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            tracks: TrackId::ALL
                .iter()
                .map(|&id| (id, TrackLevels::default()))
                .collect(),
            master: 0.8,
            reverb_return: 0.5,
        }
    }
}

/// Per-track mono input buses, filled by the voice engine each block.
pub struct TrackBuses {
    buses: Vec<Vec<f32>>,
}

impl Default for TrackBuses {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackBuses {
    pub fn new() -> Self {
        Self {
            buses: vec![Vec::new(); TrackId::COUNT],
        }
    }

    /// Zero every bus and size it to `frames`.
    pub fn clear(&mut self, frames: usize) {
        for bus in self.buses.iter_mut() {
            bus.clear();
            bus.resize(frames, 0.0);
        }
    }

    pub fn frames(&self) -> usize {
        self.buses[0].len()
    }

    pub fn bus(&self, track: TrackId) -> &[f32] {
        &self.buses[track.index()]
    }

    pub fn bus_mut(&mut self, track: TrackId) -> &mut [f32] {
        &mut self.buses[track.index()]
    }
}

pub struct MixerGraph {
    sample_rate: u32,
    tracks: Vec<MixerTrack>,
    buses: TrackBuses,
    compressor: Compressor,
    reverb: ConvolutionReverb,
    reverb_return: SmoothedParam,
    master_level: f32,
    master_gain: AudioParam,
    limiter: Limiter,
    dry: Vec<f32>,
    send: Vec<f32>,
    wet: Vec<f32>,
}

impl MixerGraph {
    pub fn new(sample_rate: u32, seed: u64) -> Self {
        Self::with_settings(sample_rate, seed, &MixerSettings::default())
    }

    pub fn with_settings(sample_rate: u32, seed: u64, settings: &MixerSettings) -> Self {
        let tracks = TrackId::ALL
            .iter()
            .map(|&id| {
                let levels = settings.tracks.get(&id).copied().unwrap_or_default();
                MixerTrack::new(id, levels, sample_rate)
            })
            .collect();
        let ir = reverb::synthetic_impulse_response(sample_rate, REVERB_SECONDS, seed);
        let master_level = settings.master.clamp(0.0, 1.0);
        Self {
            sample_rate,
            tracks,
            buses: TrackBuses::new(),
            compressor: Compressor::new(CompressorSettings::default(), sample_rate),
            reverb: ConvolutionReverb::new(&ir),
            reverb_return: SmoothedParam::new(
                settings.reverb_return.clamp(0.0, 1.0),
                SmoothedParam::DEFAULT_TIME_CONSTANT,
                sample_rate,
            ),
            master_level,
            master_gain: AudioParam::new(master_level),
            limiter: Limiter::default(),
            dry: Vec::new(),
            send: Vec::new(),
            wet: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn track(&self, id: TrackId) -> &MixerTrack {
        &self.tracks[id.index()]
    }

    pub fn set_track_volume(&mut self, id: TrackId, volume: f32) {
        self.tracks[id.index()].set_volume(volume);
    }

    pub fn set_track_filter_brightness(&mut self, id: TrackId, brightness: f32) {
        self.tracks[id.index()].set_brightness(brightness);
    }

    pub fn set_track_reverb_send(&mut self, id: TrackId, send: f32) {
        self.tracks[id.index()].set_reverb_send(send);
    }

    pub fn set_reverb_return(&mut self, level: f32) {
        self.reverb_return.set_target(level.clamp(0.0, 1.0));
    }

    /// Set the master level, gliding from the current value starting at `now`.
    pub fn set_master_level(&mut self, level: f32, now: f64) {
        self.master_level = level.clamp(0.0, 1.0);
        self.master_gain.cancel_and_hold(now);
        self.master_gain.set_target_at(
            self.master_level,
            now,
            SmoothedParam::DEFAULT_TIME_CONSTANT,
        );
    }

    pub fn master_level(&self) -> f32 {
        self.master_level
    }

    /// Master gain as scheduled at `t`.
    pub fn master_gain_at(&self, t: f64) -> f32 {
        self.master_gain.value_at(t)
    }

    pub fn settings(&self) -> MixerSettings {
        MixerSettings {
            tracks: self.tracks.iter().map(|t| (t.id(), t.levels())).collect(),
            master: self.master_level,
            reverb_return: self.reverb_return.target(),
        }
    }

    /// Apply a snapshot through the smoothed setters.
    pub fn apply_settings(&mut self, settings: &MixerSettings, now: f64) {
        for (&id, levels) in &settings.tracks {
            self.set_track_volume(id, levels.volume);
            self.set_track_filter_brightness(id, levels.brightness);
            self.set_track_reverb_send(id, levels.reverb_send);
        }
        self.set_reverb_return(settings.reverb_return);
        self.set_master_level(settings.master, now);
    }

    /// Dip the master to silence within 10 ms, then bring it back over
    /// 100 ms. The graph itself is untouched.
    pub fn flash_mute(&mut self, now: f64) {
        self.master_gain.cancel_and_hold(now);
        self.master_gain.linear_ramp_to(0.0, now + MUTE_FALL);
        self.master_gain
            .linear_ramp_to(self.master_level, now + MUTE_FALL + MUTE_RISE);
        tracing::debug!(now, "master flash mute");
    }

    /// Buses for the voice engine to render into.
    pub fn buses_mut(&mut self) -> &mut TrackBuses {
        &mut self.buses
    }

    pub fn prepare(&mut self, frames: usize) {
        self.buses.clear(frames);
    }

    /// Mix the current bus contents into `out` (mono). `start_time` is the
    /// audio-clock time of the first frame.
    pub fn process(&mut self, start_time: f64, out: &mut [f32]) {
        let frames = out.len().min(self.buses.frames());
        self.dry.clear();
        self.dry.resize(frames, 0.0);
        self.send.clear();
        self.send.resize(frames, 0.0);
        self.wet.clear();
        self.wet.resize(frames, 0.0);

        for track in self.tracks.iter_mut() {
            let input = &self.buses.buses[track.id().index()][..frames];
            track.process(input, &mut self.dry, &mut self.send);
        }

        self.compressor.process_block(&mut self.dry);
        self.reverb.process(&self.send, &mut self.wet);

        let dt = 1.0 / self.sample_rate as f64;
        for (i, (o, (&d, &w))) in out
            .iter_mut()
            .zip(self.dry.iter().zip(&self.wet))
            .enumerate()
        {
            let gain = self.master_gain.value_at(start_time + i as f64 * dt);
            *o = self.limiter.process((d + w * self.reverb_return.next_value()) * gain);
        }
        for o in out[frames..].iter_mut() {
            *o = 0.0;
        }
        self.master_gain.prune(start_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const SR: u32 = 8000;

    fn dry_only() -> MixerSettings {
        let mut s = MixerSettings::default();
        for levels in s.tracks.values_mut() {
            levels.reverb_send = 0.0;
            levels.volume = 1.0;
        }
        s.master = 1.0;
        s
    }

    #[test]
    fn settings_round_trip() {
        let mut mixer = MixerGraph::new(SR, 1);
        mixer.set_track_volume(TrackId::Bass, 0.3);
        mixer.set_track_filter_brightness(TrackId::Lead, 0.2);
        mixer.set_track_reverb_send(TrackId::Vocal, 1.5);
        let s = mixer.settings();
        assert_eq!(s.tracks[&TrackId::Bass].volume, 0.3);
        assert_eq!(s.tracks[&TrackId::Lead].brightness, 0.2);
        assert_eq!(s.tracks[&TrackId::Vocal].reverb_send, 1.0);

        let mut other = MixerGraph::new(SR, 1);
        other.apply_settings(&s, 0.0);
        assert_eq!(other.settings(), s);
    }

    #[test]
    fn silence_without_input() {
        let mut mixer = MixerGraph::new(SR, 1);
        mixer.prepare(256);
        let mut out = vec![1.0; 256];
        mixer.process(0.0, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn track_signal_reaches_output() {
        let mut mixer = MixerGraph::with_settings(SR, 1, &dry_only());
        mixer.prepare(64);
        mixer.buses_mut().bus_mut(TrackId::Looper).fill(0.1);
        let mut out = vec![0.0; 64];
        mixer.process(0.0, &mut out);
        // Past the filter's settling time a quiet DC level passes unchanged.
        assert_approx_eq!(out[63], 0.1, 0.01);
    }

    #[test]
    fn output_never_exceeds_ceiling() {
        let mut mixer = MixerGraph::with_settings(SR, 1, &dry_only());
        mixer.prepare(512);
        for id in TrackId::ALL {
            mixer.buses_mut().bus_mut(id).fill(5.0);
        }
        let mut out = vec![0.0; 512];
        mixer.process(0.0, &mut out);
        assert!(out.iter().all(|s| s.abs() <= 0.95));
    }

    #[test]
    fn flash_mute_dips_and_recovers() {
        let mut mixer = MixerGraph::new(SR, 1);
        let level = mixer.master_level();
        mixer.flash_mute(1.0);
        assert_approx_eq!(mixer.master_gain_at(1.0), level);
        assert_approx_eq!(mixer.master_gain_at(1.010), 0.0);
        assert_approx_eq!(mixer.master_gain_at(1.060), level / 2.0, 1e-3);
        assert_approx_eq!(mixer.master_gain_at(1.2), level);
    }

    #[test]
    fn master_level_glides() {
        let mut mixer = MixerGraph::new(SR, 1);
        mixer.set_master_level(0.0, 0.0);
        assert!(mixer.master_gain_at(0.01) > 0.3);
        assert!(mixer.master_gain_at(0.5) < 0.01);
    }

    #[test]
    fn mixer_settings_json_defaults() {
        let s: MixerSettings = serde_json::from_str(r#"{"master": 0.5}"#).unwrap();
        assert_eq!(s.master, 0.5);
        assert_eq!(s.tracks.len(), TrackId::COUNT);
        let json = serde_json::to_string(&MixerSettings::default()).unwrap();
        assert!(json.contains("\"chords\""));
    }
}
