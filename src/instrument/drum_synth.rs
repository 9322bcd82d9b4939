//! Synthetic drum kit and metronome clicks.
//!
//! Each generator produces a mono f32 buffer at the given sample rate.
//! Noise-based generators use a seeded `ChaCha8Rng` for determinism.

use std::f64::consts::PI;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::sample::SampleBank;
use crate::audio::buffer::AudioBuffer;

/// Bank names of the metronome clicks.
pub const CLICK: &str = "click";
pub const CLICK_ACCENT: &str = "click_accent";

fn frames(sample_rate: u32, seconds: f64) -> usize {
    (sample_rate as f64 * seconds) as usize
}

/// Sine with an exponential pitch sweep and amplitude decay.
fn swept_sine(sample_rate: u32, seconds: f64, from_hz: f64, to_hz: f64, decay: f64) -> Vec<f32> {
    let n = frames(sample_rate, seconds);
    let mut phase = 0.0_f64;
    (0..n)
        .map(|i| {
            let norm = i as f64 / n as f64;
            let freq = to_hz + (from_hz - to_hz) * (-norm * 8.0).exp();
            phase += freq / sample_rate as f64;
            ((phase * 2.0 * PI).sin() * (-norm * decay).exp()) as f32
        })
        .collect()
}

/// Kick (~250ms): 150 Hz → 50 Hz sweep with a fast decay.
pub fn generate_kick(sample_rate: u32) -> Vec<f32> {
    swept_sine(sample_rate, 0.25, 150.0, 50.0, 10.0)
}

/// Tom (~300ms): 180 Hz → 90 Hz sweep, rounder than the kick.
pub fn generate_tom(sample_rate: u32) -> Vec<f32> {
    swept_sine(sample_rate, 0.3, 180.0, 90.0, 7.0)
        .into_iter()
        .map(|s| s * 0.8)
        .collect()
}

/// Snare (~200ms): 180 Hz body plus a faster-decaying noise burst.
pub fn generate_snare(sample_rate: u32, seed: u64) -> Vec<f32> {
    let n = frames(sample_rate, 0.2);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut phase = 0.0_f64;
    (0..n)
        .map(|i| {
            let norm = i as f64 / n as f64;
            phase += 180.0 / sample_rate as f64;
            let body = (phase * 2.0 * PI).sin() * (-norm * 15.0).exp();
            let noise: f64 = rng.gen_range(-1.0..1.0) * (-norm * 12.0).exp();
            (body * 0.5 + noise * 0.5) as f32
        })
        .collect()
}

/// High-passed noise with an exponential decay.
fn metallic_noise(sample_rate: u32, seconds: f64, decay: f64, seed: u64) -> Vec<f32> {
    let n = frames(sample_rate, seconds);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut prev_input = 0.0_f64;
    let mut prev_output = 0.0_f64;
    let alpha = 0.85;
    (0..n)
        .map(|i| {
            let norm = i as f64 / n as f64;
            let noise: f64 = rng.gen_range(-1.0..1.0);
            // One-pole high-pass: y[n] = a * (y[n-1] + x[n] - x[n-1])
            let filtered = alpha * (prev_output + noise - prev_input);
            prev_input = noise;
            prev_output = filtered;
            (filtered * (-norm * decay).exp()).clamp(-1.0, 1.0) as f32
        })
        .collect()
}

/// Closed hi-hat (~80ms).
pub fn generate_hihat(sample_rate: u32, seed: u64) -> Vec<f32> {
    metallic_noise(sample_rate, 0.08, 20.0, seed)
}

/// Crash cymbal (~1.2s).
pub fn generate_crash(sample_rate: u32, seed: u64) -> Vec<f32> {
    metallic_noise(sample_rate, 1.2, 5.0, seed)
        .into_iter()
        .map(|s| s * 0.6)
        .collect()
}

/// Short sine blip for the metronome.
pub fn generate_click(sample_rate: u32, freq: f64) -> Vec<f32> {
    let n = frames(sample_rate, 0.03);
    (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let norm = i as f64 / n as f64;
            ((2.0 * PI * freq * t).sin() * (-norm * 6.0).exp() * 0.6) as f32
        })
        .collect()
}

/// Sine burst used as the latency-calibration reference.
pub fn generate_tone(sample_rate: u32, freq: f64, seconds: f64, amplitude: f32) -> Vec<f32> {
    (0..frames(sample_rate, seconds))
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (2.0 * PI * freq * t).sin() as f32 * amplitude
        })
        .collect()
}

/// The synthetic kit: `kick`, `snare`, `hihat`, `tom`, `crash`, plus the
/// two metronome clicks. `seed` fixes the noise of every generator.
pub fn build_kit(sample_rate: u32, seed: u64) -> SampleBank {
    let mono = |samples: Vec<f32>| AudioBuffer::from_mono(samples, sample_rate);
    let mut bank = SampleBank::new();
    bank.insert("kick", mono(generate_kick(sample_rate)));
    bank.insert("snare", mono(generate_snare(sample_rate, seed)));
    bank.insert(
        "hihat",
        mono(generate_hihat(sample_rate, seed.wrapping_add(1))),
    );
    bank.insert("tom", mono(generate_tom(sample_rate)));
    bank.insert(
        "crash",
        mono(generate_crash(sample_rate, seed.wrapping_add(2))),
    );
    bank.insert(CLICK, mono(generate_click(sample_rate, 1000.0)));
    bank.insert(CLICK_ACCENT, mono(generate_click(sample_rate, 1500.0)));
    bank
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::DrumVoice;

    const SR: u32 = 44100;
    const SEED: u64 = 42;

    fn rms(s: &[f32]) -> f32 {
        (s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32).sqrt()
    }

    #[test]
    fn kick_length_and_decay() {
        let kick = generate_kick(SR);
        assert_eq!(kick.len(), (SR as f64 * 0.25) as usize);
        let q = kick.len() / 4;
        assert!(rms(&kick[..q]) > rms(&kick[3 * q..]) * 2.0);
    }

    #[test]
    fn snare_is_deterministic_per_seed() {
        assert_eq!(generate_snare(SR, SEED), generate_snare(SR, SEED));
        assert_ne!(generate_snare(SR, 1), generate_snare(SR, 2));
    }

    #[test]
    fn crash_rings_longer_than_hihat() {
        let hat = generate_hihat(SR, SEED);
        let crash = generate_crash(SR, SEED);
        assert!(crash.len() > hat.len() * 10);
        assert!(crash.iter().any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn all_generators_bounded() {
        let sounds = [
            generate_kick(SR),
            generate_snare(SR, SEED),
            generate_hihat(SR, SEED),
            generate_tom(SR),
            generate_crash(SR, SEED),
            generate_click(SR, 1000.0),
        ];
        for sound in &sounds {
            assert!(!sound.is_empty());
            assert!(sound.iter().all(|s| (-1.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn tone_has_expected_level() {
        let tone = generate_tone(8000, 1000.0, 0.05, 0.5);
        assert_eq!(tone.len(), 400);
        // RMS of a sine is amplitude / sqrt(2).
        assert!((rms(&tone) - 0.5 / 2f32.sqrt()).abs() < 0.01);
    }

    #[test]
    fn kit_covers_every_drum_voice() {
        let bank = build_kit(SR, SEED);
        for voice in DrumVoice::ALL {
            assert!(bank.contains(voice.sample_name()), "{voice:?}");
        }
        assert!(bank.contains(CLICK));
        assert!(bank.contains(CLICK_ACCENT));
        assert_eq!(bank.len(), 7);
    }
}
