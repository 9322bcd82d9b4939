//! ADSR envelopes, expressed as automation on a voice's gain parameter.

use serde::{Deserialize, Serialize};

use crate::audio::param::AudioParam;

/// Attack-Decay-Sustain-Release envelope.
///
/// Times are in seconds, `sustain` is a fraction of the peak level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrEnvelope {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f32,
    pub release: f64,
}

impl AdsrEnvelope {
    pub const fn new(attack: f64, decay: f64, sustain: f32, release: f64) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Percussive shapes die away on their own and ignore the note length.
    pub fn is_percussive(&self) -> bool {
        self.sustain <= 0.0
    }

    /// Write the envelope onto `gain` for a note starting at `start`.
    ///
    /// - linear ramp 0 → `peak` over `attack`
    /// - exponential approach to `peak * sustain` with time constant `decay / 4`
    /// - with a `duration`: percussive shapes end at `start + attack + decay`,
    ///   others ramp linearly to 0 over `release` from `start + duration`
    ///
    /// Returns the time the voice becomes silent, or `None` when the note
    /// holds until explicitly stopped.
    pub fn schedule(
        &self,
        gain: &mut AudioParam,
        start: f64,
        peak: f32,
        duration: Option<f64>,
    ) -> Option<f64> {
        let attack = self.attack.max(0.0);
        let decay = self.decay.max(0.0);
        let sustain = self.sustain.clamp(0.0, 1.0);
        let attack_end = start + attack;

        gain.set_value_at(0.0, start);
        if attack > 0.0 {
            gain.linear_ramp_to(peak, attack_end);
        } else {
            gain.set_value_at(peak, start);
        }
        gain.set_target_at(peak * sustain, attack_end, (decay / 4.0).max(1e-4));

        if self.is_percussive() {
            let end = attack_end + decay;
            gain.linear_ramp_to(0.0, end);
            return Some(end);
        }

        let release_start = start + duration?.max(0.0);
        let level = gain.cancel_and_hold(release_start);
        let end = release_start + self.release.max(0.001);
        gain.linear_ramp_to(0.0, end);
        tracing::trace!(release_start, level, "release scheduled");
        Some(end)
    }
}

impl Default for AdsrEnvelope {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.7, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_env() -> AdsrEnvelope {
        AdsrEnvelope::new(0.01, 0.08, 0.5, 0.1)
    }

    #[test]
    fn starts_at_zero_and_reaches_peak() {
        let mut gain = AudioParam::new(0.0);
        test_env().schedule(&mut gain, 1.0, 0.8, Some(1.0));
        assert!(gain.value_at(1.0).abs() < 1e-6);
        assert!((gain.value_at(1.01) - 0.8).abs() < 1e-6);
        assert!((gain.value_at(1.005) - 0.4).abs() < 1e-4);
    }

    #[test]
    fn decay_uses_quarter_time_constant() {
        let mut gain = AudioParam::new(0.0);
        test_env().schedule(&mut gain, 0.0, 1.0, None);
        // One time constant (decay / 4) into the decay.
        let v = gain.value_at(0.01 + 0.02);
        let expected = 0.5 + 0.5 * (-1.0f32).exp();
        assert!((v - expected).abs() < 1e-3, "{v} vs {expected}");
        // Effectively at sustain after the full decay time.
        assert!((gain.value_at(0.5) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn held_note_has_no_end() {
        let mut gain = AudioParam::new(0.0);
        assert_eq!(test_env().schedule(&mut gain, 0.0, 1.0, None), None);
        assert!((gain.value_at(10.0) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn release_ramps_from_current_level() {
        let mut gain = AudioParam::new(0.0);
        let end = test_env().schedule(&mut gain, 0.0, 1.0, Some(0.5)).unwrap();
        assert!((end - 0.6).abs() < 1e-9);
        let at_release = gain.value_at(0.5);
        assert!((at_release - 0.5).abs() < 1e-3);
        assert!((gain.value_at(0.55) - at_release / 2.0).abs() < 1e-3);
        assert_eq!(gain.value_at(end), 0.0);
    }

    #[test]
    fn percussive_ends_at_decay_end() {
        let env = AdsrEnvelope::new(0.002, 0.3, 0.0, 0.5);
        let mut gain = AudioParam::new(0.0);
        let end = env.schedule(&mut gain, 2.0, 1.0, Some(10.0)).unwrap();
        assert!((end - 2.302).abs() < 1e-9);
        assert_eq!(gain.value_at(end), 0.0);
        assert!(gain.value_at(2.1) > 0.0);
    }

    #[test]
    fn envelope_stays_in_range() {
        let mut gain = AudioParam::new(0.0);
        test_env().schedule(&mut gain, 0.0, 1.0, Some(0.3));
        for i in 0..1000 {
            let v = gain.value_at(i as f64 / 1000.0);
            assert!((0.0..=1.0 + 1e-6).contains(&v), "t={i}ms: {v}");
        }
    }
}
