//! Master-bus dynamics: soft-knee compressor and the output ceiling.

/// Compressor settings, in dB and seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -12.0,
            knee_db: 6.0,
            ratio: 4.0,
            attack: 0.005,
            release: 0.15,
        }
    }
}

/// Feed-forward compressor with a peak detector in the dB domain.
#[derive(Debug, Clone)]
pub struct Compressor {
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction in dB (<= 0).
    reduction_db: f32,
}

impl Compressor {
    pub fn new(settings: CompressorSettings, sample_rate: u32) -> Self {
        let coeff = |t: f32| (-1.0 / (t.max(1e-4) * sample_rate as f32)).exp();
        Self {
            settings,
            attack_coeff: coeff(settings.attack),
            release_coeff: coeff(settings.release),
            reduction_db: 0.0,
        }
    }

    pub fn settings(&self) -> CompressorSettings {
        self.settings
    }

    /// Current gain reduction in dB (0 or negative).
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    /// Static curve: desired gain change in dB for an input level in dB.
    pub fn gain_computer(&self, level_db: f32) -> f32 {
        let CompressorSettings {
            threshold_db,
            knee_db,
            ratio,
            ..
        } = self.settings;
        let over = level_db - threshold_db;
        let slope = 1.0 / ratio - 1.0;
        if 2.0 * over < -knee_db {
            0.0
        } else if knee_db > 0.0 && 2.0 * over.abs() <= knee_db {
            slope * (over + knee_db / 2.0).powi(2) / (2.0 * knee_db)
        } else {
            slope * over
        }
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let level_db = 20.0 * sample.abs().max(1e-6).log10();
        let target = self.gain_computer(level_db);
        // Falling reduction is the attack phase.
        let coeff = if target < self.reduction_db {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.reduction_db = target + (self.reduction_db - target) * coeff;
        sample * 10f32.powf(self.reduction_db / 20.0)
    }

    pub fn process_block(&mut self, buffer: &mut [f32]) {
        for s in buffer.iter_mut() {
            *s = self.process(*s);
        }
    }
}

/// Hard limiter that clamps samples to `[-ceiling, ceiling]`.
#[derive(Debug, Clone)]
pub struct Limiter {
    ceiling: f32,
}

impl Limiter {
    pub fn new(ceiling: f32) -> Self {
        debug_assert!(ceiling > 0.0 && ceiling <= 1.0);
        Self { ceiling }
    }

    #[inline]
    pub fn process(&self, sample: f32) -> f32 {
        sample.clamp(-self.ceiling, self.ceiling)
    }

    pub fn process_block(&self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self { ceiling: 0.95 }
    }
}
