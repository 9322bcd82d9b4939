//! Engine configuration: audio and timing defaults loaded from ~/.chordstep/config.yaml.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Engine-wide settings. Every field has a default, so a partial file
/// (or none at all) still yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rendering sample rate in Hz.
    pub sample_rate: u32,
    /// Output channels; the mono mix is copied to each.
    pub channels: u16,
    /// Frames rendered per block.
    pub block_size: usize,
    /// How far ahead of the audio clock the scheduler dispatches, in seconds.
    pub lookahead: f64,
    /// Scheduler timer period in milliseconds.
    pub timer_interval_ms: u64,
    /// Ceiling on fire-and-forget voices.
    pub max_pooled_voices: usize,
    /// Microphone round-trip latency removed from recordings, in milliseconds.
    pub looper_latency_ms: f64,
    /// Seed for drum noise and the reverb impulse response.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            block_size: 512,
            lookahead: 0.1,
            timer_interval_ms: 25,
            max_pooled_voices: 30,
            looper_latency_ms: 0.0,
            seed: 42,
        }
    }
}

/// Path of the user config file, if a home directory exists.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".chordstep").join("config.yaml"))
}

impl EngineConfig {
    /// Load from the standard path, falling back to defaults.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::warn!("no home directory, using default engine config");
                Self::default()
            }
        }
    }

    /// Load from `path`. A missing file is silent; an unreadable or invalid
    /// one logs a warning. Both yield defaults.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read engine config");
                return Self::default();
            }
        };
        match serde_yaml::from_str::<Self>(&content) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid engine config, using defaults");
                Self::default()
            }
        }
    }

    /// Replace out-of-range values with their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(8000..=192_000).contains(&self.sample_rate) {
            tracing::warn!(sample_rate = self.sample_rate, "sample rate out of range");
            self.sample_rate = defaults.sample_rate;
        }
        if self.channels == 0 {
            self.channels = defaults.channels;
        }
        if self.block_size == 0 {
            self.block_size = defaults.block_size;
        }
        if self.lookahead.is_nan() || self.lookahead <= 0.0 {
            self.lookahead = defaults.lookahead;
        }
        if self.timer_interval_ms == 0 {
            self.timer_interval_ms = defaults.timer_interval_ms;
        }
        if self.max_pooled_voices == 0 {
            self.max_pooled_voices = defaults.max_pooled_voices;
        }
        if self.looper_latency_ms.is_nan() || self.looper_latency_ms < 0.0 {
            self.looper_latency_ms = defaults.looper_latency_ms;
        }
        self
    }

    pub fn looper_latency(&self) -> f64 {
        self.looper_latency_ms / 1000.0
    }
}
