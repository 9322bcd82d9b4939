//! Sample bank: named, shared audio buffers for sampler instruments and drums.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::audio::buffer::{AudioBuffer, BufferError};

/// A named collection of audio buffers.
///
/// Buffers are reference-counted so any number of voices can play the same
/// sample without copying it.
#[derive(Debug, Clone, Default)]
pub struct SampleBank {
    samples: HashMap<String, Arc<AudioBuffer>>,
}

impl SampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a named sample, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, buffer: AudioBuffer) {
        self.samples.insert(name.into(), Arc::new(buffer));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<AudioBuffer>> {
        self.samples.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.samples.contains_key(name)
    }

    /// Load a WAV file under `name`, resampled to `sample_rate`.
    pub fn load_wav(
        &mut self,
        name: impl Into<String>,
        path: &Path,
        sample_rate: u32,
    ) -> Result<(), BufferError> {
        let name = name.into();
        let buffer = AudioBuffer::read_wav_file(path, Some(sample_rate))?;
        tracing::info!(sample = %name, frames = buffer.frames(), "sample loaded");
        self.insert(name, buffer);
        Ok(())
    }

    /// Sorted sample names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.samples.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_overwrite() {
        let mut bank = SampleBank::new();
        assert!(bank.is_empty());
        bank.insert("kick", AudioBuffer::from_mono(vec![1.0], 44100));
        bank.insert("kick", AudioBuffer::from_mono(vec![0.5, 0.5], 44100));
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.get("kick").unwrap().frames(), 2);
        assert!(bank.get("snare").is_none());
    }

    #[test]
    fn names_are_sorted() {
        let mut bank = SampleBank::new();
        bank.insert("snare", AudioBuffer::from_mono(vec![0.0], 8000));
        bank.insert("crash", AudioBuffer::from_mono(vec![0.0], 8000));
        assert_eq!(bank.names(), vec!["crash", "snare"]);
    }

    #[test]
    fn load_wav_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.wav");
        AudioBuffer::from_mono(vec![0.25; 100], 8000)
            .write_wav_file(&path)
            .unwrap();

        let mut bank = SampleBank::new();
        bank.load_wav("pad", &path, 16000).unwrap();
        let pad = bank.get("pad").unwrap();
        assert_eq!(pad.sample_rate(), 16000);
        assert_eq!(pad.frames(), 200);
    }

    #[test]
    fn load_missing_file_fails() {
        let mut bank = SampleBank::new();
        assert!(bank
            .load_wav("x", Path::new("/nonexistent/file.wav"), 8000)
            .is_err());
        assert!(!bank.contains("x"));
    }
}
