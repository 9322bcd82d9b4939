//! Layered lookup tables: immutable built-ins under a mutable custom overlay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::builtin;
use super::types::{DegreePattern, DrumPattern, PatternError, Progression, RhythmPattern};

/// Named patterns of one alphabet.
///
/// Custom entries shadow built-ins of the same name; removing a custom entry
/// reveals the built-in again. Built-ins are never mutated.
#[derive(Debug, Clone)]
pub struct Library<T> {
    builtin: BTreeMap<String, T>,
    custom: BTreeMap<String, T>,
    fallback: T,
}

impl<T: Clone> Library<T> {
    pub fn new<'a>(builtin: impl IntoIterator<Item = (&'a str, T)>, fallback: T) -> Self {
        Self {
            builtin: builtin
                .into_iter()
                .map(|(name, p)| (name.to_string(), p))
                .collect(),
            custom: BTreeMap::new(),
            fallback,
        }
    }

    /// Look up by name, custom overlay first.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.custom.get(name).or_else(|| self.builtin.get(name))
    }

    /// Look up by name, substituting the library fallback when missing.
    pub fn resolve(&self, name: &str) -> &T {
        self.get(name).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin.contains_key(name)
    }

    /// Insert or replace a custom entry. Returns the previous custom value.
    pub fn insert_custom(&mut self, name: impl Into<String>, pattern: T) -> Option<T> {
        self.custom.insert(name.into(), pattern)
    }

    pub fn remove_custom(&mut self, name: &str) -> Option<T> {
        self.custom.remove(name)
    }

    pub fn custom(&self) -> &BTreeMap<String, T> {
        &self.custom
    }

    pub fn fallback(&self) -> &T {
        &self.fallback
    }

    /// All visible names, sorted, without duplicates.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .builtin
            .keys()
            .chain(self.custom.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// User-defined patterns as plain data, persisted by a collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomPatterns {
    pub rhythms: BTreeMap<String, RhythmPattern>,
    pub degrees: BTreeMap<String, DegreePattern>,
    pub drums: BTreeMap<String, DrumPattern>,
    pub progressions: BTreeMap<String, Progression>,
}

impl CustomPatterns {
    pub fn from_json(json: &str) -> Result<Self, PatternError> {
        let patterns: CustomPatterns = serde_json::from_str(json)?;
        if let Some((name, _)) = patterns.progressions.iter().find(|(_, p)| p.is_empty()) {
            return Err(PatternError::EmptyProgression(name.clone()));
        }
        Ok(patterns)
    }

    pub fn to_json(&self) -> Result<String, PatternError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The four pattern categories the scheduler reads from.
#[derive(Debug, Clone)]
pub struct PatternBank {
    pub rhythms: Library<RhythmPattern>,
    pub degrees: Library<DegreePattern>,
    pub drums: Library<DrumPattern>,
    pub progressions: Library<Progression>,
}

impl PatternBank {
    /// Built-in presets only.
    pub fn builtin() -> Self {
        Self {
            rhythms: Library::new(builtin::rhythms(), [false; 16]),
            degrees: Library::new(builtin::degree_patterns(), [None; 16]),
            drums: Library::new(builtin::drum_patterns(), DrumPattern::default()),
            progressions: Library::new(
                builtin::progressions(),
                builtin::DEFAULT_PROGRESSION.to_vec(),
            ),
        }
    }

    /// Built-ins overlaid with externally supplied custom patterns.
    pub fn with_custom(custom: CustomPatterns) -> Self {
        let mut bank = Self::builtin();
        bank.merge_custom(custom);
        bank
    }

    /// Overlay custom patterns. Empty progressions are skipped.
    pub fn merge_custom(&mut self, custom: CustomPatterns) {
        for (name, p) in custom.rhythms {
            self.rhythms.insert_custom(name, p);
        }
        for (name, p) in custom.degrees {
            self.degrees.insert_custom(name, p);
        }
        for (name, p) in custom.drums {
            self.drums.insert_custom(name, p);
        }
        for (name, p) in custom.progressions {
            if p.is_empty() {
                tracing::warn!(progression = %name, "skipping empty custom progression");
                continue;
            }
            self.progressions.insert_custom(name, p);
        }
    }

    /// Current custom overlay as plain data for persistence.
    pub fn custom_patterns(&self) -> CustomPatterns {
        CustomPatterns {
            rhythms: self.rhythms.custom().clone(),
            degrees: self.degrees.custom().clone(),
            drums: self.drums.custom().clone(),
            progressions: self.progressions.custom().clone(),
        }
    }
}

impl Default for PatternBank {
    fn default() -> Self {
        Self::builtin()
    }
}
