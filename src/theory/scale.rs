//! Scale tables and scale-instance generation with idiomatic spelling.

use super::pitch::PitchClass;

/// Built-in scale types. Unknown keys resolve to [`ScaleKind::Major`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleKind {
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
}

/// Every built-in scale, in display order.
pub const ALL_SCALES: [ScaleKind; 12] = [
    ScaleKind::Major,
    ScaleKind::Minor,
    ScaleKind::Dorian,
    ScaleKind::Phrygian,
    ScaleKind::Lydian,
    ScaleKind::Mixolydian,
    ScaleKind::Locrian,
    ScaleKind::HarmonicMinor,
    ScaleKind::MelodicMinor,
    ScaleKind::MajorPentatonic,
    ScaleKind::MinorPentatonic,
    ScaleKind::Blues,
];

/// Flat-spelled roots for major-family scales (F, Bb, Eb, Ab, Db).
const MAJOR_FLAT_ROOTS: [u8; 5] = [5, 10, 3, 8, 1];

/// Flat-spelled roots for minor-family scales (C, G, D, F, Bb, Eb).
const MINOR_FLAT_ROOTS: [u8; 6] = [0, 7, 2, 5, 10, 3];

impl ScaleKind {
    /// Resolve a scale key. Never fails: unknown keys become `Major`.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "major" | "ionian" => ScaleKind::Major,
            "minor" | "aeolian" | "natural_minor" => ScaleKind::Minor,
            "dorian" => ScaleKind::Dorian,
            "phrygian" => ScaleKind::Phrygian,
            "lydian" => ScaleKind::Lydian,
            "mixolydian" => ScaleKind::Mixolydian,
            "locrian" => ScaleKind::Locrian,
            "harmonic_minor" => ScaleKind::HarmonicMinor,
            "melodic_minor" => ScaleKind::MelodicMinor,
            "major_pentatonic" => ScaleKind::MajorPentatonic,
            "minor_pentatonic" => ScaleKind::MinorPentatonic,
            "blues" => ScaleKind::Blues,
            other => {
                tracing::warn!(scale = other, "unknown scale key, using major");
                ScaleKind::Major
            }
        }
    }

    /// Canonical key string.
    pub fn key(self) -> &'static str {
        match self {
            ScaleKind::Major => "major",
            ScaleKind::Minor => "minor",
            ScaleKind::Dorian => "dorian",
            ScaleKind::Phrygian => "phrygian",
            ScaleKind::Lydian => "lydian",
            ScaleKind::Mixolydian => "mixolydian",
            ScaleKind::Locrian => "locrian",
            ScaleKind::HarmonicMinor => "harmonic_minor",
            ScaleKind::MelodicMinor => "melodic_minor",
            ScaleKind::MajorPentatonic => "major_pentatonic",
            ScaleKind::MinorPentatonic => "minor_pentatonic",
            ScaleKind::Blues => "blues",
        }
    }

    /// Semitone offsets from the root.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ScaleKind::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleKind::Minor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleKind::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleKind::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleKind::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            ScaleKind::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleKind::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            ScaleKind::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleKind::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            ScaleKind::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleKind::MinorPentatonic => &[0, 3, 5, 7, 10],
            ScaleKind::Blues => &[0, 3, 5, 6, 7, 10],
        }
    }

    /// Whether the scale spells like a major key (bright third).
    pub fn is_major_family(self) -> bool {
        matches!(
            self,
            ScaleKind::Major
                | ScaleKind::Lydian
                | ScaleKind::Mixolydian
                | ScaleKind::MajorPentatonic
        )
    }

    /// The parallel mode used for borrowed chords.
    pub fn parallel(self) -> Self {
        if self.is_major_family() {
            ScaleKind::Minor
        } else {
            ScaleKind::Major
        }
    }

    /// Whether a scale on `root` should be written with flats.
    pub fn uses_flats(self, root: PitchClass) -> bool {
        let pc = root.index();
        if self.is_major_family() {
            MAJOR_FLAT_ROOTS.contains(&pc)
        } else {
            MINOR_FLAT_ROOTS.contains(&pc)
        }
    }
}

/// A concrete scale: a root plus a scale type, with its spelled pitches.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleInstance {
    pub root: PitchClass,
    pub kind: ScaleKind,
    pitches: Vec<PitchClass>,
    flats: bool,
}

impl ScaleInstance {
    pub fn new(root: PitchClass, kind: ScaleKind) -> Self {
        let pitches = kind
            .intervals()
            .iter()
            .map(|&i| root.transpose(i as i32))
            .collect();
        Self {
            root,
            kind,
            pitches,
            flats: kind.uses_flats(root),
        }
    }

    /// Pitch classes in scale order, starting at the root.
    pub fn pitches(&self) -> &[PitchClass] {
        &self.pitches
    }

    /// Spelled note names in scale order.
    pub fn names(&self) -> Vec<&'static str> {
        self.pitches.iter().map(|p| p.spelled(self.flats)).collect()
    }

    /// Spell any pitch class the way this scale would.
    pub fn spell(&self, pc: PitchClass) -> &'static str {
        pc.spelled(self.flats)
    }

    pub fn uses_flats(&self) -> bool {
        self.flats
    }

    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    /// Position of a pitch class within the scale, if present.
    pub fn degree_of(&self, pc: PitchClass) -> Option<usize> {
        self.pitches.iter().position(|&p| p == pc)
    }
}

/// Generate the spelled notes of `scale_key` on `root`.
///
/// Total: an unrecognised `scale_key` produces the major scale.
pub fn generate_scale(root: PitchClass, scale_key: &str) -> Vec<&'static str> {
    ScaleInstance::new(root, ScaleKind::from_key(scale_key)).names()
}
