//! Triad derivation: diatonic and borrowed chords built from a scale instance.

use std::fmt;

use super::pitch::PitchClass;
use super::scale::{ScaleInstance, ScaleKind};

const NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

/// Triad quality, classified from the stacked intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Sus2,
    Sus4,
    Major6,
    /// Interval stack matched no known shape.
    Other,
}

impl ChordQuality {
    /// Classify from root→third and third→fifth semitone distances.
    pub fn classify(root_to_third: u8, third_to_fifth: u8) -> Self {
        match root_to_third {
            4 if third_to_fifth == 5 => ChordQuality::Major6,
            4 => ChordQuality::Major,
            3 if third_to_fifth == 3 => ChordQuality::Diminished,
            3 => ChordQuality::Minor,
            5 => ChordQuality::Sus4,
            2 => ChordQuality::Sus2,
            _ => ChordQuality::Other,
        }
    }

    /// Display suffix appended to the root name.
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "dim",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Major6 => "6",
            ChordQuality::Other => "?",
        }
    }
}

/// A derived triad. Never mutated; regenerate when the key changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Chord {
    pub root: &'static str,
    pub root_pitch: PitchClass,
    pub quality: ChordQuality,
    /// Root, third and fifth note names.
    pub notes: [&'static str; 3],
    pub pitches: [PitchClass; 3],
    /// Root plus quality suffix, e.g. `"Am"`.
    pub name: String,
    pub numeral: String,
    /// Zero-based scale degree of the root.
    pub degree: usize,
    /// Set for chords taken from the parallel mode.
    pub borrowed: bool,
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn numeral_for(degree: usize, quality: ChordQuality) -> String {
    let base = NUMERALS.get(degree).copied().unwrap_or("?");
    match quality {
        ChordQuality::Minor => base.to_lowercase(),
        ChordQuality::Diminished => format!("{}°", base.to_lowercase()),
        _ => base.to_string(),
    }
}

fn triads(scale: &ScaleInstance, borrowed: bool) -> Vec<Chord> {
    let pitches = scale.pitches();
    let n = pitches.len();
    (0..n)
        .map(|i| {
            let root = pitches[i];
            let third = pitches[(i + 2) % n];
            let fifth = pitches[(i + 4) % n];
            let quality = ChordQuality::classify(root.interval_to(third), third.interval_to(fifth));
            let root_name = scale.spell(root);
            Chord {
                root: root_name,
                root_pitch: root,
                quality,
                notes: [root_name, scale.spell(third), scale.spell(fifth)],
                pitches: [root, third, fifth],
                name: format!("{root_name}{}", quality.suffix()),
                numeral: numeral_for(i, quality),
                degree: i,
                borrowed,
            }
        })
        .collect()
}

/// One triad per scale degree of `scale_key` on `root`.
pub fn diatonic_chords(root: PitchClass, scale_key: &str) -> Vec<Chord> {
    triads(&ScaleInstance::new(root, ScaleKind::from_key(scale_key)), false)
}

/// Triads of the parallel mode that are not already diatonic, flagged `borrowed`.
pub fn borrowed_chords(root: PitchClass, scale_key: &str) -> Vec<Chord> {
    let kind = ScaleKind::from_key(scale_key);
    let diatonic = triads(&ScaleInstance::new(root, kind), false);
    triads(&ScaleInstance::new(root, kind.parallel()), true)
        .into_iter()
        .filter(|c| {
            !diatonic
                .iter()
                .any(|d| d.root_pitch == c.root_pitch && d.quality == c.quality)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::scale::ALL_SCALES;

    fn names(chords: &[Chord]) -> Vec<String> {
        chords.iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn c_major_triads() {
        let chords = diatonic_chords(PitchClass::C, "major");
        assert_eq!(
            names(&chords),
            vec!["C", "Dm", "Em", "F", "G", "Am", "Bdim"]
        );
        assert_eq!(chords[4].notes, ["G", "B", "D"]);
        assert_eq!(chords[6].numeral, "vii°");
        assert_eq!(chords[5].numeral, "vi");
        assert_eq!(chords[0].numeral, "I");
    }

    #[test]
    fn major_quality_pattern_for_every_root() {
        use ChordQuality::*;
        for root in 0..12 {
            let chords = diatonic_chords(PitchClass::new(root), "major");
            assert_eq!(chords.len(), 7);
            let qualities: Vec<ChordQuality> = chords.iter().map(|c| c.quality).collect();
            assert_eq!(
                qualities,
                vec![Major, Minor, Minor, Major, Major, Minor, Diminished]
            );
        }
    }

    #[test]
    fn f_major_spells_bb() {
        let chords = diatonic_chords(PitchClass::F, "major");
        assert_eq!(chords[3].name, "Bb");
        assert_eq!(chords[3].notes, ["Bb", "D", "F"]);
    }

    #[test]
    fn pentatonic_produces_sixth_and_sus_shapes() {
        // C D E G A: C-E-A stacks 4 + 5 semitones.
        let chords = diatonic_chords(PitchClass::C, "major_pentatonic");
        assert_eq!(chords.len(), 5);
        assert_eq!(chords[0].quality, ChordQuality::Major6);
        assert_eq!(chords[0].name, "C6");
        // D-G-C: 5 semitones to the "third".
        assert_eq!(chords[1].quality, ChordQuality::Sus4);
    }

    #[test]
    fn other_quality_is_flagged() {
        assert_eq!(ChordQuality::classify(6, 3), ChordQuality::Other);
        assert_eq!(ChordQuality::Other.suffix(), "?");
        assert_eq!(ChordQuality::classify(2, 5), ChordQuality::Sus2);
    }

    #[test]
    fn unknown_scale_chords_match_major() {
        assert_eq!(
            diatonic_chords(PitchClass::D, "bogus"),
            diatonic_chords(PitchClass::D, "major")
        );
    }

    #[test]
    fn borrowed_chords_are_flagged_and_new() {
        let diatonic = diatonic_chords(PitchClass::C, "major");
        let borrowed = borrowed_chords(PitchClass::C, "major");
        assert!(!borrowed.is_empty());
        assert!(borrowed.iter().all(|c| c.borrowed));
        for chord in &borrowed {
            assert!(!diatonic.iter().any(|d| d.name == chord.name));
        }
        let borrowed_names = names(&borrowed);
        assert!(borrowed_names.contains(&"Cm".to_string()));
        assert!(borrowed_names.contains(&"G#".to_string()) || borrowed_names.contains(&"Ab".to_string()));
    }

    #[test]
    fn every_scale_yields_one_chord_per_degree() {
        for kind in ALL_SCALES {
            let chords = diatonic_chords(PitchClass::A, kind.key());
            assert_eq!(chords.len(), kind.intervals().len());
            for (i, chord) in chords.iter().enumerate() {
                assert_eq!(chord.degree, i);
                assert!(!chord.borrowed);
            }
        }
    }
}
