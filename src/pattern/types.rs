//! Step-instruction alphabets for the four pattern categories.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Steps in one bar.
pub const STEPS_PER_BAR: usize = 16;

/// On/off per step (rhythm-track strums).
pub type RhythmPattern = [bool; STEPS_PER_BAR];

/// Scale-degree token per step; `None` is a rest.
pub type DegreePattern = [Option<DegreeToken>; STEPS_PER_BAR];

/// Chord indices into the diatonic chord list; cycles bar by bar.
pub type Progression = Vec<usize>;

/// Errors raised when validating pattern data handed in from outside.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternError {
    /// A degree token outside `1..=8` / `O`.
    InvalidToken(String),
    /// A progression with no chords.
    EmptyProgression(String),
    /// Malformed interchange data.
    Parse(String),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::InvalidToken(t) => write!(f, "invalid degree token: {t:?}"),
            PatternError::EmptyProgression(name) => write!(f, "progression {name:?} is empty"),
            PatternError::Parse(e) => write!(f, "pattern parse error: {e}"),
        }
    }
}

impl std::error::Error for PatternError {}

impl From<serde_json::Error> for PatternError {
    fn from(e: serde_json::Error) -> Self {
        PatternError::Parse(e.to_string())
    }
}

/// A melodic step: a scale degree relative to the current chord root, or
/// the chord root one octave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DegreeToken {
    /// Degree `1..=7`.
    Degree(u8),
    /// Written `'8'` or `'O'`.
    Octave,
}

impl DegreeToken {
    pub fn parse(token: &str) -> Result<Self, PatternError> {
        match token.trim() {
            "8" | "O" | "o" => Ok(DegreeToken::Octave),
            t => match t.parse::<u8>() {
                Ok(d @ 1..=7) => Ok(DegreeToken::Degree(d)),
                _ => Err(PatternError::InvalidToken(t.to_string())),
            },
        }
    }
}

impl TryFrom<String> for DegreeToken {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DegreeToken> for String {
    fn from(token: DegreeToken) -> Self {
        match token {
            DegreeToken::Degree(d) => d.to_string(),
            DegreeToken::Octave => "8".to_string(),
        }
    }
}

/// The five drum voices of the step sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrumVoice {
    Kick,
    Snare,
    HiHat,
    Tom,
    Crash,
}

impl DrumVoice {
    pub const ALL: [DrumVoice; 5] = [
        DrumVoice::Kick,
        DrumVoice::Snare,
        DrumVoice::HiHat,
        DrumVoice::Tom,
        DrumVoice::Crash,
    ];

    /// Sample-bank name of the synthesized hit.
    pub fn sample_name(self) -> &'static str {
        match self {
            DrumVoice::Kick => "kick",
            DrumVoice::Snare => "snare",
            DrumVoice::HiHat => "hihat",
            DrumVoice::Tom => "tom",
            DrumVoice::Crash => "crash",
        }
    }
}

/// Independent on/off lanes for each drum voice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrumPattern {
    pub kick: RhythmPattern,
    pub snare: RhythmPattern,
    pub hihat: RhythmPattern,
    pub tom: RhythmPattern,
    pub crash: RhythmPattern,
}

impl DrumPattern {
    pub fn lane(&self, voice: DrumVoice) -> &RhythmPattern {
        match voice {
            DrumVoice::Kick => &self.kick,
            DrumVoice::Snare => &self.snare,
            DrumVoice::HiHat => &self.hihat,
            DrumVoice::Tom => &self.tom,
            DrumVoice::Crash => &self.crash,
        }
    }

    /// Voices that hit on `step`.
    pub fn hits(&self, step: usize) -> impl Iterator<Item = DrumVoice> + '_ {
        DrumVoice::ALL
            .into_iter()
            .filter(move |&v| self.lane(v).get(step).copied().unwrap_or(false))
    }
}

/// Build a rhythm lane from a 16-character grid (`x` = on).
pub fn grid(steps: &str) -> RhythmPattern {
    let mut out = [false; STEPS_PER_BAR];
    for (slot, c) in out.iter_mut().zip(steps.chars().filter(|c| !c.is_whitespace())) {
        *slot = matches!(c, 'x' | 'X');
    }
    out
}

/// Build a degree pattern from whitespace-separated tokens (`-` = rest).
pub fn degrees(tokens: &str) -> DegreePattern {
    let mut out = [None; STEPS_PER_BAR];
    for (slot, t) in out.iter_mut().zip(tokens.split_whitespace()) {
        *slot = DegreeToken::parse(t).ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_parsing() {
        assert_eq!(DegreeToken::parse("1"), Ok(DegreeToken::Degree(1)));
        assert_eq!(DegreeToken::parse("7"), Ok(DegreeToken::Degree(7)));
        assert_eq!(DegreeToken::parse("8"), Ok(DegreeToken::Octave));
        assert_eq!(DegreeToken::parse("O"), Ok(DegreeToken::Octave));
        assert!(DegreeToken::parse("0").is_err());
        assert!(DegreeToken::parse("9").is_err());
        assert!(DegreeToken::parse("x").is_err());
    }

    #[test]
    fn degree_pattern_json_alphabet() {
        let json = r#"[null,"1",null,"5","8","O",null,null,null,null,null,null,null,null,null,"3"]"#;
        let pattern: DegreePattern = serde_json::from_str(json).unwrap();
        assert_eq!(pattern[0], None);
        assert_eq!(pattern[1], Some(DegreeToken::Degree(1)));
        assert_eq!(pattern[4], Some(DegreeToken::Octave));
        assert_eq!(pattern[5], Some(DegreeToken::Octave));
        assert_eq!(pattern[15], Some(DegreeToken::Degree(3)));
    }

    #[test]
    fn degree_pattern_rejects_bad_token() {
        let json = r#"[null,"12",null,null,null,null,null,null,null,null,null,null,null,null,null,null]"#;
        assert!(serde_json::from_str::<DegreePattern>(json).is_err());
    }

    #[test]
    fn rhythm_must_be_sixteen_steps() {
        assert!(serde_json::from_str::<RhythmPattern>("[true,false]").is_err());
    }

    #[test]
    fn grid_helper() {
        let g = grid("x...x...x...x...");
        assert!(g[0] && g[4] && g[8] && g[12]);
        assert_eq!(g.iter().filter(|&&s| s).count(), 4);
    }

    #[test]
    fn degrees_helper() {
        let d = degrees("1 - 5 - 8 - - - - - - - - - - 3");
        assert_eq!(d[0], Some(DegreeToken::Degree(1)));
        assert_eq!(d[1], None);
        assert_eq!(d[4], Some(DegreeToken::Octave));
        assert_eq!(d[15], Some(DegreeToken::Degree(3)));
    }

    #[test]
    fn drum_lanes_are_independent() {
        let p = DrumPattern {
            kick: grid("x.......x......."),
            snare: grid("....x.......x..."),
            hihat: grid("x.x.x.x.x.x.x.x."),
            ..Default::default()
        };
        let hits: Vec<DrumVoice> = p.hits(0).collect();
        assert_eq!(hits, vec![DrumVoice::Kick, DrumVoice::HiHat]);
        let hits: Vec<DrumVoice> = p.hits(4).collect();
        assert_eq!(hits, vec![DrumVoice::Snare, DrumVoice::HiHat]);
        assert_eq!(p.hits(1).count(), 0);
    }

    #[test]
    fn drum_pattern_missing_lanes_default_off() {
        let json = format!("{{\"kick\": {}}}", serde_json::to_string(&[true; 16]).unwrap());
        let p: DrumPattern = serde_json::from_str(&json).unwrap();
        assert!(p.kick.iter().all(|&s| s));
        assert!(p.crash.iter().all(|&s| !s));
    }
}
