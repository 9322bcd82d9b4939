//! Built-in pattern presets.

use super::types::{degrees, grid, DegreePattern, DrumPattern, RhythmPattern};

/// Progression used when a named progression cannot be found ("Pop Hit").
pub const DEFAULT_PROGRESSION: [usize; 4] = [0, 4, 5, 3];

pub fn rhythms() -> Vec<(&'static str, RhythmPattern)> {
    vec![
        ("All Steps", [true; 16]),
        ("Quarter Notes", grid("x...x...x...x...")),
        ("Eighth Notes", grid("x.x.x.x.x.x.x.x.")),
        ("Offbeat", grid("..x...x...x...x.")),
        ("Reggae Skank", grid("....x.......x...")),
        ("Ballad", grid("x.......x.x.....")),
        ("Folk Strum", grid("x..x..x.x.x.x.x.")),
    ]
}

pub fn degree_patterns() -> Vec<(&'static str, DegreePattern)> {
    vec![
        ("Root Pulse", degrees("1 - - - 1 - - - 1 - - - 1 - - -")),
        ("Root Fifth", degrees("1 - - - 5 - - - 1 - - - 5 - - -")),
        ("Walking", degrees("1 - - - 3 - - - 5 - - - 6 - - -")),
        ("Arpeggio Up", degrees("1 - 3 - 5 - 8 - 1 - 3 - 5 - 8 -")),
        ("Octave Bounce", degrees("1 - 8 - 1 - 8 - 1 - 8 - 1 - 8 -")),
        ("Off", [None; 16]),
        ("Melody A", degrees("5 - 3 - 1 - - - 2 - 3 - 5 - - -")),
    ]
}

pub fn drum_patterns() -> Vec<(&'static str, DrumPattern)> {
    vec![
        (
            "Basic Rock",
            DrumPattern {
                kick: grid("x.......x......."),
                snare: grid("....x.......x..."),
                hihat: grid("x.x.x.x.x.x.x.x."),
                ..Default::default()
            },
        ),
        (
            "Four On Floor",
            DrumPattern {
                kick: grid("x...x...x...x..."),
                snare: grid("....x.......x..."),
                hihat: grid("..x...x...x...x."),
                crash: grid("x..............."),
                ..Default::default()
            },
        ),
        (
            "Hip Hop",
            DrumPattern {
                kick: grid("x......x..x....."),
                snare: grid("....x.......x..."),
                hihat: grid("x.x.x.x.x.x.x.xx"),
                tom: grid("..............x."),
                ..Default::default()
            },
        ),
        ("Off", DrumPattern::default()),
    ]
}

pub fn progressions() -> Vec<(&'static str, Vec<usize>)> {
    vec![
        ("Pop Hit", DEFAULT_PROGRESSION.to_vec()),
        ("Fifties", vec![0, 5, 3, 4]),
        ("Blues", vec![0, 0, 0, 0, 3, 3, 0, 0, 4, 3, 0, 4]),
        ("Axis", vec![5, 3, 0, 4]),
        ("Jazz ii-V-I", vec![1, 4, 0, 0]),
        ("Canon", vec![0, 4, 5, 2, 3, 0, 3, 4]),
    ]
}
