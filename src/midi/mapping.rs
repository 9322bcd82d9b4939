//! MIDI message mapping: converts raw MIDI bytes to keyboard and mixer events.

use serde::{Deserialize, Serialize};

use crate::mixer::TrackId;

/// What a MIDI message asks the workstation to do.
#[derive(Debug, Clone, PartialEq)]
pub enum MidiEvent {
    /// Play `note` on the keyboard instrument (or the mapped one).
    NoteOn {
        note: u8,
        velocity: f32,
        instrument: Option<String>,
    },
    NoteOff { note: u8 },
    TrackVolume { track: TrackId, value: f32 },
    TrackBrightness { track: TrackId, value: f32 },
    TrackReverb { track: TrackId, value: f32 },
}

/// Mapping rule from MIDI messages to workstation events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MidiMapping {
    /// Map a CC number to a track's volume (CC value 0-127 → 0.0-1.0).
    CcToVolume { cc: u8, track: TrackId },
    /// Map a CC number to a track's filter brightness.
    CcToBrightness { cc: u8, track: TrackId },
    /// Map a CC number to a track's reverb send.
    CcToReverb { cc: u8, track: TrackId },
    /// Play notes in a range with a specific instrument.
    NoteRange {
        note_range: (u8, u8),
        instrument: String,
    },
}

/// Parse a raw MIDI message and apply mappings.
///
/// MIDI message format:
/// - Note On:  [0x90 | channel, note, velocity]
/// - Note Off: [0x80 | channel, note, velocity]
/// - CC:       [0xB0 | channel, cc_number, value]
///
/// Notes outside every `NoteRange` still play, on the keyboard instrument.
pub fn apply_midi_message(
    msg: &[u8],
    mappings: &[MidiMapping],
    channel_filter: Option<u8>,
) -> Option<MidiEvent> {
    let (&status_byte, data) = msg.split_first()?;
    let status = status_byte & 0xF0;
    let channel = status_byte & 0x0F;

    if channel_filter.is_some_and(|filter| channel != filter) {
        return None;
    }

    match (status, data) {
        (0x90, &[note, velocity, ..]) if velocity > 0 => Some(MidiEvent::NoteOn {
            note,
            velocity: velocity as f32 / 127.0,
            instrument: instrument_for(note, mappings),
        }),
        // Note On with velocity 0 is a Note Off.
        (0x90 | 0x80, &[note, _, ..]) => Some(MidiEvent::NoteOff { note }),
        (0xB0, &[cc_number, value, ..]) => {
            let value = value as f32 / 127.0;
            mappings.iter().find_map(|mapping| match *mapping {
                MidiMapping::CcToVolume { cc, track } if cc == cc_number => {
                    Some(MidiEvent::TrackVolume { track, value })
                }
                MidiMapping::CcToBrightness { cc, track } if cc == cc_number => {
                    Some(MidiEvent::TrackBrightness { track, value })
                }
                MidiMapping::CcToReverb { cc, track } if cc == cc_number => {
                    Some(MidiEvent::TrackReverb { track, value })
                }
                _ => None,
            })
        }
        _ => None,
    }
}

fn instrument_for(note: u8, mappings: &[MidiMapping]) -> Option<String> {
    mappings.iter().find_map(|mapping| match mapping {
        MidiMapping::NoteRange {
            note_range,
            instrument,
        } if (note_range.0..=note_range.1).contains(&note) => Some(instrument.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings() -> Vec<MidiMapping> {
        vec![
            MidiMapping::CcToVolume {
                cc: 7,
                track: TrackId::Lead,
            },
            MidiMapping::CcToBrightness {
                cc: 74,
                track: TrackId::Chords,
            },
            MidiMapping::NoteRange {
                note_range: (36, 47),
                instrument: "bass".to_string(),
            },
        ]
    }

    #[test]
    fn note_on_uses_range_instrument() {
        let event = apply_midi_message(&[0x90, 40, 127], &mappings(), None).unwrap();
        assert_eq!(
            event,
            MidiEvent::NoteOn {
                note: 40,
                velocity: 1.0,
                instrument: Some("bass".to_string())
            }
        );
    }

    #[test]
    fn note_outside_ranges_plays_default() {
        let event = apply_midi_message(&[0x90, 60, 64], &mappings(), None).unwrap();
        assert!(matches!(
            event,
            MidiEvent::NoteOn {
                note: 60,
                instrument: None,
                ..
            }
        ));
    }

    #[test]
    fn velocity_zero_is_note_off() {
        assert_eq!(
            apply_midi_message(&[0x90, 60, 0], &[], None),
            Some(MidiEvent::NoteOff { note: 60 })
        );
        assert_eq!(
            apply_midi_message(&[0x83, 61, 10], &[], None),
            Some(MidiEvent::NoteOff { note: 61 })
        );
    }

    #[test]
    fn cc_maps_to_mixer() {
        let Some(MidiEvent::TrackBrightness { track, value }) =
            apply_midi_message(&[0xB0, 74, 127], &mappings(), None)
        else {
            panic!("expected a brightness change");
        };
        assert_eq!(track, TrackId::Chords);
        assert_eq!(value, 1.0);
        assert!(apply_midi_message(&[0xB0, 1, 64], &mappings(), None).is_none());
    }

    #[test]
    fn channel_filter() {
        assert!(apply_midi_message(&[0x90, 60, 64], &[], Some(0)).is_some());
        assert!(apply_midi_message(&[0x91, 60, 64], &[], Some(0)).is_none());
    }

    #[test]
    fn short_or_unknown_messages() {
        assert!(apply_midi_message(&[], &[], None).is_none());
        assert!(apply_midi_message(&[0x90, 60], &[], None).is_none());
        assert!(apply_midi_message(&[0xF0, 0x7E], &[], None).is_none());
        assert!(apply_midi_message(&[0xC0, 1], &[], None).is_none());
    }

    #[test]
    fn mappings_yaml_round_trip() {
        let yaml = serde_yaml::to_string(&mappings()).unwrap();
        let parsed: Vec<MidiMapping> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, mappings());
    }
}
