//! Whole-crate properties: theory tables, step timing, polyphony and audio/preset I/O.

use assert_approx_eq::assert_approx_eq;

use chordstep::audio::{AudioBuffer, AudioEngine};
use chordstep::config::EngineConfig;
use chordstep::mixer::TrackId;
use chordstep::pattern::PatternBank;
use chordstep::preset::Preset;
use chordstep::scheduler::{SchedulerEvent, SequencerConfig};
use chordstep::theory::{diatonic_chords, generate_scale, ChordQuality, PitchClass, ALL_SCALES};
use chordstep::Workstation;

const SR: u32 = 8000;

fn engine_config() -> EngineConfig {
    EngineConfig {
        sample_rate: SR,
        ..EngineConfig::default()
    }
}

#[test]
fn every_scale_on_every_root() {
    for root in (0..12).map(PitchClass::new) {
        for kind in ALL_SCALES {
            let notes = generate_scale(root, kind.key());
            assert_eq!(notes.len(), kind.intervals().len());
            let mut pitches: Vec<u8> = notes
                .iter()
                .map(|n| PitchClass::parse(n).unwrap().index())
                .collect();
            pitches.sort_unstable();
            pitches.dedup();
            assert_eq!(pitches.len(), notes.len(), "{root} {}", kind.key());
        }
        assert_eq!(generate_scale(root, "no-such-scale"), generate_scale(root, "major"));
    }
    assert_eq!(
        generate_scale(PitchClass::F, "major"),
        ["F", "G", "A", "Bb", "C", "D", "E"]
    );
}

#[test]
fn major_keys_share_chord_qualities() {
    use ChordQuality::*;
    for root in (0..12).map(PitchClass::new) {
        let qualities: Vec<ChordQuality> = diatonic_chords(root, "major")
            .iter()
            .map(|c| c.quality)
            .collect();
        assert_eq!(
            qualities,
            [Major, Minor, Minor, Major, Major, Minor, Diminished]
        );
    }
}

#[test]
fn step_times_increase_at_any_tempo() {
    for bpm in [40.0, 73.0, 120.0, 200.0] {
        for swing in [0.0, 0.3] {
            let sequencer = SequencerConfig {
                bpm,
                swing,
                ..SequencerConfig::default()
            };
            let mut ws = Workstation::new(&engine_config(), sequencer.clone(), PatternBank::builtin());
            ws.enable_event_log();
            ws.start();
            ws.bounce(3.0, 256);
            let steps: Vec<_> = ws
                .take_events()
                .into_iter()
                .filter_map(|e| match e {
                    SchedulerEvent::Step(s) => Some(s),
                    _ => None,
                })
                .collect();
            assert!(steps.len() > 4);
            for pair in steps.windows(2) {
                let expected = sequencer.step_duration(pair[0].step);
                assert!(pair[1].time > pair[0].time);
                assert_approx_eq!(pair[1].time - pair[0].time, expected, 1e-9);
                assert_eq!(pair[1].step, (pair[0].step + 1) % 16);
            }
        }
    }
}

#[test]
fn pooled_voices_are_capped() {
    let mut engine = AudioEngine::new(SR, 30, 7);
    let handles: Vec<_> = (0..40)
        .map(|i| {
            engine
                .voices
                .start_note(220.0 + i as f64, None, "organ", 0.0, None, TrackId::Lead)
        })
        .collect();
    assert_eq!(engine.voices.pooled_count(), 30);

    // Stolen voices fade out within a few milliseconds.
    engine.render_mono(400);
    assert_eq!(engine.voices.active_count(), 30);
    assert!(handles[..10].iter().all(|&h| !engine.voices.is_active(h)));
    assert!(handles[10..].iter().all(|&h| engine.voices.is_active(h)));
}

#[test]
fn wav_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.wav");
    let samples: Vec<f32> = (0..800).map(|i| ((i as f32) * 0.05).sin() * 0.7).collect();
    AudioBuffer::from_mono(samples.clone(), SR)
        .write_wav_file(&path)
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 44 + 800 * 2);

    let decoded = AudioBuffer::read_wav_file(&path, None).unwrap();
    assert_eq!(decoded.sample_rate(), SR);
    assert_eq!(decoded.frames(), 800);
    for (i, &s) in samples.iter().enumerate() {
        assert!((decoded.mono_sample(i) - s).abs() <= 1.0 / 32768.0 + 1e-6);
    }
}

#[test]
fn preset_file_restores_a_workstation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("set.json");

    let mut ws = Workstation::with_defaults(&engine_config());
    ws.scheduler_mut().set_bpm(118.0);
    ws.engine_mut().mixer.set_track_volume(TrackId::Drums, 0.4);
    ws.mute_loop(3).unwrap();
    ws.snapshot_preset("Set").save(&path).unwrap();

    let preset = Preset::load(&path).unwrap();
    let mut restored = Workstation::with_defaults(&engine_config());
    restored.load_preset(&preset);
    let snapshot = restored.snapshot_preset("Set");
    assert_eq!(snapshot.sequencer.bpm, 118.0);
    assert_eq!(snapshot.mixer.tracks[&TrackId::Drums].volume, 0.4);
    assert!(snapshot.looper.banks[3].muted);
}
