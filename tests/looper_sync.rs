//! Looper playback and recording stay locked to the scheduler's loop boundaries.

use std::collections::BTreeMap;

use ringbuf::traits::Producer;

use chordstep::audio::{AudioBuffer, RingInput};
use chordstep::config::EngineConfig;
use chordstep::looper::{BankStatus, LooperEvent};
use chordstep::pattern::{CustomPatterns, PatternBank};
use chordstep::scheduler::{SchedulerEvent, SequencerConfig};
use chordstep::Workstation;

const SR: u32 = 8000;

/// 240 BPM "Pop Hit": one-second bars, four-second loops.
fn workstation() -> Workstation {
    let config = EngineConfig {
        sample_rate: SR,
        ..EngineConfig::default()
    };
    let sequencer = SequencerConfig {
        bpm: 240.0,
        ..SequencerConfig::default()
    };
    let mut ws = Workstation::new(&config, sequencer, PatternBank::builtin());
    ws.enable_event_log();
    ws
}

fn boundary_times(events: &[SchedulerEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::Step(s) if s.is_loop_boundary() => Some(s.time),
            _ => None,
        })
        .collect()
}

#[test]
fn short_loop_restarts_once_per_boundary() {
    let mut ws = workstation();
    // Shorter than a bar.
    ws.load_loop(0, AudioBuffer::from_mono(vec![0.2; SR as usize / 2], SR))
        .unwrap();
    ws.start();

    let mut handles = Vec::new();
    let mut boundaries = Vec::new();
    for _ in 0..3 {
        ws.bounce(4.0, 200);
        boundaries.extend(boundary_times(&ws.take_events()));
        handles.push(ws.looper().bank(0).unwrap().live_voice().unwrap());
        // Never more than the outgoing and incoming playback at once.
        let (_, managed, _) = ws.engine().voices.ownership_counts();
        assert!(managed <= 2);
    }

    assert_eq!(boundaries.len(), 4);
    for (i, t) in boundaries.iter().enumerate() {
        assert!((t - 4.0 * i as f64).abs() < 1e-9);
    }
    handles.dedup();
    assert_eq!(handles.len(), 3);
}

#[test]
fn armed_bank_records_after_count_in() {
    let mut ws = workstation();
    // One-bar progression so every bar is a loop.
    let mut custom = CustomPatterns::default();
    custom.progressions = BTreeMap::from([("One".to_string(), vec![0])]);
    ws.merge_custom_patterns(custom);
    let mut sequencer = ws.scheduler().config().clone();
    sequencer.patterns.progression = "One".to_string();
    ws.scheduler_mut().set_config(sequencer);

    let (mut mic, input) = RingInput::channel(SR, SR as usize * 2);
    ws.attach_microphone(Box::new(input));
    ws.arm_loop(2).unwrap();
    ws.start();

    // Feed the microphone in step with rendering.
    let mut feed = |ws: &mut Workstation, seconds: f64| {
        for _ in 0..(seconds * SR as f64 / 200.0).round() as usize {
            ws.bounce(200.0 / SR as f64, 200);
            for _ in 0..200 {
                let _ = mic.try_push(0.25);
            }
        }
    };

    feed(&mut ws, 0.5);
    assert_eq!(ws.looper().status(2), Some(BankStatus::Armed));
    feed(&mut ws, 1.0);
    assert_eq!(ws.looper().status(2), Some(BankStatus::Recording));
    feed(&mut ws, 1.05);
    assert_eq!(ws.looper().status(2), Some(BankStatus::Playing));

    let recorded = ws
        .take_looper_events()
        .into_iter()
        .find_map(|e| match e {
            LooperEvent::Recorded { bank, buffer } => Some((bank, buffer)),
            _ => None,
        });
    let (bank, buffer) = recorded.expect("no recording finished");
    assert_eq!(bank, 2);
    assert_eq!(buffer.frames(), SR as usize);
    assert!((buffer.mono_sample(SR as usize / 2) - 0.25).abs() < 1e-6);
    // Input reaches the end of the loop, not just its middle.
    assert!((buffer.mono_sample(SR as usize - 100) - 0.25).abs() < 1e-6);
}
