//! Lookahead scheduler: turns 16-step bars into timestamped voice events.
//!
//! The host calls [`Scheduler::tick`] every few milliseconds. Each tick
//! dispatches every step whose time falls inside the lookahead window, so
//! the audio for a step is always scheduled before the render position
//! reaches it. Per step, in order:
//!
//! 1. a queued preset takes over (bar start only)
//! 2. the progression advances (bar start only) and listeners hear the chord
//! 3. drums, metronome, chord strum, then bass/lead/sample degree tokens
//! 4. listeners get the step notification

pub mod config;
pub mod listener;
pub mod state;
pub mod timer;

use std::time::{Duration, Instant};

pub use config::{Metronome, PatternSelection, SequencerConfig, TrackSettings, TrackVoicing};
pub use listener::{
    ChordChange, EventLog, NoteEvent, SchedulerEvent, StepContext, StepEvent, StepListener,
};
pub use state::{PlayState, SchedulerState};
pub use timer::LookaheadTimer;

use crate::audio::AudioEngine;
use crate::mixer::TrackId;
use crate::pattern::{DegreeToken, PatternBank, STEPS_PER_BAR};
use crate::preset::Preset;
use crate::theory::{diatonic_chords, midi_to_frequency, Chord, ScaleInstance, ScaleKind};

/// Default scheduling horizon ahead of the audio clock.
pub const DEFAULT_LOOKAHEAD: f64 = 0.1;
/// Gain of sequenced drum hits.
pub const DRUM_VELOCITY: f32 = 0.8;

/// Which melodic lane a degree pattern drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Bass,
    Lead,
    Sample,
}

impl Lane {
    const ALL: [Lane; 3] = [Lane::Bass, Lane::Lead, Lane::Sample];

    fn track(self) -> TrackId {
        match self {
            Lane::Bass => TrackId::Bass,
            Lane::Lead => TrackId::Lead,
            Lane::Sample => TrackId::Samples,
        }
    }
}

/// MIDI note of scale index `index` above the key root at `octave`,
/// wrapping into higher octaves past the top of the scale.
fn scale_note(scale: &ScaleInstance, octave: i32, index: usize) -> i32 {
    let intervals = scale.kind.intervals();
    let n = intervals.len().max(1);
    let interval = intervals.get(index % n).copied().unwrap_or(0) as i32;
    scale.root.midi(octave) + interval + 12 * (index / n) as i32
}

/// Octave-drop voicing: notes above the key root at the track octave move
/// down an octave. The comparison is against the key root, not the chord.
fn apply_drop(midi: i32, scale: &ScaleInstance, octave: i32, drop: bool) -> i32 {
    if drop && midi > scale.root.midi(octave) {
        midi - 12
    } else {
        midi
    }
}

/// Resolve a degree token against the current chord.
pub fn degree_note(token: DegreeToken, chord: &Chord, scale: &ScaleInstance, octave: i32) -> i32 {
    match token {
        DegreeToken::Degree(d) => {
            let index = chord.degree + (d.max(1) as usize - 1);
            scale_note(scale, octave, index)
        }
        DegreeToken::Octave => scale_note(scale, octave, chord.degree) + 12,
    }
}

/// Chord tones stacked upward from the chord root at `octave`.
pub fn chord_notes(chord: &Chord, scale: &ScaleInstance, octave: i32) -> [i32; 3] {
    let root = scale_note(scale, octave, chord.degree);
    chord
        .pitches
        .map(|p| root + chord.root_pitch.interval_to(p) as i32)
}

pub struct Scheduler {
    config: SequencerConfig,
    patterns: PatternBank,
    state: SchedulerState,
    play_state: PlayState,
    timer: LookaheadTimer,
    lookahead: f64,
    pending_preset: Option<Preset>,
    scale: ScaleInstance,
    chords: Vec<Chord>,
    current_chord: Option<Chord>,
}

impl Scheduler {
    pub fn new(config: SequencerConfig, patterns: PatternBank) -> Self {
        let config = config.normalized();
        let scale = ScaleInstance::new(config.key, ScaleKind::from_key(&config.scale));
        let chords = diatonic_chords(config.key, &config.scale);
        Self {
            state: SchedulerState::new(config.bpm),
            config,
            patterns,
            play_state: PlayState::Stopped,
            timer: LookaheadTimer::default(),
            lookahead: DEFAULT_LOOKAHEAD,
            pending_preset: None,
            scale,
            chords,
            current_chord: None,
        }
    }

    /// Override the lookahead window and timer period.
    pub fn with_timing(mut self, lookahead: f64, interval: Duration) -> Self {
        self.lookahead = lookahead.max(0.001);
        self.timer = LookaheadTimer::new(interval);
        self
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Replace the configuration. Takes effect from the next dispatched step.
    pub fn set_config(&mut self, config: SequencerConfig) {
        let config = config.normalized();
        if config.key != self.config.key || config.scale != self.config.scale {
            self.scale = ScaleInstance::new(config.key, ScaleKind::from_key(&config.scale));
            self.chords = diatonic_chords(config.key, &config.scale);
        }
        self.state.bpm = config.bpm;
        self.config = config;
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        let config = SequencerConfig {
            bpm,
            ..self.config.clone()
        };
        self.set_config(config);
        tracing::info!(bpm = self.config.bpm, "tempo changed");
    }

    pub fn set_swing(&mut self, swing: f64) {
        let config = SequencerConfig {
            swing,
            ..self.config.clone()
        };
        self.set_config(config);
    }

    pub fn patterns(&self) -> &PatternBank {
        &self.patterns
    }

    pub fn patterns_mut(&mut self) -> &mut PatternBank {
        &mut self.patterns
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.play_state == PlayState::Running
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn timer(&self) -> &LookaheadTimer {
        &self.timer
    }

    /// Diatonic chords of the current key.
    pub fn chords(&self) -> &[Chord] {
        &self.chords
    }

    /// Chord of the bar being played.
    pub fn current_chord(&self) -> Option<&Chord> {
        self.current_chord.as_ref()
    }

    pub fn progression_length(&self) -> usize {
        self.patterns
            .progressions
            .resolve(&self.config.patterns.progression)
            .len()
            .max(1)
    }

    /// Queue a preset for the next bar start.
    pub fn queue_preset(&mut self, preset: Preset) {
        self.pending_preset = Some(preset);
    }

    pub fn pending_preset(&self) -> Option<&Preset> {
        self.pending_preset.as_ref()
    }

    /// Start from bar one at audio time `now`.
    pub fn start(&mut self, now: f64) {
        self.state.reset(now);
        self.state.bpm = self.config.bpm;
        self.current_chord = None;
        self.play_state = PlayState::Running;
        self.timer.arm(Instant::now());
        tracing::info!(now, bpm = self.config.bpm, "scheduler started");
    }

    /// Stop: cancel the timer, silence the engine, then tell listeners.
    pub fn stop(&mut self, engine: &mut AudioEngine, listeners: &mut [&mut dyn StepListener]) {
        self.timer.cancel();
        if self.play_state == PlayState::Stopped {
            return;
        }
        self.play_state = PlayState::Stopped;
        self.pending_preset = None;
        self.current_chord = None;
        engine.stop_all_sounds();
        for listener in listeners.iter_mut() {
            listener.on_chord_change(None);
        }
        for listener in listeners.iter_mut() {
            listener.on_stop(engine);
        }
        tracing::info!("scheduler stopped");
    }

    /// Whether the host should run a tick now.
    pub fn poll_timer(&mut self, now: Instant) -> bool {
        self.timer.poll(now)
    }

    /// Dispatch every step that falls within the lookahead window.
    /// Returns how many steps were dispatched.
    pub fn tick(
        &mut self,
        engine: &mut AudioEngine,
        listeners: &mut [&mut dyn StepListener],
    ) -> usize {
        if !self.is_running() {
            return 0;
        }
        let horizon = engine.current_time() + self.lookahead;
        let mut dispatched = 0;
        while self.state.next_event_time < horizon {
            let step = self.state.current_step;
            let time = self.state.next_event_time;
            self.dispatch(step, time, engine, listeners);
            // The step just played sets the distance to the next one.
            let duration = self.config.step_duration(step);
            self.state.current_step = (step + 1) % STEPS_PER_BAR;
            self.state.next_event_time = time + duration;
            dispatched += 1;
        }
        dispatched
    }

    fn apply_pending_preset(&mut self, engine: &mut AudioEngine, time: f64) {
        let Some(preset) = self.pending_preset.take() else {
            return;
        };
        self.set_config(preset.sequencer.clone());
        engine.mixer.apply_settings(&preset.mixer, time);
        self.state.progression_index = None;
        tracing::info!(preset = %preset.name, time, "preset applied");
    }

    fn dispatch(
        &mut self,
        step: usize,
        time: f64,
        engine: &mut AudioEngine,
        listeners: &mut [&mut dyn StepListener],
    ) {
        if step == 0 {
            self.apply_pending_preset(engine, time);
            self.begin_bar(time, listeners);
        }

        let Some(chord) = self.current_chord.clone() else {
            return;
        };
        let step_duration = self.config.step_duration(step);
        let config = &self.config;

        let drums = self.patterns.drums.resolve(&config.patterns.drums);
        for voice in drums.hits(step) {
            engine.voices.trigger_drum(voice, time, DRUM_VELOCITY);
        }

        let metronome = &config.metronome;
        let subdivision = metronome.subdivision.max(1);
        if metronome.enabled && step % subdivision == 0 {
            engine.voices.click(time, step == 0, metronome.volume);
        }

        let mut notes = Vec::new();
        let rhythm = self.patterns.rhythms.resolve(&config.patterns.rhythm);
        if rhythm[step] {
            let track = &config.tracks.chords;
            let duration = track.gate * step_duration;
            let midis = chord_notes(&chord, &self.scale, track.octave)
                .map(|m| apply_drop(m, &self.scale, track.octave, track.drop));
            let frequencies = midis.map(midi_to_frequency);
            engine.voices.play_strum(
                &frequencies,
                time,
                &track.instrument,
                step,
                Some(duration),
                TrackId::Chords,
            );
            for (midi, frequency) in midis.into_iter().zip(frequencies) {
                notes.push(NoteEvent {
                    track: TrackId::Chords,
                    midi,
                    frequency,
                    time,
                    duration,
                });
            }
        }

        for lane in Lane::ALL {
            let (name, track) = match lane {
                Lane::Bass => (&config.patterns.bass, &config.tracks.bass),
                Lane::Lead => (&config.patterns.lead, &config.tracks.lead),
                Lane::Sample => (&config.patterns.sample, &config.tracks.sample),
            };
            let Some(token) = self.patterns.degrees.resolve(name)[step] else {
                continue;
            };
            let midi = apply_drop(
                degree_note(token, &chord, &self.scale, track.octave),
                &self.scale,
                track.octave,
                track.drop,
            );
            let frequency = midi_to_frequency(midi);
            let duration = track.gate * step_duration;
            engine.voices.start_note(
                frequency,
                None,
                &track.instrument,
                time,
                Some(duration),
                lane.track(),
            );
            notes.push(NoteEvent {
                track: lane.track(),
                midi,
                frequency,
                time,
                duration,
            });
        }

        for note in &notes {
            tracing::debug!(track = %note.track, midi = note.midi, time = note.time, "note scheduled");
            for listener in listeners.iter_mut() {
                listener.on_note(note);
            }
        }

        let event = StepEvent {
            step,
            progression_index: self.state.progression_index.unwrap_or(0),
            progression_length: self.progression_length(),
            cycle_count: self.state.cycle_count,
            time,
            step_duration,
            bar_duration: self.config.bar_duration(),
        };
        let mut ctx = StepContext::new(engine, &mut self.pending_preset);
        for listener in listeners.iter_mut() {
            listener.on_step(&event, &mut ctx);
        }
    }

    /// Advance the progression and announce the bar's chord.
    fn begin_bar(&mut self, time: f64, listeners: &mut [&mut dyn StepListener]) {
        let progression = self
            .patterns
            .progressions
            .resolve(&self.config.patterns.progression);
        if !self
            .patterns
            .progressions
            .contains(&self.config.patterns.progression)
        {
            tracing::warn!(
                progression = %self.config.patterns.progression,
                "unknown progression, using default"
            );
        }
        let length = progression.len().max(1);
        let index = self.state.advance_progression(length);
        let degree = progression.get(index).copied().unwrap_or(0);
        let Some(chord) = self.chords.get(degree % self.chords.len().max(1)).cloned() else {
            self.current_chord = None;
            return;
        };

        let change = ChordChange {
            chord: chord.clone(),
            progression_index: index,
            progression_length: length,
            cycle_count: self.state.cycle_count,
            time,
        };
        tracing::debug!(chord = %chord, index, cycle = self.state.cycle_count, time, "bar started");
        self.current_chord = Some(chord);
        for listener in listeners.iter_mut() {
            listener.on_chord_change(Some(&change));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theory::PitchClass;

    const SR: u32 = 8000;

    fn setup(config: SequencerConfig) -> (Scheduler, AudioEngine) {
        (
            Scheduler::new(config, PatternBank::builtin()),
            AudioEngine::new(SR, 30, 1),
        )
    }

    /// Run the scheduler with the engine rendering `seconds` of audio.
    fn run(scheduler: &mut Scheduler, engine: &mut AudioEngine, log: &mut EventLog, seconds: f64) {
        let blocks = (seconds * SR as f64 / 200.0).ceil() as usize;
        for _ in 0..blocks {
            scheduler.tick(engine, &mut [&mut *log]);
            engine.render_mono(200);
        }
    }

    #[test]
    fn degree_resolution_follows_chord() {
        let scale = ScaleInstance::new(PitchClass::C, ScaleKind::Major);
        let chords = diatonic_chords(PitchClass::C, "major");
        let g = &chords[4];
        // Degree 1 on V is G3, degree 3 is B3, degree 5 wraps to D4.
        assert_eq!(degree_note(DegreeToken::Degree(1), g, &scale, 3), 55);
        assert_eq!(degree_note(DegreeToken::Degree(3), g, &scale, 3), 59);
        assert_eq!(degree_note(DegreeToken::Degree(5), g, &scale, 3), 62);
        assert_eq!(degree_note(DegreeToken::Octave, g, &scale, 3), 67);
        assert_eq!(chord_notes(g, &scale, 3), [55, 59, 62]);
    }

    #[test]
    fn drop_compares_against_key_root() {
        let scale = ScaleInstance::new(PitchClass::C, ScaleKind::Major);
        assert_eq!(apply_drop(55, &scale, 3, true), 43);
        assert_eq!(apply_drop(48, &scale, 3, true), 48);
        assert_eq!(apply_drop(55, &scale, 3, false), 55);
    }

    #[test]
    fn tick_fills_only_the_lookahead_window() {
        let (mut scheduler, mut engine) = setup(SequencerConfig::default());
        let mut log = EventLog::new();
        scheduler.start(0.0);
        // 0.15 s steps with a 0.1 s window: only step 0 is due.
        assert_eq!(scheduler.tick(&mut engine, &mut [&mut log]), 1);
        assert_eq!(scheduler.tick(&mut engine, &mut [&mut log]), 0);
        assert_eq!(scheduler.state().current_step, 1);
    }

    #[test]
    fn stopped_scheduler_does_nothing() {
        let (mut scheduler, mut engine) = setup(SequencerConfig::default());
        let mut log = EventLog::new();
        assert_eq!(scheduler.tick(&mut engine, &mut [&mut log]), 0);
        assert!(log.events().is_empty());
    }

    #[test]
    fn progression_wraps_after_four_bars() {
        let (mut scheduler, mut engine) = setup(SequencerConfig::default());
        let mut log = EventLog::new();
        scheduler.start(0.0);
        // Four bars at 100 BPM last 9.6 s; run into the fifth bar.
        run(&mut scheduler, &mut engine, &mut log, 9.7);

        let changes: Vec<_> = log.chord_changes().collect();
        assert_eq!(changes.len(), 5);
        let names: Vec<&str> = changes.iter().map(|c| c.chord.name.as_str()).collect();
        assert_eq!(names, vec!["C", "G", "Am", "F", "C"]);
        assert_eq!(changes[4].progression_index, 0);
        assert_eq!(changes[4].cycle_count, 1);
        assert_eq!(changes[3].cycle_count, 0);
    }

    #[test]
    fn step_times_strictly_increase() {
        for bpm in [40.0, 97.0, 140.0, 200.0] {
            for swing in [0.0, 0.4] {
                let config = SequencerConfig {
                    bpm,
                    swing,
                    ..SequencerConfig::default()
                };
                let (mut scheduler, mut engine) = setup(config.clone());
                let mut log = EventLog::new();
                scheduler.start(0.0);
                run(&mut scheduler, &mut engine, &mut log, 3.0);
                let steps: Vec<_> = log.steps().copied().collect();
                assert!(steps.len() > 8);
                for pair in steps.windows(2) {
                    let expected = config.step_duration(pair[0].step);
                    assert!(pair[1].time > pair[0].time);
                    assert!((pair[1].time - pair[0].time - expected).abs() < 1e-9);
                    assert_eq!(pair[1].step, (pair[0].step + 1) % 16);
                }
            }
        }
    }

    #[test]
    fn chord_change_precedes_notes_and_step() {
        let (mut scheduler, mut engine) = setup(SequencerConfig::default());
        let mut log = EventLog::new();
        scheduler.start(0.0);
        scheduler.tick(&mut engine, &mut [&mut log]);
        let events = log.events();
        assert!(matches!(events[0], SchedulerEvent::ChordChanged(_)));
        assert!(matches!(events.last(), Some(SchedulerEvent::Step(_))));
        assert!(log.notes().count() >= 3);
    }

    #[test]
    fn unknown_names_fall_back() {
        let mut config = SequencerConfig::default();
        config.patterns.progression = "Nope".to_string();
        config.patterns.rhythm = "Nope".to_string();
        config.patterns.bass = "Nope".to_string();
        let (mut scheduler, mut engine) = setup(config);
        let mut log = EventLog::new();
        scheduler.start(0.0);
        run(&mut scheduler, &mut engine, &mut log, 2.5);
        let names: Vec<&str> = log.chord_changes().map(|c| c.chord.name.as_str()).collect();
        assert_eq!(names, vec!["C", "G"]);
        // Empty rhythm and bass patterns play nothing pitched.
        assert!(log
            .notes()
            .all(|n| n.track != TrackId::Chords && n.track != TrackId::Bass));
    }

    #[test]
    fn queued_preset_applies_at_bar_start() {
        let (mut scheduler, mut engine) = setup(SequencerConfig::default());
        let mut log = EventLog::new();
        scheduler.start(0.0);
        run(&mut scheduler, &mut engine, &mut log, 1.0);

        let mut preset = Preset::default();
        preset.sequencer.bpm = 120.0;
        preset.sequencer.key = PitchClass::G;
        scheduler.queue_preset(preset);
        assert_eq!(scheduler.config().bpm, 100.0);

        run(&mut scheduler, &mut engine, &mut log, 2.0);
        assert_eq!(scheduler.config().bpm, 120.0);
        assert!(scheduler.pending_preset().is_none());
        let last = log.chord_changes().last().unwrap();
        assert_eq!(last.chord.name, "G");
        assert_eq!(last.progression_index, 0);
    }

    #[test]
    fn stop_notifies_in_order() {
        let (mut scheduler, mut engine) = setup(SequencerConfig::default());
        let mut log = EventLog::new();
        scheduler.start(0.0);
        scheduler.tick(&mut engine, &mut [&mut log]);
        log.clear();
        scheduler.stop(&mut engine, &mut [&mut log]);
        assert_eq!(
            log.events(),
            &[SchedulerEvent::ChordCleared, SchedulerEvent::Stopped]
        );
        assert!(!scheduler.timer().is_armed());
        assert!(!scheduler.is_running());
    }
}
