//! The workstation: owns the engine, scheduler, looper and song, and drives
//! them from one host loop.

use std::io;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use crate::audio::{AudioBuffer, AudioEngine, InputSource};
use crate::config::EngineConfig;
use crate::instrument::DEFAULT_INSTRUMENT;
use crate::looper::{LooperEngine, LooperError, LooperEvent};
use crate::midi::{MidiConfig, MidiEvent, MidiInput};
use crate::mixer::TrackId;
use crate::pattern::{CustomPatterns, PatternBank};
use crate::preset::Preset;
use crate::scheduler::{EventLog, Scheduler, SchedulerEvent, SequencerConfig, StepListener};
use crate::song::SongArrangement;
use crate::theory::midi_to_frequency;
use crate::voice::VoiceHandle;

/// Track that keyboard and MIDI notes play on.
pub const KEYBOARD_TRACK: TrackId = TrackId::Lead;

pub struct Workstation {
    engine: AudioEngine,
    scheduler: Scheduler,
    looper: LooperEngine,
    song: SongArrangement,
    listeners: Vec<Box<dyn StepListener>>,
    event_log: Option<EventLog>,
    midi: Option<Receiver<MidiEvent>>,
    keyboard_instrument: String,
}

impl Workstation {
    pub fn new(config: &EngineConfig, sequencer: SequencerConfig, patterns: PatternBank) -> Self {
        let config = config.clone().sanitized();
        let scheduler = Scheduler::new(sequencer, patterns).with_timing(
            config.lookahead,
            Duration::from_millis(config.timer_interval_ms),
        );
        Self {
            engine: AudioEngine::from_config(&config),
            scheduler,
            looper: LooperEngine::new(config.looper_latency()),
            song: SongArrangement::default(),
            listeners: Vec::new(),
            event_log: None,
            midi: None,
            keyboard_instrument: DEFAULT_INSTRUMENT.to_string(),
        }
    }

    /// Default sequencer and built-in patterns.
    pub fn with_defaults(config: &EngineConfig) -> Self {
        Self::new(config, SequencerConfig::default(), PatternBank::builtin())
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn looper(&self) -> &LooperEngine {
        &self.looper
    }

    pub fn song(&self) -> &SongArrangement {
        &self.song
    }

    pub fn song_mut(&mut self) -> &mut SongArrangement {
        &mut self.song
    }

    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    /// Register a listener that sees every scheduler notification.
    pub fn add_listener(&mut self, listener: Box<dyn StepListener>) {
        self.listeners.push(listener);
    }

    /// Keep scheduler events for [`Self::take_events`].
    pub fn enable_event_log(&mut self) {
        self.event_log.get_or_insert_with(EventLog::new);
    }

    pub fn take_events(&mut self) -> Vec<SchedulerEvent> {
        self.event_log.as_mut().map(EventLog::take).unwrap_or_default()
    }

    pub fn merge_custom_patterns(&mut self, custom: CustomPatterns) {
        self.scheduler.patterns_mut().merge_custom(custom);
    }

    // --- Transport ---

    pub fn start(&mut self) {
        let now = self.engine.current_time();
        self.scheduler.start(now);
    }

    /// Load the song's first block and start playing from it.
    pub fn play_song(&mut self) -> bool {
        let Some(preset) = self.song.start() else {
            return false;
        };
        self.load_preset(&preset);
        self.start();
        true
    }

    pub fn stop(&mut self) {
        let mut listeners = collect_listeners(
            &mut self.looper,
            &mut self.song,
            &mut self.event_log,
            &mut self.listeners,
        );
        self.scheduler.stop(&mut self.engine, &mut listeners);
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// One host-loop iteration: apply MIDI, drain the microphone, dispatch
    /// due steps and collect looper results. Returns the steps dispatched.
    pub fn tick(&mut self) -> usize {
        self.drain_midi();
        self.engine.capture.pump();
        let dispatched = {
            let mut listeners = collect_listeners(
                &mut self.looper,
                &mut self.song,
                &mut self.event_log,
                &mut self.listeners,
            );
            self.scheduler.tick(&mut self.engine, &mut listeners)
        };
        self.looper.poll(&mut self.engine);
        dispatched
    }

    /// Run [`Self::tick`] when the lookahead timer is due.
    pub fn tick_if_due(&mut self, now: Instant) -> Option<usize> {
        self.scheduler.poll_timer(now).then(|| self.tick())
    }

    /// Render one interleaved output block.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        self.engine.render_block(out, channels);
    }

    /// Tick and render `seconds` of mono audio without a device.
    pub fn bounce(&mut self, seconds: f64, block_frames: usize) -> Vec<f32> {
        let block_frames = block_frames.max(1);
        let total = (seconds.max(0.0) * self.engine.sample_rate() as f64).round() as usize;
        let mut out = Vec::with_capacity(total);
        while out.len() < total {
            self.tick();
            let frames = block_frames.min(total - out.len());
            out.extend(self.engine.render_mono(frames));
        }
        out
    }

    // --- Presets ---

    /// Current sequencer, mixer and looper settings.
    pub fn snapshot_preset(&self, name: impl Into<String>) -> Preset {
        Preset {
            name: name.into(),
            sequencer: self.scheduler.config().clone(),
            mixer: self.engine.mixer.settings(),
            looper: self.looper.snapshot(),
        }
    }

    /// Apply a preset now. Mixer changes are smoothed.
    pub fn load_preset(&mut self, preset: &Preset) {
        let now = self.engine.current_time();
        self.scheduler.set_config(preset.sequencer.clone());
        self.engine.mixer.apply_settings(&preset.mixer, now);
        self.looper.apply_snapshot(&preset.looper, &mut self.engine);
        tracing::info!(preset = %preset.name, "preset loaded");
    }

    /// Apply a preset at the next bar start.
    pub fn queue_preset(&mut self, preset: Preset) {
        self.scheduler.queue_preset(preset);
    }

    // --- Keyboard and MIDI ---

    pub fn set_keyboard_instrument(&mut self, instrument: impl Into<String>) {
        self.keyboard_instrument = instrument.into();
    }

    /// Start a held note. Pressing the same key again restarts it.
    pub fn note_on(&mut self, midi: u8, instrument: Option<&str>) -> VoiceHandle {
        let now = self.engine.current_time();
        let instrument = instrument.unwrap_or(self.keyboard_instrument.as_str());
        self.engine.voices.start_note(
            midi_to_frequency(midi as i32),
            Some(&keyboard_key(midi)),
            instrument,
            now,
            None,
            KEYBOARD_TRACK,
        )
    }

    pub fn note_off(&mut self, midi: u8) {
        let now = self.engine.current_time();
        self.engine.voices.stop_note(&keyboard_key(midi), now);
    }

    /// Take MIDI events from `receiver` on every tick.
    pub fn attach_midi(&mut self, receiver: Receiver<MidiEvent>) {
        self.midi = Some(receiver);
    }

    /// Open the configured MIDI device. Keep the returned connection alive
    /// for as long as input is wanted.
    pub fn connect_midi(&mut self, config: &MidiConfig) -> io::Result<MidiInput> {
        let (sender, receiver) = mpsc::channel();
        let input = MidiInput::start(config, sender)?;
        self.keyboard_instrument = config.instrument.clone();
        self.attach_midi(receiver);
        Ok(input)
    }

    pub fn handle_midi(&mut self, event: MidiEvent) {
        match event {
            MidiEvent::NoteOn {
                note,
                velocity,
                instrument,
            } => {
                tracing::debug!(note, velocity, "MIDI note on");
                self.note_on(note, instrument.as_deref());
            }
            MidiEvent::NoteOff { note } => self.note_off(note),
            MidiEvent::TrackVolume { track, value } => {
                self.engine.mixer.set_track_volume(track, value)
            }
            MidiEvent::TrackBrightness { track, value } => {
                self.engine.mixer.set_track_filter_brightness(track, value)
            }
            MidiEvent::TrackReverb { track, value } => {
                self.engine.mixer.set_track_reverb_send(track, value)
            }
        }
    }

    fn drain_midi(&mut self) {
        let Some(receiver) = self.midi.take() else {
            return;
        };
        let mut connected = true;
        loop {
            match receiver.try_recv() {
                Ok(event) => self.handle_midi(event),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    tracing::warn!("MIDI input disconnected");
                    connected = false;
                    break;
                }
            }
        }
        if connected {
            self.midi = Some(receiver);
        }
    }

    // --- Looper ---

    pub fn attach_microphone(&mut self, input: Box<dyn InputSource>) {
        self.engine.capture.attach(input);
    }

    pub fn arm_loop(&mut self, bank: usize) -> Result<(), LooperError> {
        self.looper.arm(bank)
    }

    pub fn disarm_loop(&mut self, bank: usize) -> Result<(), LooperError> {
        self.looper.disarm(bank)
    }

    pub fn stop_loop_recording(&mut self, bank: usize) -> Result<(), LooperError> {
        self.looper.stop_recording(bank, &mut self.engine)
    }

    pub fn mute_loop(&mut self, bank: usize) -> Result<(), LooperError> {
        self.looper.mute(bank, &mut self.engine)
    }

    pub fn unmute_loop(&mut self, bank: usize) -> Result<(), LooperError> {
        self.looper.unmute(bank, &mut self.engine)
    }

    pub fn set_loop_volume(&mut self, bank: usize, volume: f32) -> Result<(), LooperError> {
        self.looper.set_volume(bank, volume, &mut self.engine)
    }

    pub fn clear_loop(&mut self, bank: usize) -> Result<(), LooperError> {
        self.looper.clear(bank, &mut self.engine)
    }

    pub fn load_loop(&mut self, bank: usize, buffer: AudioBuffer) -> Result<(), LooperError> {
        self.looper.load_buffer(bank, buffer)
    }

    pub fn calibrate_latency(&mut self) -> Result<(), LooperError> {
        self.looper.start_calibration(&mut self.engine)
    }

    pub fn take_looper_events(&mut self) -> Vec<LooperEvent> {
        self.looper.take_events()
    }
}

fn keyboard_key(midi: u8) -> String {
    format!("key-{midi}")
}

/// Everything that hears the scheduler, in notification order.
fn collect_listeners<'a>(
    looper: &'a mut LooperEngine,
    song: &'a mut SongArrangement,
    event_log: &'a mut Option<EventLog>,
    extra: &'a mut [Box<dyn StepListener>],
) -> Vec<&'a mut dyn StepListener> {
    let mut listeners: Vec<&'a mut dyn StepListener> = Vec::with_capacity(extra.len() + 3);
    if let Some(log) = event_log.as_mut() {
        listeners.push(log);
    }
    listeners.push(looper);
    listeners.push(song);
    for listener in extra.iter_mut() {
        listeners.push(listener.as_mut());
    }
    listeners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looper::BankStatus;
    use crate::song::{SongBlock, SongLayout};

    fn config() -> EngineConfig {
        EngineConfig {
            sample_rate: 8000,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn ticks_emit_events() {
        let mut ws = Workstation::with_defaults(&config());
        ws.enable_event_log();
        ws.start();
        ws.bounce(0.5, 200);
        let events = ws.take_events();
        assert!(matches!(events.first(), Some(SchedulerEvent::ChordChanged(_))));
        assert!(events.iter().any(|e| matches!(e, SchedulerEvent::Step(_))));

        ws.stop();
        assert_eq!(
            ws.take_events(),
            [SchedulerEvent::ChordCleared, SchedulerEvent::Stopped]
        );
    }

    #[test]
    fn keyboard_notes_are_keyed() {
        let mut ws = Workstation::with_defaults(&config());
        let first = ws.note_on(60, None);
        let again = ws.note_on(60, Some("lead"));
        ws.note_on(64, None);
        assert_ne!(first, again);
        assert_eq!(ws.engine().voices.keyed_count(), 2);

        ws.note_off(60);
        ws.note_off(60);
        assert_eq!(ws.engine().voices.keyed_count(), 1);
    }

    #[test]
    fn midi_events_drive_keyboard_and_mixer() {
        let mut ws = Workstation::with_defaults(&config());
        let (sender, receiver) = mpsc::channel();
        ws.attach_midi(receiver);
        sender
            .send(MidiEvent::NoteOn {
                note: 62,
                velocity: 0.5,
                instrument: None,
            })
            .unwrap();
        sender
            .send(MidiEvent::TrackVolume {
                track: TrackId::Bass,
                value: 0.25,
            })
            .unwrap();
        ws.tick();
        assert_eq!(ws.engine().voices.keyed_count(), 1);
        assert_eq!(ws.snapshot_preset("x").mixer.tracks[&TrackId::Bass].volume, 0.25);

        sender.send(MidiEvent::NoteOff { note: 62 }).unwrap();
        drop(sender);
        ws.tick();
        assert_eq!(ws.engine().voices.keyed_count(), 0);
    }

    #[test]
    fn preset_snapshot_round_trip() {
        let mut ws = Workstation::with_defaults(&config());
        ws.scheduler_mut().set_bpm(132.0);
        ws.set_loop_volume(1, 0.3).unwrap();
        let preset = ws.snapshot_preset("Saved");

        let mut other = Workstation::with_defaults(&config());
        other.load_preset(&preset);
        assert_eq!(other.scheduler().config().bpm, 132.0);
        assert_eq!(other.looper().bank(1).unwrap().volume(), 0.3);
        assert_eq!(other.snapshot_preset("Saved").sequencer, preset.sequencer);
    }

    #[test]
    fn play_song_loads_first_block() {
        let mut ws = Workstation::with_defaults(&config());
        assert!(!ws.play_song());

        let mut song = SongArrangement::new(SongLayout {
            blocks: vec![SongBlock::new("Verse", 2)],
            looping: false,
        });
        let mut verse = Preset::named("Verse", SequencerConfig::default());
        verse.sequencer.bpm = 90.0;
        song.insert_preset(verse);
        *ws.song_mut() = song;
        assert!(ws.play_song());
        assert!(ws.is_running());
        assert_eq!(ws.scheduler().config().bpm, 90.0);
    }

    #[test]
    fn loop_controls_reach_the_looper() {
        let mut ws = Workstation::with_defaults(&config());
        ws.load_loop(0, AudioBuffer::from_mono(vec![0.1; 800], 8000))
            .unwrap();
        assert_eq!(ws.looper().status(0), Some(BankStatus::Playing));
        ws.arm_loop(0).unwrap();
        ws.disarm_loop(0).unwrap();
        ws.mute_loop(0).unwrap();
        assert!(ws.looper().bank(0).unwrap().is_muted());
        ws.clear_loop(0).unwrap();
        assert_eq!(ws.looper().status(0), Some(BankStatus::Empty));
        assert!(ws.calibrate_latency().is_err());
    }
}
