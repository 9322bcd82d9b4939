//! Scheduler notifications: the listener trait and the events it receives.

use crate::audio::AudioEngine;
use crate::mixer::TrackId;
use crate::preset::Preset;
use crate::theory::Chord;

/// A new bar started on `chord`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordChange {
    pub chord: Chord,
    pub progression_index: usize,
    pub progression_length: usize,
    pub cycle_count: u64,
    pub time: f64,
}

/// One dispatched step, exactly as the scheduler saw it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub step: usize,
    pub progression_index: usize,
    pub progression_length: usize,
    pub cycle_count: u64,
    /// Audio-clock time of the step.
    pub time: f64,
    /// Length of this step.
    pub step_duration: f64,
    /// Length of one straight bar at the current tempo.
    pub bar_duration: f64,
}

impl StepEvent {
    /// First step of the progression: where loops start and end.
    pub fn is_loop_boundary(&self) -> bool {
        self.step == 0 && self.progression_index == 0
    }

    /// Last step of the last bar of the progression.
    pub fn is_cycle_end(&self) -> bool {
        self.step == crate::pattern::STEPS_PER_BAR - 1
            && self.progression_index + 1 >= self.progression_length
    }

    /// Length of one pass through the progression.
    pub fn loop_duration(&self) -> f64 {
        self.bar_duration * self.progression_length as f64
    }
}

/// A pitched note the scheduler started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub track: TrackId,
    pub midi: i32,
    pub frequency: f64,
    pub time: f64,
    pub duration: f64,
}

/// What a listener may touch during a step.
pub struct StepContext<'a> {
    pub engine: &'a mut AudioEngine,
    pending_preset: &'a mut Option<Preset>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(engine: &'a mut AudioEngine, pending_preset: &'a mut Option<Preset>) -> Self {
        Self {
            engine,
            pending_preset,
        }
    }

    /// Ask for `preset` to take over at the next bar start.
    pub fn queue_preset(&mut self, preset: Preset) {
        *self.pending_preset = Some(preset);
    }

    pub fn has_pending_preset(&self) -> bool {
        self.pending_preset.is_some()
    }
}

/// Receives scheduler notifications. Every method defaults to doing nothing.
pub trait StepListener {
    /// A bar started on a new chord, or `None` when the scheduler stopped.
    fn on_chord_change(&mut self, _change: Option<&ChordChange>) {}

    /// Called after all audio for the step has been scheduled.
    fn on_step(&mut self, _event: &StepEvent, _ctx: &mut StepContext<'_>) {}

    fn on_note(&mut self, _note: &NoteEvent) {}

    /// The scheduler stopped and the engine has been silenced.
    fn on_stop(&mut self, _engine: &mut AudioEngine) {}
}

/// Everything a scheduler can report, as plain data.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    ChordChanged(ChordChange),
    ChordCleared,
    Step(StepEvent),
    Note(NoteEvent),
    Stopped,
}

/// Listener that records every notification in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<SchedulerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SchedulerEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<SchedulerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepEvent> {
        self.events.iter().filter_map(|e| match e {
            SchedulerEvent::Step(step) => Some(step),
            _ => None,
        })
    }

    pub fn chord_changes(&self) -> impl Iterator<Item = &ChordChange> {
        self.events.iter().filter_map(|e| match e {
            SchedulerEvent::ChordChanged(change) => Some(change),
            _ => None,
        })
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.events.iter().filter_map(|e| match e {
            SchedulerEvent::Note(note) => Some(note),
            _ => None,
        })
    }
}

impl StepListener for EventLog {
    fn on_chord_change(&mut self, change: Option<&ChordChange>) {
        self.events.push(match change {
            Some(change) => SchedulerEvent::ChordChanged(change.clone()),
            None => SchedulerEvent::ChordCleared,
        });
    }

    fn on_step(&mut self, event: &StepEvent, _ctx: &mut StepContext<'_>) {
        self.events.push(SchedulerEvent::Step(*event));
    }

    fn on_note(&mut self, note: &NoteEvent) {
        self.events.push(SchedulerEvent::Note(*note));
    }

    fn on_stop(&mut self, _engine: &mut AudioEngine) {
        self.events.push(SchedulerEvent::Stopped);
    }
}
