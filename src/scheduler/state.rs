//! Transport state: run/stop and the position of the next step to dispatch.

/// Whether the scheduler is dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Running,
}

/// Position of the sequencer. Reset on every start.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerState {
    pub bpm: f64,
    /// Next step to dispatch (0..16).
    pub current_step: usize,
    /// Audio-clock time of that step.
    pub next_event_time: f64,
    /// Completed passes through the progression.
    pub cycle_count: u64,
    /// Current bar's position in the progression; `None` before the first bar.
    pub progression_index: Option<usize>,
}

impl SchedulerState {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm,
            current_step: 0,
            next_event_time: 0.0,
            cycle_count: 0,
            progression_index: None,
        }
    }

    /// Rewind to bar one, step zero, dispatching from `now`.
    pub fn reset(&mut self, now: f64) {
        self.current_step = 0;
        self.next_event_time = now;
        self.cycle_count = 0;
        self.progression_index = None;
    }

    /// Move to the bar that follows in a progression of `length` bars.
    /// Wrapping to the start counts a completed cycle.
    pub fn advance_progression(&mut self, length: usize) -> usize {
        let length = length.max(1);
        let next = match self.progression_index {
            None => 0,
            Some(i) if i + 1 >= length => {
                self.cycle_count += 1;
                0
            }
            Some(i) => i + 1,
        };
        self.progression_index = Some(next);
        next
    }
}
