//! Parameter automation: timestamped value events and one-pole smoothing.
//!
//! [`AudioParam`] holds a sorted list of automation events evaluated against
//! the audio clock in seconds. It supports the subset the voice engine and
//! master bus need: set, linear ramp, exponential approach and cancellation.
//! [`SmoothedParam`] is the per-sample follower behind mixer controls.

/// One automation event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Automation {
    /// Jump to `value` at `time`.
    SetValue { time: f64, value: f32 },
    /// Ramp linearly from the previous event's value, reaching `value` at `time`.
    LinearRamp { time: f64, value: f32 },
    /// Approach `target` exponentially from `time` with `time_constant` seconds.
    SetTarget {
        time: f64,
        target: f32,
        time_constant: f64,
    },
}

impl Automation {
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. }
            | Automation::LinearRamp { time, .. }
            | Automation::SetTarget { time, .. } => time,
        }
    }
}

/// A scheduled, sample-accurate parameter.
#[derive(Debug, Clone)]
pub struct AudioParam {
    initial: f32,
    events: Vec<Automation>,
}

impl AudioParam {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    /// Insert an event, keeping the list ordered by time. Events at equal
    /// times keep insertion order.
    fn insert(&mut self, event: Automation) {
        let time = event.time();
        let at = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(at, event);
    }

    pub fn set_value_at(&mut self, value: f32, time: f64) {
        self.insert(Automation::SetValue { time, value });
    }

    pub fn linear_ramp_to(&mut self, value: f32, end_time: f64) {
        self.insert(Automation::LinearRamp {
            time: end_time,
            value,
        });
    }

    pub fn set_target_at(&mut self, target: f32, start_time: f64, time_constant: f64) {
        self.insert(Automation::SetTarget {
            time: start_time,
            target,
            time_constant: time_constant.max(1e-6),
        });
    }

    /// Drop every event at or after `time`.
    pub fn cancel_scheduled(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Drop every event at or after `time` and pin the value the param had
    /// at that moment, so later ramps start from where the sound actually is.
    pub fn cancel_and_hold(&mut self, time: f64) -> f32 {
        let held = self.value_at(time);
        self.cancel_scheduled(time);
        self.set_value_at(held, time);
        held
    }

    /// Collapse history before `time` into the initial value.
    pub fn prune(&mut self, time: f64) {
        let settled = self
            .events
            .iter()
            .take_while(|e| e.time() <= time)
            .count();
        // A SetTarget keeps moving until the next event, so keep it.
        if settled == self.events.len()
            && !matches!(self.events.last(), Some(Automation::SetTarget { .. }))
        {
            self.initial = self.value_at(time);
            self.events.clear();
        }
    }

    pub fn events(&self) -> &[Automation] {
        &self.events
    }

    /// Time of the last scheduled event, if any.
    pub fn last_event_time(&self) -> Option<f64> {
        self.events.last().map(Automation::time)
    }

    /// Evaluate the automation curve at `t` seconds.
    pub fn value_at(&self, t: f64) -> f32 {
        let mut value = self.initial;
        let mut last_time = f64::NEG_INFINITY;

        for (i, event) in self.events.iter().enumerate() {
            match *event {
                Automation::SetValue { time, value: v } => {
                    if time > t {
                        break;
                    }
                    value = v;
                    last_time = time;
                }
                Automation::LinearRamp { time, value: v } => {
                    if time <= t {
                        value = v;
                        last_time = time;
                        continue;
                    }
                    if !last_time.is_finite() || time <= last_time {
                        return value;
                    }
                    let frac = ((t - last_time) / (time - last_time)) as f32;
                    return value + (v - value) * frac;
                }
                Automation::SetTarget {
                    time,
                    target,
                    time_constant,
                } => {
                    if time > t {
                        break;
                    }
                    let until = self.events.get(i + 1).map(Automation::time);
                    match until {
                        Some(next) if next <= t => {
                            let k = (-(next - time) / time_constant).exp() as f32;
                            value = target + (value - target) * k;
                            last_time = next;
                        }
                        _ => {
                            let k = (-(t - time) / time_constant).exp() as f32;
                            return target + (value - target) * k;
                        }
                    }
                }
            }
        }
        value
    }
}

/// One-pole follower that turns control changes into per-sample ramps.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
}

impl SmoothedParam {
    /// Mixer controls glide with this time constant.
    pub const DEFAULT_TIME_CONSTANT: f64 = 0.03;

    pub fn new(value: f32, time_constant: f64, sample_rate: u32) -> Self {
        let samples = (time_constant * sample_rate as f64).max(1.0);
        Self {
            current: value,
            target: value,
            coeff: (1.0 - (-1.0 / samples).exp()) as f32,
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    /// Jump straight to `value` with no glide.
    pub fn snap(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() < 1e-5
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn next_value(&mut self) -> f32 {
        self.current += (self.target - self.current) * self.coeff;
        if self.is_settled() {
            self.current = self.target;
        }
        self.current
    }
}
