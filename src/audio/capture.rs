//! Microphone capture: one shared input, a single recording lease.
//!
//! The cpal input callback pushes samples into a lock-free ring buffer; the
//! core drains it with [`CaptureHub::pump`] during its tick. Every consumer
//! sees the input level, but only one may record at a time.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::buffer::AudioBuffer;
use super::AudioError;

/// Something the hub can drain input samples from.
pub trait InputSource {
    /// Move every available mono sample into `out`. Returns how many were added.
    fn drain_into(&mut self, out: &mut Vec<f32>) -> usize;
    fn sample_rate(&self) -> u32;
}

/// Input fed through a ring buffer, from a cpal stream or a test producer.
pub struct RingInput {
    consumer: HeapCons<f32>,
    sample_rate: u32,
    _stream: Option<cpal::Stream>,
}

impl RingInput {
    /// A detached input: push samples into the returned producer.
    pub fn channel(sample_rate: u32, capacity: usize) -> (HeapProd<f32>, Self) {
        let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1)).split();
        (
            producer,
            Self {
                consumer,
                sample_rate,
                _stream: None,
            },
        )
    }

    /// Open the default input device. Multi-channel input is averaged to mono.
    pub fn default_microphone() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels().max(1) as usize;

        // Two seconds of headroom between ticks.
        let (mut producer, consumer) = HeapRb::<f32>::new(sample_rate as usize * 2).split();
        let stream_config = cpal::StreamConfig {
            channels: config.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                        // Overflow drops samples rather than blocking the audio thread.
                        let _ = producer.try_push(mono);
                    }
                },
                |err: cpal::StreamError| tracing::error!(error = %err, "input stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        tracing::info!(sample_rate, channels, "microphone opened");

        Ok(Self {
            consumer,
            sample_rate,
            _stream: Some(stream),
        })
    }
}

impl InputSource for RingInput {
    fn drain_into(&mut self, out: &mut Vec<f32>) -> usize {
        let available = self.consumer.occupied_len();
        out.extend(self.consumer.pop_iter());
        available
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Capture failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No microphone attached to the hub.
    NoInput,
    /// Another consumer holds the recording lease.
    Busy,
    /// The lease does not match the active recording.
    NotRecording,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::NoInput => write!(f, "no input device attached"),
            CaptureError::Busy => write!(f, "microphone is already recording"),
            CaptureError::NotRecording => write!(f, "no recording for this lease"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Proof of ownership of the microphone recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingLease(u64);

/// A finished recording.
#[derive(Debug, Clone)]
pub struct CompletedCapture {
    pub lease: RecordingLease,
    /// Audio-clock time the recording was started.
    pub started_at: f64,
    pub buffer: AudioBuffer,
}

struct ActiveRecording {
    lease: RecordingLease,
    started_at: f64,
    capacity: usize,
    samples: Vec<f32>,
    /// Input samples to collect before completing, once a stop is requested.
    stop_after: Option<usize>,
}

/// The shared microphone.
pub struct CaptureHub {
    input: Option<Box<dyn InputSource>>,
    engine_rate: u32,
    active: Option<ActiveRecording>,
    completed: Vec<CompletedCapture>,
    level: f32,
    drained: u64,
    scratch: Vec<f32>,
    next_lease: u64,
}

impl CaptureHub {
    /// A hub with no input attached. Output of finished recordings is
    /// resampled to `engine_rate`.
    pub fn new(engine_rate: u32) -> Self {
        Self {
            input: None,
            engine_rate,
            active: None,
            completed: Vec::new(),
            level: 0.0,
            drained: 0,
            scratch: Vec::new(),
            next_lease: 0,
        }
    }

    pub fn attach(&mut self, input: Box<dyn InputSource>) {
        self.input = Some(input);
    }

    pub fn detach(&mut self) {
        self.input = None;
        self.active = None;
        self.level = 0.0;
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Whether `lease` is the recording still in progress.
    pub fn holds(&self, lease: RecordingLease) -> bool {
        self.active.as_ref().is_some_and(|a| a.lease == lease)
    }

    /// RMS of the most recently drained input chunk.
    pub fn input_level(&self) -> f32 {
        self.level
    }

    /// Input samples drained since the hub was created. The level only
    /// changes when this does.
    pub fn samples_drained(&self) -> u64 {
        self.drained
    }

    /// Begin recording at most `max_seconds` of input.
    pub fn start_recording(
        &mut self,
        max_seconds: f64,
        now: f64,
    ) -> Result<RecordingLease, CaptureError> {
        let input = self.input.as_ref().ok_or(CaptureError::NoInput)?;
        if self.active.is_some() {
            return Err(CaptureError::Busy);
        }
        let lease = RecordingLease(self.next_lease);
        self.next_lease += 1;
        let capacity = (max_seconds.max(0.0) * input.sample_rate() as f64).ceil() as usize;
        self.active = Some(ActiveRecording {
            lease,
            started_at: now,
            capacity,
            samples: Vec::with_capacity(capacity),
            stop_after: None,
        });
        tracing::debug!(lease = lease.0, max_seconds, "recording started");
        Ok(lease)
    }

    /// Request the recording to finish. The buffer becomes available from
    /// [`Self::take_completed`] after the next [`Self::pump`].
    pub fn stop_recording(&mut self, lease: RecordingLease) -> Result<(), CaptureError> {
        self.stop_recording_after(lease, 0.0)
    }

    /// Request the recording to finish once it holds `seconds` of input,
    /// counted from its start. Capped by the recording's capacity.
    pub fn stop_recording_after(
        &mut self,
        lease: RecordingLease,
        seconds: f64,
    ) -> Result<(), CaptureError> {
        let rate = self.input.as_ref().map_or(self.engine_rate, |i| i.sample_rate());
        match self.active.as_mut() {
            Some(active) if active.lease == lease => {
                let target = (seconds.max(0.0) * rate as f64).round() as usize;
                active.stop_after = Some(target.min(active.capacity));
                Ok(())
            }
            _ => Err(CaptureError::NotRecording),
        }
    }

    /// Abandon a recording without producing a buffer.
    pub fn cancel(&mut self, lease: RecordingLease) {
        if self.active.as_ref().is_some_and(|a| a.lease == lease) {
            self.active = None;
            tracing::debug!(lease = lease.0, "recording cancelled");
        }
        self.completed.retain(|c| c.lease != lease);
    }

    /// Drain the input, update the level and feed the active recording.
    pub fn pump(&mut self) {
        let Some(input) = self.input.as_mut() else {
            return;
        };
        self.scratch.clear();
        let drained = input.drain_into(&mut self.scratch);
        self.drained += drained as u64;
        if drained > 0 {
            let sum: f32 = self.scratch.iter().map(|s| s * s).sum();
            self.level = (sum / self.scratch.len() as f32).sqrt();
        }
        let input_rate = input.sample_rate();

        let Some(active) = self.active.as_mut() else {
            return;
        };
        let room = active.capacity.saturating_sub(active.samples.len());
        active
            .samples
            .extend(self.scratch.iter().take(room).copied());

        if active
            .stop_after
            .is_some_and(|target| active.samples.len() >= target)
        {
            if let Some(done) = self.active.take() {
                let buffer =
                    AudioBuffer::from_mono(done.samples, input_rate).resampled(self.engine_rate);
                tracing::debug!(lease = done.lease.0, frames = buffer.frames(), "recording completed");
                self.completed.push(CompletedCapture {
                    lease: done.lease,
                    started_at: done.started_at,
                    buffer,
                });
            }
        }
    }

    /// Collect the finished recording for `lease`, if it has completed.
    pub fn take_completed(&mut self, lease: RecordingLease) -> Option<CompletedCapture> {
        let index = self.completed.iter().position(|c| c.lease == lease)?;
        Some(self.completed.swap_remove(index))
    }
}
