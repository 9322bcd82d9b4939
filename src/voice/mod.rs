//! Voice engine: per-note oscillator and sample voices routed into mixer tracks.
//!
//! Every note-on becomes a [`Voice`] with its own gain automation. Voices are
//! owned in one of three ways:
//!
//! - **keyed**: registered under a key (keyboard, MIDI) and released with
//!   [`VoiceEngine::stop_note`]
//! - **managed**: a collaborator holds the [`VoiceHandle`] (looper playback)
//! - **pooled**: fire-and-forget sequencer notes, subject to FIFO stealing
//!   once the pool reaches its ceiling

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use biquad::{Biquad, DirectForm2Transposed};

use crate::audio::buffer::AudioBuffer;
use crate::audio::param::AudioParam;
use crate::instrument::drum_synth::{self, CLICK, CLICK_ACCENT};
use crate::instrument::{
    instrument_table, InstrumentDef, InstrumentSource, InstrumentTable, Oscillator, SampleBank,
    Waveform,
};
use crate::mixer::track::lowpass;
use crate::mixer::{TrackBuses, TrackId};
use crate::pattern::DrumVoice;

/// Default ceiling for pooled voices.
pub const MAX_POOLED_VOICES: usize = 30;
/// Fade applied when a voice is stolen, force-stopped or cut.
pub const CUT_FADE: f64 = 0.005;
/// Release applied by [`VoiceEngine::stop_note`].
pub const NOTE_OFF_FADE: f64 = 0.1;
/// Delay between consecutive notes of a strum.
pub const STRUM_STAGGER: f64 = 0.03;
/// Playback-rate bounds for pitched samples.
pub const MIN_SAMPLE_RATE_RATIO: f64 = 0.1;
pub const MAX_SAMPLE_RATE_RATIO: f64 = 4.0;

/// Opaque reference to a running voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    Keyed,
    Managed,
    Pooled,
}

enum Source {
    Osc(Oscillator),
    Sample {
        buffer: Arc<AudioBuffer>,
        position: f64,
        rate: f64,
    },
}

impl Source {
    /// Next sample, or `None` once a sample source runs off its buffer.
    fn next_sample(&mut self) -> Option<f32> {
        match self {
            Source::Osc(osc) => Some(osc.next_sample()),
            Source::Sample {
                buffer,
                position,
                rate,
            } => {
                let index = *position as usize;
                if index >= buffer.frames() {
                    return None;
                }
                let frac = (*position - index as f64) as f32;
                let a = buffer.mono_sample(index);
                let b = if index + 1 < buffer.frames() {
                    buffer.mono_sample(index + 1)
                } else {
                    0.0
                };
                *position += *rate;
                Some(a + (b - a) * frac)
            }
        }
    }
}

struct Voice {
    id: u64,
    track: TrackId,
    start_time: f64,
    /// Time the voice falls silent; `None` while held.
    end_time: Option<f64>,
    ownership: Ownership,
    gain: AudioParam,
    source: Source,
    filter: Option<DirectForm2Transposed<f32>>,
}

impl Voice {
    /// Mix this voice into `out`, whose first frame sits at `block_start`.
    /// Returns `true` when the voice has finished.
    fn render(&mut self, block_start: f64, sample_rate: u32, out: &mut [f32]) -> bool {
        let dt = 1.0 / sample_rate as f64;
        for (i, slot) in out.iter_mut().enumerate() {
            let t = block_start + i as f64 * dt;
            if t < self.start_time {
                continue;
            }
            if self.end_time.is_some_and(|end| t >= end) {
                return true;
            }
            let Some(mut sample) = self.source.next_sample() else {
                return true;
            };
            if let Some(filter) = self.filter.as_mut() {
                sample = filter.run(sample);
            }
            *slot += sample * self.gain.value_at(t);
        }
        let block_end = block_start + out.len() as f64 * dt;
        self.end_time.is_some_and(|end| block_end >= end)
    }

    /// Fade to silence over `fade` seconds starting at `at`.
    fn fade_out(&mut self, at: f64, fade: f64) {
        let at = at.max(self.start_time);
        self.gain.cancel_and_hold(at);
        let end = at + fade;
        self.gain.linear_ramp_to(0.0, end);
        self.end_time = Some(self.end_time.map_or(end, |e| e.min(end)));
    }
}

/// Polyphonic voice allocator and renderer.
pub struct VoiceEngine {
    sample_rate: u32,
    max_pooled: usize,
    voices: Vec<Voice>,
    pooled: VecDeque<u64>,
    keyed: HashMap<String, u64>,
    instruments: InstrumentTable,
    samples: SampleBank,
    next_id: u64,
}

impl VoiceEngine {
    /// Create an engine with the built-in instruments and the synthetic kit.
    pub fn new(sample_rate: u32, max_pooled: usize, seed: u64) -> Self {
        Self {
            sample_rate,
            max_pooled: max_pooled.max(1),
            voices: Vec::new(),
            pooled: VecDeque::new(),
            keyed: HashMap::new(),
            instruments: instrument_table(),
            samples: drum_synth::build_kit(sample_rate, seed),
            next_id: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn instruments(&self) -> &InstrumentTable {
        &self.instruments
    }

    pub fn instruments_mut(&mut self) -> &mut InstrumentTable {
        &mut self.instruments
    }

    pub fn samples(&self) -> &SampleBank {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut SampleBank {
        &mut self.samples
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn voice_mut(&mut self, id: u64) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.id == id)
    }

    /// Steal the oldest pooled voices until there is room for one more.
    fn make_room(&mut self, at: f64) {
        while self.pooled.len() >= self.max_pooled {
            let Some(oldest) = self.pooled.pop_front() else {
                break;
            };
            if let Some(voice) = self.voice_mut(oldest) {
                voice.fade_out(at, CUT_FADE);
                tracing::trace!(voice = oldest, "pooled voice stolen");
            }
        }
    }

    fn build_source(&self, def: &InstrumentDef, frequency: f64) -> Source {
        match &def.source {
            InstrumentSource::Oscillator { waveform } => {
                Source::Osc(Oscillator::new(*waveform, frequency, self.sample_rate))
            }
            InstrumentSource::Sampler {
                sample,
                base_frequency,
            } => match self.samples.get(sample) {
                Some(buffer) => {
                    let pitch = (frequency / base_frequency.max(1e-6))
                        .clamp(MIN_SAMPLE_RATE_RATIO, MAX_SAMPLE_RATE_RATIO);
                    let rate = pitch * buffer.sample_rate() as f64 / self.sample_rate as f64;
                    Source::Sample {
                        buffer: Arc::clone(buffer),
                        position: 0.0,
                        rate,
                    }
                }
                None => {
                    tracing::warn!(sample = %sample, "sampler source missing, using sine");
                    Source::Osc(Oscillator::new(Waveform::Sine, frequency, self.sample_rate))
                }
            },
        }
    }

    /// Start a note.
    ///
    /// With a `voice_key`, any voice already registered under that key is
    /// cut first and the new voice takes its place; without one the voice
    /// is pooled. `duration: None` holds the note until [`Self::stop_note`].
    pub fn start_note(
        &mut self,
        frequency: f64,
        voice_key: Option<&str>,
        instrument: &str,
        start_time: f64,
        duration: Option<f64>,
        track: TrackId,
    ) -> VoiceHandle {
        let ownership = match voice_key {
            Some(key) => {
                if let Some(previous) = self.keyed.remove(key) {
                    if let Some(voice) = self.voice_mut(previous) {
                        voice.fade_out(start_time, CUT_FADE);
                    }
                }
                Ownership::Keyed
            }
            None => {
                self.make_room(start_time);
                Ownership::Pooled
            }
        };

        if !self.instruments.contains(instrument) {
            tracing::warn!(instrument, "unknown instrument, using default");
        }
        let def = self.instruments.resolve(instrument).clone();
        let source = self.build_source(&def, frequency);
        let filter = def.cutoff.and_then(|cutoff| {
            lowpass(self.sample_rate, cutoff)
                .ok()
                .map(DirectForm2Transposed::<f32>::new)
        });

        let mut gain = AudioParam::new(0.0);
        let end_time = def.envelope.schedule(&mut gain, start_time, def.peak, duration);

        let id = self.allocate_id();
        self.voices.push(Voice {
            id,
            track,
            start_time,
            end_time,
            ownership,
            gain,
            source,
            filter,
        });
        match voice_key {
            Some(key) => {
                self.keyed.insert(key.to_string(), id);
            }
            None => self.pooled.push_back(id),
        }
        tracing::trace!(id, frequency, instrument, start_time, "note started");
        VoiceHandle(id)
    }

    /// Release the voice registered under `voice_key`. Unknown keys are ignored.
    pub fn stop_note(&mut self, voice_key: &str, now: f64) {
        let Some(id) = self.keyed.remove(voice_key) else {
            return;
        };
        if let Some(voice) = self.voice_mut(id) {
            voice.fade_out(now, NOTE_OFF_FADE);
        }
    }

    /// Play a chord. Strummed instruments stagger the notes: even steps strum
    /// down (low → high), odd steps up.
    pub fn play_strum(
        &mut self,
        frequencies: &[f64],
        time: f64,
        instrument: &str,
        step: usize,
        duration: Option<f64>,
        track: TrackId,
    ) -> Vec<VoiceHandle> {
        let strummed = self.instruments.resolve(instrument).strummed;
        let mut ordered = frequencies.to_vec();
        ordered.sort_by(|a, b| a.total_cmp(b));
        if strummed && step % 2 == 1 {
            ordered.reverse();
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, freq)| {
                let offset = if strummed {
                    i as f64 * STRUM_STAGGER
                } else {
                    0.0
                };
                self.start_note(freq, None, instrument, time + offset, duration, track)
            })
            .collect()
    }

    /// Play a buffer once on `track`; the caller owns the returned handle.
    pub fn play_buffer(
        &mut self,
        buffer: Arc<AudioBuffer>,
        start: f64,
        gain: f32,
        track: TrackId,
    ) -> VoiceHandle {
        let rate = buffer.sample_rate() as f64 / self.sample_rate as f64;
        let mut param = AudioParam::new(0.0);
        param.set_value_at(gain, start);
        let id = self.allocate_id();
        self.voices.push(Voice {
            id,
            track,
            start_time: start,
            end_time: None,
            ownership: Ownership::Managed,
            gain: param,
            source: Source::Sample {
                buffer,
                position: 0.0,
                rate,
            },
            filter: None,
        });
        VoiceHandle(id)
    }

    /// Fire a pooled one-shot from the sample bank.
    pub fn play_sample(
        &mut self,
        name: &str,
        time: f64,
        gain: f32,
        track: TrackId,
    ) -> Option<VoiceHandle> {
        let Some(buffer) = self.samples.get(name).cloned() else {
            tracing::warn!(sample = name, "sample not in bank");
            return None;
        };
        self.make_room(time);
        let handle = self.play_buffer(buffer, time, gain, track);
        if let Some(voice) = self.voice_mut(handle.0) {
            voice.ownership = Ownership::Pooled;
        }
        self.pooled.push_back(handle.0);
        Some(handle)
    }

    /// One drum hit on the drums track.
    pub fn trigger_drum(&mut self, voice: DrumVoice, time: f64, velocity: f32) -> Option<VoiceHandle> {
        self.play_sample(
            voice.sample_name(),
            time,
            velocity.clamp(0.0, 1.0),
            TrackId::Drums,
        )
    }

    /// Metronome click on the samples track.
    pub fn click(&mut self, time: f64, accent: bool, volume: f32) -> Option<VoiceHandle> {
        let name = if accent { CLICK_ACCENT } else { CLICK };
        self.play_sample(name, time, volume.clamp(0.0, 1.0), TrackId::Samples)
    }

    /// Cut a voice with a short fade starting at `at`.
    pub fn stop_voice(&mut self, handle: VoiceHandle, at: f64) {
        if let Some(voice) = self.voice_mut(handle.0) {
            voice.fade_out(at, CUT_FADE);
        }
        self.pooled.retain(|&id| id != handle.0);
        self.keyed.retain(|_, id| *id != handle.0);
    }

    /// Glide a voice's gain to `gain` from `at`.
    pub fn set_voice_gain(&mut self, handle: VoiceHandle, gain: f32, at: f64) {
        if let Some(voice) = self.voice_mut(handle.0) {
            let at = at.max(voice.start_time);
            voice.gain.cancel_and_hold(at);
            voice.gain.linear_ramp_to(gain, at + CUT_FADE);
        }
    }

    /// Fade every voice out from `at` and forget every key.
    pub fn stop_all(&mut self, at: f64) {
        for voice in self.voices.iter_mut() {
            voice.fade_out(at, CUT_FADE);
        }
        self.pooled.clear();
        self.keyed.clear();
    }

    pub fn is_active(&self, handle: VoiceHandle) -> bool {
        self.voices.iter().any(|v| v.id == handle.0)
    }

    /// Voices still rendering, fading ones included.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Pooled voices counted against the ceiling.
    pub fn pooled_count(&self) -> usize {
        self.pooled.len()
    }

    pub fn keyed_count(&self) -> usize {
        self.keyed.len()
    }

    /// Voices of each ownership class: `(keyed, managed, pooled)`.
    pub fn ownership_counts(&self) -> (usize, usize, usize) {
        self.voices
            .iter()
            .fold((0, 0, 0), |(k, m, p), v| match v.ownership {
                Ownership::Keyed => (k + 1, m, p),
                Ownership::Managed => (k, m + 1, p),
                Ownership::Pooled => (k, m, p + 1),
            })
    }

    /// Mix every voice into its track bus for the block starting at
    /// `block_start` seconds, then drop finished voices.
    pub fn render(&mut self, block_start: f64, buses: &mut TrackBuses) {
        let sample_rate = self.sample_rate;
        let mut finished = Vec::new();
        for voice in self.voices.iter_mut() {
            if voice.render(block_start, sample_rate, buses.bus_mut(voice.track)) {
                finished.push(voice.id);
            }
        }
        if finished.is_empty() {
            return;
        }
        self.voices.retain(|v| !finished.contains(&v.id));
        self.pooled.retain(|id| !finished.contains(id));
        self.keyed.retain(|_, id| !finished.contains(id));
    }
}
