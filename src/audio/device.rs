//! Output device: cpal stream fed through a lock-free queue.
//!
//! The core renders blocks on its own thread and pushes them here; the cpal
//! callback plays them and reports how many frames reached the device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Observer, Producer, Split},
    HeapRb,
};

use super::callback::OutputCallback;
use super::command::AudioCommand;
use super::AudioError;

/// Queue capacity in commands.
const QUEUE_CAPACITY: usize = 1024;

/// A running output stream.
pub struct OutputDevice {
    stream: cpal::Stream,
    producer: ringbuf::HeapProd<AudioCommand>,
    frames_played: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
}

impl OutputDevice {
    /// Open the default output device with its preferred configuration.
    pub fn open_default() -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceConfig(e.to_string()))?;
        Self::build(&device, config.sample_rate().0, config.channels())
    }

    /// Open the default output device at a fixed rate and channel count.
    pub fn open(sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;
        Self::build(&device, sample_rate, channels)
    }

    fn build(device: &cpal::Device, sample_rate: u32, channels: u16) -> Result<Self, AudioError> {
        let (producer, consumer) = HeapRb::<AudioCommand>::new(QUEUE_CAPACITY).split();
        let frames_played = Arc::new(AtomicU64::new(0));
        let mut callback = OutputCallback::new(consumer, channels, Arc::clone(&frames_played));

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback.process(data),
                |err: cpal::StreamError| tracing::error!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;
        tracing::info!(sample_rate, channels, "output device opened");

        Ok(Self {
            stream,
            producer,
            frames_played,
            sample_rate,
            channels,
        })
    }

    /// Queue one interleaved block.
    pub fn push_block(&mut self, block: Vec<f32>) -> Result<(), AudioError> {
        self.producer
            .try_push(AudioCommand::Block(block))
            .map_err(|_| AudioError::BufferFull)
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.producer
            .try_push(AudioCommand::SetVolume(volume))
            .map_err(|_| AudioError::BufferFull)
    }

    /// Drop queued audio that has not been played yet.
    pub fn flush(&mut self) -> Result<(), AudioError> {
        self.producer
            .try_push(AudioCommand::Flush)
            .map_err(|_| AudioError::BufferFull)
    }

    /// Frames the device has consumed since it was opened.
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    /// Commands waiting in the queue.
    pub fn queued_commands(&self) -> usize {
        self.producer.occupied_len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn pause(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))
    }

    pub fn resume(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires audio device; run manually with `cargo test -- --ignored`
    fn open_and_queue() {
        let mut device = OutputDevice::open_default().expect("no audio device");
        assert!(device.sample_rate() > 0);
        assert!(device.push_block(vec![0.0; 512 * device.channels() as usize]).is_ok());
        assert!(device.set_volume(0.5).is_ok());
        assert!(device.flush().is_ok());
    }

    #[test]
    #[ignore] // Requires audio device
    fn pause_and_resume() {
        let device = OutputDevice::open_default().expect("no audio device");
        assert!(device.pause().is_ok());
        assert!(device.resume().is_ok());
    }
}
