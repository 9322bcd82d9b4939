//! Output callback: runs on the cpal audio thread.
//!
//! Drains queued blocks from the ring buffer into the device buffer and
//! counts the frames that actually reached the device, which is what the
//! core uses to keep its render position ahead of playback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use super::command::AudioCommand;

/// Consumed samples are compacted once the read position passes this.
const COMPACT_THRESHOLD: usize = 8192;

/// State owned by the audio thread.
pub struct OutputCallback {
    consumer: HeapCons<AudioCommand>,
    pending: Vec<f32>,
    read_pos: usize,
    volume: f32,
    channels: usize,
    frames_played: Arc<AtomicU64>,
    underruns: u64,
}

impl OutputCallback {
    pub fn new(
        consumer: HeapCons<AudioCommand>,
        channels: u16,
        frames_played: Arc<AtomicU64>,
    ) -> Self {
        Self {
            consumer,
            pending: Vec::new(),
            read_pos: 0,
            volume: 1.0,
            channels: channels.max(1) as usize,
            frames_played,
            underruns: 0,
        }
    }

    /// Fill `output` (interleaved) from the queued blocks.
    pub fn process(&mut self, output: &mut [f32]) {
        while let Some(cmd) = self.consumer.try_pop() {
            match cmd {
                AudioCommand::Block(data) => self.pending.extend_from_slice(&data),
                AudioCommand::SetVolume(v) => self.volume = v.clamp(0.0, 1.0),
                AudioCommand::Flush => {
                    self.pending.clear();
                    self.read_pos = 0;
                }
            }
        }

        let available = self.pending.len() - self.read_pos;
        // Whole frames only, so channels never drift.
        let copy_len = output.len().min(available) / self.channels * self.channels;
        for (out, &src) in output[..copy_len]
            .iter_mut()
            .zip(&self.pending[self.read_pos..self.read_pos + copy_len])
        {
            *out = src * self.volume;
        }
        self.read_pos += copy_len;
        if copy_len < output.len() {
            self.underruns += 1;
        }
        output[copy_len..].fill(0.0);

        // The clock advances with the device, silence included.
        self.frames_played
            .fetch_add((output.len() / self.channels) as u64, Ordering::Relaxed);

        if self.read_pos >= COMPACT_THRESHOLD {
            self.pending.drain(..self.read_pos);
            self.read_pos = 0;
        }
    }

    /// Callbacks that ran out of queued audio.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::{
        traits::{Producer, Split},
        HeapRb,
    };

    fn setup(channels: u16) -> (ringbuf::HeapProd<AudioCommand>, OutputCallback, Arc<AtomicU64>) {
        let (prod, cons) = HeapRb::<AudioCommand>::new(16).split();
        let played = Arc::new(AtomicU64::new(0));
        let callback = OutputCallback::new(cons, channels, Arc::clone(&played));
        (prod, callback, played)
    }

    #[test]
    fn silence_when_nothing_queued() {
        let (_prod, mut cb, played) = setup(2);
        let mut out = vec![9.0; 64];
        cb.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(played.load(Ordering::Relaxed), 32);
        assert_eq!(cb.underruns(), 1);
    }

    #[test]
    fn blocks_play_across_callbacks() {
        let (mut prod, mut cb, played) = setup(1);
        prod.try_push(AudioCommand::Block(vec![0.1, 0.2, 0.3])).unwrap();
        prod.try_push(AudioCommand::Block(vec![0.4, 0.5])).unwrap();

        let mut first = vec![0.0; 2];
        cb.process(&mut first);
        assert_eq!(first, vec![0.1, 0.2]);

        let mut second = vec![0.0; 4];
        cb.process(&mut second);
        assert_eq!(second, vec![0.3, 0.4, 0.5, 0.0]);
        assert_eq!(played.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn volume_is_clamped_and_applied() {
        let (mut prod, mut cb, _) = setup(1);
        prod.try_push(AudioCommand::SetVolume(2.0)).unwrap();
        prod.try_push(AudioCommand::Block(vec![0.8])).unwrap();
        prod.try_push(AudioCommand::SetVolume(0.5)).unwrap();
        prod.try_push(AudioCommand::Block(vec![0.8])).unwrap();
        let mut out = vec![0.0; 2];
        cb.process(&mut out);
        // Commands are drained before the copy, so the last volume wins.
        assert!((out[0] - 0.4).abs() < 1e-6);
        assert!((out[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn flush_discards_queue() {
        let (mut prod, mut cb, _) = setup(2);
        prod.try_push(AudioCommand::Block(vec![0.5; 64])).unwrap();
        prod.try_push(AudioCommand::Flush).unwrap();
        let mut out = vec![9.0; 16];
        cb.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn partial_frames_are_held_back() {
        let (mut prod, mut cb, _) = setup(2);
        prod.try_push(AudioCommand::Block(vec![0.1, 0.2, 0.3])).unwrap();
        let mut out = vec![9.0; 4];
        cb.process(&mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.0, 0.0]);
    }
}
