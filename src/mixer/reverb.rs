//! Convolution reverb: uniformly partitioned overlap-save FFT convolution.
//!
//! The impulse response is split into blocks of `PARTITION` samples, each
//! transformed once at construction. Every input block is transformed once,
//! pushed onto a frequency-domain delay line and multiplied against all IR
//! partitions, so the cost per block is one FFT, one IFFT and a
//! multiply-accumulate per partition. Latency is one partition.

use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Block size of the partitioned convolution.
pub const PARTITION: usize = 512;

/// Decaying-noise impulse response, normalized to unit energy.
pub fn synthetic_impulse_response(sample_rate: u32, seconds: f32, seed: u64) -> Vec<f32> {
    let len = ((sample_rate as f32 * seconds) as usize).max(1);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut ir: Vec<f32> = (0..len)
        .map(|i| {
            let norm = i as f32 / len as f32;
            // Roughly -60 dB at the tail.
            let env = (-norm * 6.9).exp();
            rng.gen_range(-1.0f32..1.0) * env
        })
        .collect();
    let energy = ir.iter().map(|s| s * s).sum::<f32>().sqrt();
    if energy > 0.0 {
        for s in ir.iter_mut() {
            *s /= energy;
        }
    }
    ir
}

pub struct ConvolutionReverb {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    ir_spectra: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain delay line, newest block at `fdl_head`.
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_head: usize,
    /// Previous and current input blocks, back to back.
    window: Vec<f32>,
    output: Vec<f32>,
    pos: usize,
    scratch: Vec<Complex<f32>>,
    accumulator: Vec<Complex<f32>>,
    /// Consecutive silent input blocks; once the whole tail has drained the
    /// convolution is skipped.
    silent_blocks: usize,
}

impl ConvolutionReverb {
    pub fn new(impulse_response: &[f32]) -> Self {
        let n = 2 * PARTITION;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);

        let partitions = impulse_response.len().div_ceil(PARTITION).max(1);
        let ir_spectra = (0..partitions)
            .map(|k| {
                let mut buf = vec![Complex::new(0.0, 0.0); n];
                for (slot, &s) in buf
                    .iter_mut()
                    .zip(impulse_response.iter().skip(k * PARTITION).take(PARTITION))
                {
                    *slot = Complex::new(s, 0.0);
                }
                fft.process(&mut buf);
                buf
            })
            .collect();

        Self {
            fft,
            ifft,
            ir_spectra,
            fdl: vec![vec![Complex::new(0.0, 0.0); n]; partitions],
            fdl_head: 0,
            window: vec![0.0; n],
            output: vec![0.0; PARTITION],
            pos: 0,
            scratch: vec![Complex::new(0.0, 0.0); n],
            accumulator: vec![Complex::new(0.0, 0.0); n],
            silent_blocks: partitions + 1,
        }
    }

    pub fn partitions(&self) -> usize {
        self.ir_spectra.len()
    }

    /// Convolve `input` into `output`. Both slices must have the same length;
    /// any length is accepted.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (&x, y) in input.iter().zip(output.iter_mut()) {
            self.window[PARTITION + self.pos] = x;
            *y = self.output[self.pos];
            self.pos += 1;
            if self.pos == PARTITION {
                self.pos = 0;
                self.run_partition();
            }
        }
    }

    fn run_partition(&mut self) {
        let partitions = self.ir_spectra.len();
        let input_silent = self.window[PARTITION..].iter().all(|&s| s == 0.0);
        self.silent_blocks = if input_silent {
            self.silent_blocks.saturating_add(1)
        } else {
            0
        };

        if self.silent_blocks > partitions {
            self.output.fill(0.0);
            self.window.copy_within(PARTITION.., 0);
            return;
        }

        self.fdl_head = (self.fdl_head + 1) % partitions;
        for (slot, &s) in self.scratch.iter_mut().zip(&self.window) {
            *slot = Complex::new(s, 0.0);
        }
        self.fft.process(&mut self.scratch);
        self.fdl[self.fdl_head].copy_from_slice(&self.scratch);

        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (k, spectrum) in self.ir_spectra.iter().enumerate() {
            let block = &self.fdl[(self.fdl_head + partitions - k) % partitions];
            for ((acc, &x), &h) in self.accumulator.iter_mut().zip(block).zip(spectrum) {
                *acc += x * h;
            }
        }
        self.ifft.process(&mut self.accumulator);

        let scale = 1.0 / (2 * PARTITION) as f32;
        for (out, c) in self.output.iter_mut().zip(&self.accumulator[PARTITION..]) {
            *out = c.re * scale;
        }
        self.window.copy_within(PARTITION.., 0);
    }

    /// Drop all reverb state.
    pub fn reset(&mut self) {
        for block in self.fdl.iter_mut() {
            block.fill(Complex::new(0.0, 0.0));
        }
        self.window.fill(0.0);
        self.output.fill(0.0);
        self.pos = 0;
        self.silent_blocks = self.ir_spectra.len() + 1;
    }
}
