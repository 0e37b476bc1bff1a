//! Zero-latency spectral pitch shift.
//!
//! Every frame is transformed on its own: forward FFT per channel, the
//! half-spectrum is resampled by `1/factor` with linear interpolation of the
//! real and imaginary parts, and an inverse FFT brings back exactly the same
//! number of samples. Nothing is carried between frames, so there is no
//! added latency and no overlap-add. The price is a robotic timbre and phase
//! jumps at frame edges.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

pub struct SpectralPitchShifter {
    channels: usize,
    samples_per_channel: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    // Scratch only; contents never outlive one call to `process`.
    buffer: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,
    shifted: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralPitchShifter {
    pub fn new(channels: usize, samples_per_channel: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(samples_per_channel);
        let inverse = planner.plan_fft_inverse(samples_per_channel);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let bins = samples_per_channel / 2 + 1;

        Self {
            channels,
            samples_per_channel,
            forward,
            inverse,
            buffer: vec![Complex::new(0.0, 0.0); samples_per_channel],
            spectrum: vec![Complex::new(0.0, 0.0); bins],
            shifted: vec![Complex::new(0.0, 0.0); bins],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Number of real-input spectrum bins (`N/2 + 1`).
    pub fn bins(&self) -> usize {
        self.spectrum.len()
    }

    /// Shifts an interleaved frame in place. `factor > 1` raises pitch.
    ///
    /// A factor of exactly 1.0 returns immediately without touching the frame.
    pub fn process(&mut self, frame: &mut [f32], factor: f32) {
        if factor == 1.0 {
            return;
        }
        self.process_unchecked(frame, factor);
    }

    /// Runs the full transform even for `factor == 1.0`.
    pub fn process_unchecked(&mut self, frame: &mut [f32], factor: f32) {
        let n = self.samples_per_channel;
        let stride = self.channels;
        if n == 0 || stride == 0 || frame.len() != n * stride {
            return;
        }
        if factor.is_nan() || factor <= 0.0 {
            return;
        }
        let last = self.spectrum.len() - 1;
        let scale = 1.0 / n as f32;

        for ch in 0..stride {
            for (slot, &sample) in self.buffer.iter_mut().zip(frame.iter().skip(ch).step_by(stride)) {
                *slot = Complex::new(sample, 0.0);
            }
            self.forward
                .process_with_scratch(&mut self.buffer, &mut self.scratch);
            self.spectrum.copy_from_slice(&self.buffer[..=last]);

            for (i, out) in self.shifted.iter_mut().enumerate() {
                let source = (i as f32 / factor).clamp(0.0, last as f32);
                let lo = source.floor() as usize;
                let hi = (lo + 1).min(last);
                let t = source - lo as f32;
                // Complex lerp == independent lerp of re and im
                *out = self.spectrum[lo] * (1.0 - t) + self.spectrum[hi] * t;
            }

            // Rebuild a Hermitian spectrum so the inverse is purely real.
            self.shifted[0].im = 0.0;
            if n % 2 == 0 {
                self.shifted[last].im = 0.0;
            }
            self.buffer[..=last].copy_from_slice(&self.shifted);
            for k in (last + 1)..n {
                self.buffer[k] = self.shifted[n - k].conj();
            }

            self.inverse
                .process_with_scratch(&mut self.buffer, &mut self.scratch);
            for (sample, value) in frame.iter_mut().skip(ch).step_by(stride).zip(&self.buffer) {
                *sample = value.re * scale;
            }
        }
    }
}
