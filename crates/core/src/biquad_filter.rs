//! Stateful multi-channel biquad over interleaved frames.

use crate::filter_design::BiquadCoefficients;
use biquad::{Biquad, DirectForm1};

/// Applies one coefficient set per call to an interleaved buffer.
///
/// Each channel owns a direct-form-I delay line (two inputs, two outputs)
/// that survives across frames until [`BiquadFilter::reset`] is called.
pub struct BiquadFilter {
    channels: Vec<DirectForm1<f32>>,
}

impl BiquadFilter {
    pub fn new(channels: usize) -> Self {
        let passthrough: biquad::Coefficients<f32> = BiquadCoefficients {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
        }
        .into();
        Self {
            channels: (0..channels)
                .map(|_| DirectForm1::<f32>::new(passthrough))
                .collect(),
        }
    }

    /// Filters `samples` in place with `coefficients`, updating each channel's history.
    ///
    /// `y[n] = b0·x[n] + b1·x[n-1] + b2·x[n-2] − a1·y[n-1] − a2·y[n-2]`
    pub fn apply(&mut self, samples: &mut [f32], coefficients: &BiquadCoefficients) {
        let stride = self.channels.len();
        if stride == 0 {
            return;
        }
        for (ch, filter) in self.channels.iter_mut().enumerate() {
            filter.update_coefficients((*coefficients).into());
            for sample in samples.iter_mut().skip(ch).step_by(stride) {
                *sample = filter.run(*sample);
            }
        }
    }

    /// Clears every channel's delay line.
    pub fn reset(&mut self) {
        for filter in &mut self.channels {
            filter.reset_state();
        }
    }
}
