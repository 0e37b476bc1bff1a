//! Audio-EQ-Cookbook coefficient design for the three EQ band shapes.

use crate::constants::{
    HIGH_SHELF_HZ, HIGH_SHELF_Q, LOW_SHELF_HZ, LOW_SHELF_Q, PEAK_HZ, PEAK_Q, SAMPLE_RATE,
};
use std::f64::consts::PI;

/// Response shape of one EQ band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterShape {
    LowShelf,
    HighShelf,
    Peaking,
}

impl FilterShape {
    /// The fixed (corner Hz, Q) this shape runs at inside the effect chain.
    pub fn operating_point(self) -> (f32, f32) {
        match self {
            FilterShape::LowShelf => (LOW_SHELF_HZ, LOW_SHELF_Q),
            FilterShape::Peaking => (PEAK_HZ, PEAK_Q),
            FilterShape::HighShelf => (HIGH_SHELF_HZ, HIGH_SHELF_Q),
        }
    }

    /// Designs this shape at its fixed operating point for the pipeline sample rate.
    pub fn design_at_operating_point(self, gain_db: f32) -> BiquadCoefficients {
        let (cutoff_hz, q) = self.operating_point();
        design(self, cutoff_hz, gain_db, SAMPLE_RATE as f32, q)
    }
}

/// One second-order transfer function, normalized so `a0 == 1`.
///
/// Values are replaced wholesale when a band changes; there are no setters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a0: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a0: 1.0,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        }
    }
}

impl From<BiquadCoefficients> for biquad::Coefficients<f32> {
    fn from(c: BiquadCoefficients) -> Self {
        biquad::Coefficients {
            a1: c.a1,
            a2: c.a2,
            b0: c.b0,
            b1: c.b1,
            b2: c.b2,
        }
    }
}

/// Intermediate cookbook terms shared by every shape.
struct Terms {
    a: f64,
    sqrt_a: f64,
    alpha: f64,
    cos_w0: f64,
}

impl Terms {
    fn new(cutoff_hz: f32, gain_db: f32, sample_rate_hz: f32, q: f32) -> Self {
        let a = 10f64.powf(gain_db as f64 / 40.0);
        let w0 = 2.0 * PI * cutoff_hz as f64 / sample_rate_hz as f64;
        Self {
            a,
            sqrt_a: a.sqrt(),
            alpha: w0.sin() / (2.0 * q as f64),
            cos_w0: w0.cos(),
        }
    }
}

/// Designs one band. The caller keeps `cutoff_hz` below Nyquist.
pub fn design(
    shape: FilterShape,
    cutoff_hz: f32,
    gain_db: f32,
    sample_rate_hz: f32,
    q: f32,
) -> BiquadCoefficients {
    match shape {
        FilterShape::LowShelf => low_shelf(cutoff_hz, gain_db, sample_rate_hz, q),
        FilterShape::HighShelf => high_shelf(cutoff_hz, gain_db, sample_rate_hz, q),
        FilterShape::Peaking => peaking(cutoff_hz, gain_db, sample_rate_hz, q),
    }
}

/// Boosts or cuts everything below `cutoff_hz`.
pub fn low_shelf(cutoff_hz: f32, gain_db: f32, sample_rate_hz: f32, q: f32) -> BiquadCoefficients {
    let Terms { a, sqrt_a, alpha, cos_w0 } = Terms::new(cutoff_hz, gain_db, sample_rate_hz, q);
    BiquadCoefficients::normalized(
        a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha),
        2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
        a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha),
        (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha,
        -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
        (a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha,
    )
}

/// Boosts or cuts everything above `cutoff_hz`.
pub fn high_shelf(cutoff_hz: f32, gain_db: f32, sample_rate_hz: f32, q: f32) -> BiquadCoefficients {
    let Terms { a, sqrt_a, alpha, cos_w0 } = Terms::new(cutoff_hz, gain_db, sample_rate_hz, q);
    BiquadCoefficients::normalized(
        a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha),
        -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
        a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha),
        (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * sqrt_a * alpha,
        2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
        (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * sqrt_a * alpha,
    )
}

/// Boosts or cuts a band centred on `cutoff_hz`, width set by `q`.
pub fn peaking(cutoff_hz: f32, gain_db: f32, sample_rate_hz: f32, q: f32) -> BiquadCoefficients {
    let Terms { a, alpha, cos_w0, .. } = Terms::new(cutoff_hz, gain_db, sample_rate_hz, q);
    BiquadCoefficients::normalized(
        1.0 + alpha * a,
        -2.0 * cos_w0,
        1.0 - alpha * a,
        1.0 + alpha / a,
        -2.0 * cos_w0,
        1.0 - alpha / a,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 48000.0;
    const SHAPES: [FilterShape; 3] = [
        FilterShape::LowShelf,
        FilterShape::HighShelf,
        FilterShape::Peaking,
    ];

    /// Magnitude response |H(e^jw)| at `freq_hz`.
    fn magnitude_at(c: &BiquadCoefficients, freq_hz: f32) -> f64 {
        let w = 2.0 * PI * freq_hz as f64 / FS as f64;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num_re = c.b0 as f64 + c.b1 as f64 * c1 + c.b2 as f64 * c2;
        let num_im = c.b1 as f64 * s1 + c.b2 as f64 * s2;
        let den_re = c.a0 as f64 + c.a1 as f64 * c1 + c.a2 as f64 * c2;
        let den_im = c.a1 as f64 * s1 + c.a2 as f64 * s2;
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }

    fn db(mag: f64) -> f64 {
        20.0 * mag.log10()
    }

    #[test]
    fn test_zero_gain_is_identity_for_every_shape() {
        for shape in SHAPES {
            let c = shape.design_at_operating_point(0.0);
            assert_eq!(c.a0, 1.0);
            assert!((c.b0 - c.a0).abs() < 1e-6, "{:?}: b0={} a0={}", shape, c.b0, c.a0);
            assert!((c.b1 - c.a1).abs() < 1e-6, "{:?}: b1={} a1={}", shape, c.b1, c.a1);
            assert!((c.b2 - c.a2).abs() < 1e-6, "{:?}: b2={} a2={}", shape, c.b2, c.a2);
        }
    }

    #[test]
    fn test_normalized_a0() {
        for shape in SHAPES {
            for gain in [-24.0, -6.0, 3.0, 18.0] {
                assert_eq!(shape.design_at_operating_point(gain).a0, 1.0);
            }
        }
    }

    #[test]
    fn test_low_shelf_response() {
        let c = low_shelf(100.0, 6.0, FS, 0.707);
        assert!((db(magnitude_at(&c, 10.0)) - 6.0).abs() < 0.3);
        assert!(db(magnitude_at(&c, 10_000.0)).abs() < 0.1);
    }

    #[test]
    fn test_high_shelf_response() {
        let c = high_shelf(8000.0, -6.0, FS, 0.707);
        assert!((db(magnitude_at(&c, 23_500.0)) + 6.0).abs() < 0.5);
        assert!(db(magnitude_at(&c, 100.0)).abs() < 0.1);
    }

    #[test]
    fn test_peaking_hits_gain_at_centre() {
        let c = peaking(1000.0, 9.0, FS, 1.0);
        assert!((db(magnitude_at(&c, 1000.0)) - 9.0).abs() < 0.05);
        assert!(db(magnitude_at(&c, 20.0)).abs() < 0.2);
    }

    #[test]
    fn test_design_dispatches_by_shape() {
        assert_eq!(
            design(FilterShape::Peaking, 1000.0, 3.0, FS, 1.0),
            peaking(1000.0, 3.0, FS, 1.0)
        );
        assert_eq!(
            FilterShape::HighShelf.design_at_operating_point(2.0),
            high_shelf(8000.0, 2.0, FS, 0.707)
        );
    }

    #[test]
    fn test_into_biquad_coefficients() {
        let c = peaking(1000.0, 3.0, FS, 1.0);
        let converted: biquad::Coefficients<f32> = c.into();
        assert_eq!(converted.b0, c.b0);
        assert_eq!(converted.a2, c.a2);
    }
}
