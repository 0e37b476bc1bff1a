use crate::biquad_filter::BiquadFilter;
use crate::constants::{CHANNELS, EQ_DEAD_ZONE_DB, FRAME_SAMPLES, SAMPLES_PER_CHANNEL};
use crate::filter_design::FilterShape;
use crate::frame::{decode_frame, encode_frame};
use crate::params::ParameterSnapshot;
use crate::pitch::SpectralPitchShifter;
use anyhow::{bail, Result};

/// One EQ band: a fixed shape plus the filter history it owns.
struct EqBand {
    shape: FilterShape,
    filter: BiquadFilter,
}

impl EqBand {
    fn new(shape: FilterShape) -> Self {
        Self {
            shape,
            filter: BiquadFilter::new(CHANNELS),
        }
    }

    /// Filters `samples` unless `gain_db` is inside the dead zone.
    ///
    /// Coefficients are designed fresh on every active frame. A skipped band
    /// keeps its history as it was.
    fn run(&mut self, samples: &mut [f32], gain_db: f32) {
        if gain_db.abs() > EQ_DEAD_ZONE_DB {
            let coeffs = self.shape.design_at_operating_point(gain_db);
            self.filter.apply(samples, &coeffs);
        }
    }
}

/// Pitch shift -> low shelf -> peak -> high shelf -> gain -> clip -> s16le.
pub struct EffectChain {
    pitch: SpectralPitchShifter,
    low: EqBand,
    mid: EqBand,
    high: EqBand,
    work: Vec<f32>,
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectChain {
    pub fn new() -> Self {
        Self {
            pitch: SpectralPitchShifter::new(CHANNELS, SAMPLES_PER_CHANNEL),
            low: EqBand::new(FilterShape::LowShelf),
            mid: EqBand::new(FilterShape::Peaking),
            high: EqBand::new(FilterShape::HighShelf),
            work: vec![0.0; FRAME_SAMPLES],
        }
    }

    /// Runs one raw s16le frame through the chain, writing the packed result to `out`.
    ///
    /// Fails on a wrong-length frame or when the EQ produced non-finite samples;
    /// in the latter case every band's history is flushed first.
    pub fn process(&mut self, input: &[u8], params: &ParameterSnapshot, out: &mut Vec<u8>) -> Result<()> {
        decode_frame(input, &mut self.work)?;

        // 1. Pitch
        if params.pitch_factor != 1.0 {
            self.pitch.process(&mut self.work, params.pitch_factor);
        }

        // 2. EQ
        self.low.run(&mut self.work, params.eq_low_db);
        self.mid.run(&mut self.work, params.eq_mid_db);
        self.high.run(&mut self.work, params.eq_high_db);

        if self.work.iter().any(|s| !s.is_finite()) {
            self.reset_filters();
            bail!(
                "Non-finite samples after EQ (low={} mid={} high={})",
                params.eq_low_db,
                params.eq_mid_db,
                params.eq_high_db
            );
        }

        // 3. Gain
        if params.gain != 1.0 {
            for sample in self.work.iter_mut() {
                *sample *= params.gain;
            }
        }

        // 4 + 5. Clip and pack
        encode_frame(&self.work, out);
        Ok(())
    }

    /// Clears the history of all three EQ bands.
    pub fn reset_filters(&mut self) {
        self.low.filter.reset();
        self.mid.filter.reset();
        self.high.filter.reset();
    }
}
