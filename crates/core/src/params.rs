//! Live pipeline parameters shared between the control surface and the frame loop.
//!
//! Each scalar is its own atomic. A frame may observe a mix of old and new
//! values when several setters race with it; only torn reads of a single
//! field are ruled out.

use crate::constants::{PITCH_MAX, PITCH_MIN};
use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` stored as its bit pattern in an `AtomicU32`.
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// One frame's view of the parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub gain: f32,
    pub pitch_factor: f32,
    pub eq_low_db: f32,
    pub eq_mid_db: f32,
    pub eq_high_db: f32,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            gain: 1.0,
            pitch_factor: 1.0,
            eq_low_db: 0.0,
            eq_mid_db: 0.0,
            eq_high_db: 0.0,
        }
    }
}

pub struct PipelineParameters {
    gain: AtomicF32,
    pitch_factor: AtomicF32,
    eq_low_db: AtomicF32,
    eq_mid_db: AtomicF32,
    eq_high_db: AtomicF32,
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self::new(ParameterSnapshot::default())
    }
}

impl PipelineParameters {
    /// Builds the parameter set, passing `initial` through the same clamps as the setters.
    pub fn new(initial: ParameterSnapshot) -> Self {
        let params = Self {
            gain: AtomicF32::new(1.0),
            pitch_factor: AtomicF32::new(1.0),
            eq_low_db: AtomicF32::new(0.0),
            eq_mid_db: AtomicF32::new(0.0),
            eq_high_db: AtomicF32::new(0.0),
        };
        params.set_gain(initial.gain);
        params.set_pitch(initial.pitch_factor);
        params.set_eq(initial.eq_low_db, initial.eq_mid_db, initial.eq_high_db);
        params
    }

    /// Linear gain, clamped to `>= 0`. NaN becomes 0.
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0));
    }

    /// Pitch factor, clamped to `[PITCH_MIN, PITCH_MAX]`. NaN is ignored.
    pub fn set_pitch(&self, factor: f32) {
        if factor.is_nan() {
            log::warn!("Ignoring NaN pitch factor");
            return;
        }
        self.pitch_factor.store(factor.clamp(PITCH_MIN, PITCH_MAX));
    }

    /// Stores the three band gains in dB as given.
    pub fn set_eq(&self, low_db: f32, mid_db: f32, high_db: f32) {
        self.eq_low_db.store(low_db);
        self.eq_mid_db.store(mid_db);
        self.eq_high_db.store(high_db);
    }

    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn pitch_factor(&self) -> f32 {
        self.pitch_factor.load()
    }

    pub fn eq(&self) -> (f32, f32, f32) {
        (self.eq_low_db.load(), self.eq_mid_db.load(), self.eq_high_db.load())
    }

    /// Reads every field independently.
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            gain: self.gain.load(),
            pitch_factor: self.pitch_factor.load(),
            eq_low_db: self.eq_low_db.load(),
            eq_mid_db: self.eq_mid_db.load(),
            eq_high_db: self.eq_high_db.load(),
        }
    }
}
