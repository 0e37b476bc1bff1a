//! Shared constants for the voxshift frame pipeline.

/// Sample rate used throughout voxshift (48kHz)
pub const SAMPLE_RATE: u32 = 48000;

/// Interleaved channel count (stereo)
pub const CHANNELS: usize = 2;

/// Samples per channel in one frame (20ms at 48kHz = 960 samples)
pub const SAMPLES_PER_CHANNEL: usize = 960;

/// Interleaved samples in one frame
pub const FRAME_SAMPLES: usize = CHANNELS * SAMPLES_PER_CHANNEL;

/// Bytes in one packed s16le frame
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Wall-clock duration of one frame in milliseconds
pub const FRAME_MS: u64 = 20;

pub const PITCH_MIN: f32 = 0.1;
pub const PITCH_MAX: f32 = 4.0;

/// EQ bands with |gain| at or below this many dB are skipped entirely.
pub const EQ_DEAD_ZONE_DB: f32 = 0.1;

// Fixed EQ operating points: (frequency Hz, Q)
pub const LOW_SHELF_HZ: f32 = 100.0;
pub const LOW_SHELF_Q: f32 = 0.707;
pub const PEAK_HZ: f32 = 1000.0;
pub const PEAK_Q: f32 = 1.0;
pub const HIGH_SHELF_HZ: f32 = 8000.0;
pub const HIGH_SHELF_Q: f32 = 0.707;
