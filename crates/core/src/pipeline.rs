//! The per-frame entry point shared by the frame driver and the control surface.

use crate::capture::{CaptureBackend, CaptureSource, DeviceSelector, InputDevice, NullSource, ReadStatus};
use crate::constants::FRAME_BYTES;
use crate::effect_chain::EffectChain;
use crate::frame::silent_frame;
use crate::params::{ParameterSnapshot, PipelineParameters};
use anyhow::{Context, Result};
use log::{error, info, log, Level};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Repeated faults are logged on the first occurrence and then once per this many.
const FAULT_LOG_INTERVAL: u64 = 250;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture source -> effect chain -> packed frame.
///
/// All methods take `&self`; share it behind an `Arc`. Setters are plain
/// atomic stores and never wait on a frame in flight. Only the source swap in
/// [`AudioPipeline::switch_input_device`] excludes a concurrent read.
pub struct AudioPipeline {
    params: PipelineParameters,
    backend: Box<dyn CaptureBackend>,
    source: Mutex<Box<dyn CaptureSource>>,
    stage: Mutex<FrameStage>,
    faults: AtomicU64,
}

/// The effect chain plus the capture buffer it reads from, reused every frame.
struct FrameStage {
    chain: EffectChain,
    raw: Vec<u8>,
}

impl AudioPipeline {
    /// Creates a pipeline with no device open; frames are silent until
    /// [`AudioPipeline::switch_input_device`] succeeds.
    pub fn new(backend: Box<dyn CaptureBackend>, initial: ParameterSnapshot) -> Self {
        Self {
            params: PipelineParameters::new(initial),
            backend,
            source: Mutex::new(Box::new(NullSource)),
            stage: Mutex::new(FrameStage {
                chain: EffectChain::new(),
                raw: vec![0u8; FRAME_BYTES],
            }),
            faults: AtomicU64::new(0),
        }
    }

    pub fn set_gain(&self, gain: f32) {
        self.params.set_gain(gain);
    }

    pub fn set_pitch(&self, factor: f32) {
        self.params.set_pitch(factor);
    }

    pub fn set_eq(&self, low_db: f32, mid_db: f32, high_db: f32) {
        self.params.set_eq(low_db, mid_db, high_db);
    }

    pub fn parameters(&self) -> &PipelineParameters {
        &self.params
    }

    pub fn list_input_devices(&self) -> Vec<InputDevice> {
        self.backend.list_input_devices()
    }

    /// Opens `selector` and swaps it in for the current source.
    ///
    /// The new device is opened before the lock is taken, so a slow open never
    /// stalls the frame loop. On failure the previous source stays active.
    /// EQ history is kept.
    pub fn switch_input_device(&self, selector: &DeviceSelector) -> Result<()> {
        let next = self
            .backend
            .open(selector)
            .with_context(|| format!("Failed to open input device '{}'", selector))?;
        let previous = std::mem::replace(&mut *lock(&self.source), next);
        drop(previous);
        info!("Input device switched to '{}'", selector);
        Ok(())
    }

    /// Flushes all EQ history.
    pub fn reset_filters(&self) {
        lock(&self.stage).chain.reset_filters();
    }

    /// Produces exactly one frame of `FRAME_BYTES` bytes. Never fails.
    ///
    /// Device faults, an idle source, processing errors and panics all turn
    /// into a silent frame.
    pub fn produce_frame(&self) -> Vec<u8> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_produce_frame())) {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => silent_frame(),
            Ok(Err(e)) => {
                self.note_fault(Level::Error, &e);
                silent_frame()
            }
            Err(_) => {
                error!("Frame processing panicked, emitting silence and flushing EQ history");
                self.reset_filters();
                silent_frame()
            }
        }
    }

    fn try_produce_frame(&self) -> Result<Option<Vec<u8>>> {
        let mut stage = lock(&self.stage);
        let FrameStage { chain, raw } = &mut *stage;
        // Source lock covers just the read, so a device swap can't interleave with it.
        let status = lock(&self.source).read(&mut raw[..]);
        match status {
            Ok(ReadStatus::Ready) => {}
            Ok(ReadStatus::Unavailable) => return Ok(None),
            Err(e) => {
                self.note_fault(Level::Warn, &e.context("Capture read failed"));
                return Ok(None);
            }
        }

        let params = self.params.snapshot();
        let mut out = Vec::with_capacity(FRAME_BYTES);
        chain
            .process(&raw[..], &params, &mut out)
            .context("Effect chain failed")?;
        Ok(Some(out))
    }

    fn note_fault(&self, level: Level, err: &anyhow::Error) {
        let count = self.faults.fetch_add(1, Ordering::Relaxed);
        if count % FAULT_LOG_INTERVAL == 0 {
            log!(level, "{:#} (fault #{}, emitting silence)", err, count + 1);
        }
    }

    /// Total faults converted to silence so far.
    pub fn fault_count(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}
