//! Pulls one frame per period from the pipeline and hands it to a sink.

use crate::control::Event;
use crate::sink::FrameSink;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;
use log::{debug, error};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use voxshift_core::constants::FRAME_MS;
use voxshift_core::AudioPipeline;

pub struct FrameDriver {
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl FrameDriver {
    pub fn start(
        pipeline: Arc<AudioPipeline>,
        sink: Box<dyn FrameSink>,
        events: Sender<Event>,
    ) -> Result<Self> {
        Self::with_period(pipeline, sink, events, Duration::from_millis(FRAME_MS))
    }

    fn with_period(
        pipeline: Arc<AudioPipeline>,
        mut sink: Box<dyn FrameSink>,
        events: Sender<Event>,
        period: Duration,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let frames = Arc::new(AtomicU64::new(0));
        let running_flag = running.clone();
        let frame_count = frames.clone();

        let handle = thread::Builder::new()
            .name("voxshift-driver".into())
            .spawn(move || {
                let mut next = Instant::now();
                let result = loop {
                    if !running_flag.load(Ordering::Relaxed) {
                        break Ok(());
                    }
                    let frame = pipeline.produce_frame();
                    if let Err(e) = sink.write_frame(&frame) {
                        error!("Sink failed: {:#}", e);
                        let _ = events.send(Event::DriverExited);
                        break Err(e);
                    }
                    frame_count.fetch_add(1, Ordering::Relaxed);

                    // Pace on absolute deadlines; after a long stall, resync
                    // instead of bursting to catch up.
                    next += period;
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    } else if now - next > period {
                        debug!("Driver fell {:?} behind, resyncing", now - next);
                        next = now;
                    }
                };
                sink.finish().and(result)
            })
            .context("Failed to spawn driver thread")?;

        Ok(Self {
            running,
            frames,
            handle: Some(handle),
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Stops the loop, finishes the sink and returns the number of frames written.
    pub fn stop(mut self) -> Result<u64> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("Driver thread panicked"))??;
        }
        Ok(self.frames_written())
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;
    use voxshift_core::constants::FRAME_BYTES;
    use voxshift_core::{
        CaptureBackend, CaptureSource, DeviceSelector, InputDevice, NullSource, ParameterSnapshot,
    };

    struct Idle;

    impl CaptureBackend for Idle {
        fn list_input_devices(&self) -> Vec<InputDevice> {
            Vec::new()
        }

        fn open(&self, _selector: &DeviceSelector) -> Result<Box<dyn CaptureSource>> {
            Ok(Box::new(NullSource))
        }
    }

    #[derive(Default)]
    struct Recorded {
        frames: Vec<Vec<u8>>,
        finished: bool,
    }

    struct MemorySink {
        shared: Arc<Mutex<Recorded>>,
        fail_after: Option<usize>,
    }

    impl FrameSink for MemorySink {
        fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
            let mut recorded = self.shared.lock().unwrap();
            if Some(recorded.frames.len()) == self.fail_after {
                bail!("pipe closed");
            }
            recorded.frames.push(frame.to_vec());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.shared.lock().unwrap().finished = true;
            Ok(())
        }
    }

    fn pipeline() -> Arc<AudioPipeline> {
        Arc::new(AudioPipeline::new(Box::new(Idle), ParameterSnapshot::default()))
    }

    #[test]
    fn test_driver_emits_silent_frames_until_stopped() {
        let shared = Arc::new(Mutex::new(Recorded::default()));
        let sink = MemorySink {
            shared: shared.clone(),
            fail_after: None,
        };
        let (tx, _rx) = crossbeam_channel::unbounded();

        let driver =
            FrameDriver::with_period(pipeline(), Box::new(sink), tx, Duration::from_millis(2)).unwrap();
        thread::sleep(Duration::from_millis(50));
        let written = driver.stop().unwrap();

        let recorded = shared.lock().unwrap();
        assert!(written > 0);
        assert_eq!(written as usize, recorded.frames.len());
        assert!(recorded.finished);
        for frame in &recorded.frames {
            assert_eq!(frame.len(), FRAME_BYTES);
            assert!(frame.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_sink_failure_reports_and_stops() {
        let shared = Arc::new(Mutex::new(Recorded::default()));
        let sink = MemorySink {
            shared: shared.clone(),
            fail_after: Some(3),
        };
        let (tx, rx) = crossbeam_channel::unbounded();

        let driver =
            FrameDriver::with_period(pipeline(), Box::new(sink), tx, Duration::from_millis(1)).unwrap();
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, Event::DriverExited));

        assert!(driver.stop().is_err());
        let recorded = shared.lock().unwrap();
        assert_eq!(recorded.frames.len(), 3);
        assert!(recorded.finished);
    }
}
