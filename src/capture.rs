use crate::stream::StreamKeeper;
use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamError};
use log::{info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use voxshift_core::constants::{CHANNELS, FRAME_SAMPLES, SAMPLE_RATE};
use voxshift_core::frame::clip_sample;
use voxshift_core::{CaptureBackend, CaptureSource, DeviceSelector, InputDevice, ReadStatus};

/// Frames kept in the capture ring before old audio is skipped.
const MAX_BUFFERED_FRAMES: usize = 2;

pub fn find_input_device(host: &cpal::Host, selector: &DeviceSelector) -> Result<cpal::Device> {
    match selector {
        DeviceSelector::Default => host
            .default_input_device()
            .context("No default input found"),
        DeviceSelector::Index(index) => host
            .input_devices()?
            .nth(*index)
            .with_context(|| format!("No input device at index {}", index)),
        DeviceSelector::Name(name) => host
            .input_devices()?
            .find(|d| d.name().ok().as_deref() == Some(name.as_str()))
            .context("Input device not found"),
    }
}

/// Opens and enumerates input devices on the default cpal host.
pub struct CpalBackend {
    read_timeout: Duration,
}

impl CpalBackend {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl CaptureBackend for CpalBackend {
    fn list_input_devices(&self) -> Vec<InputDevice> {
        let host = cpal::default_host();
        match host.input_devices() {
            Ok(devices) => devices
                .enumerate()
                .map(|(id, device)| InputDevice {
                    id,
                    name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
                })
                .collect(),
            Err(e) => {
                warn!("Failed to enumerate input devices: {}", e);
                Vec::new()
            }
        }
    }

    fn open(&self, selector: &DeviceSelector) -> Result<Box<dyn CaptureSource>> {
        Ok(Box::new(CpalSource::open(selector.clone(), self.read_timeout)?))
    }
}

/// Drains interleaved f32 audio from a capture ring into s16le frames.
struct RingReader {
    consumer: HeapCons<f32>,
    device_lost: Arc<AtomicBool>,
    read_timeout: Duration,
    scratch: Vec<f32>,
}

impl RingReader {
    fn new(consumer: HeapCons<f32>, device_lost: Arc<AtomicBool>, read_timeout: Duration) -> Self {
        Self {
            consumer,
            device_lost,
            read_timeout,
            scratch: vec![0.0; FRAME_SAMPLES],
        }
    }

    fn read(&mut self, frame: &mut [u8]) -> Result<ReadStatus> {
        if self.device_lost.load(Ordering::Relaxed) {
            return Err(anyhow!("Input device is no longer available"));
        }
        if frame.len() != FRAME_SAMPLES * 2 {
            bail!("Capture buffer must be {} bytes, got {}", FRAME_SAMPLES * 2, frame.len());
        }

        // Drop stale audio if the reader fell behind.
        while self.consumer.occupied_len() >= (MAX_BUFFERED_FRAMES + 1) * FRAME_SAMPLES {
            self.consumer.skip(FRAME_SAMPLES);
        }

        let deadline = Instant::now() + self.read_timeout;
        while self.consumer.occupied_len() < FRAME_SAMPLES {
            if Instant::now() >= deadline {
                return Ok(ReadStatus::Unavailable);
            }
            thread::sleep(Duration::from_micros(500));
        }

        self.consumer.pop_slice(&mut self.scratch);
        for (sample, out) in self.scratch.iter().zip(frame.chunks_exact_mut(2)) {
            out.copy_from_slice(&clip_sample(sample * 32767.0).to_le_bytes());
        }
        Ok(ReadStatus::Ready)
    }
}

/// Live microphone input, delivered as fixed-size s16le frames.
pub struct CpalSource {
    reader: RingReader,
    _keeper: StreamKeeper,
}

impl CpalSource {
    pub fn open(selector: DeviceSelector, read_timeout: Duration) -> Result<Self> {
        // 100ms of stereo audio
        let rb = HeapRb::<f32>::new(SAMPLE_RATE as usize / 10 * CHANNELS);
        let (producer, consumer) = rb.split();
        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = device_lost.clone();

        let keeper = StreamKeeper::spawn("voxshift-capture", move || {
            let host = cpal::default_host();
            let device = find_input_device(&host, &selector)?;
            let name = device.name().unwrap_or_default();
            let supported = device
                .default_input_config()
                .context("Failed to query input config")?;
            let channels = supported.channels().clamp(1, CHANNELS as u16);
            let config = cpal::StreamConfig {
                channels,
                sample_rate: cpal::SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };
            info!(
                "Using input device: {} ({} ch, {:?})",
                name,
                channels,
                supported.sample_format()
            );

            match supported.sample_format() {
                SampleFormat::F32 => build_input::<f32>(&device, &config, producer, lost_flag),
                SampleFormat::I16 => build_input::<i16>(&device, &config, producer, lost_flag),
                SampleFormat::U16 => build_input::<u16>(&device, &config, producer, lost_flag),
                SampleFormat::I32 => build_input::<i32>(&device, &config, producer, lost_flag),
                other => bail!("Unsupported input sample format {:?}", other),
            }
        })?;

        Ok(Self {
            reader: RingReader::new(consumer, device_lost, read_timeout),
            _keeper: keeper,
        })
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut producer: HeapProd<f32>,
    device_lost: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let in_channels = config.channels as usize;
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _| {
            // Whole stereo pairs only, so channels never slip out of order.
            for frame in data.chunks_exact(in_channels) {
                if producer.vacant_len() < CHANNELS {
                    break;
                }
                let left = f32::from_sample(frame[0]);
                let right = if in_channels > 1 {
                    f32::from_sample(frame[1])
                } else {
                    left
                };
                let _ = producer.try_push(left);
                let _ = producer.try_push(right);
            }
        },
        move |err| match err {
            StreamError::DeviceNotAvailable => {
                warn!("Input device disappeared");
                device_lost.store(true, Ordering::Relaxed);
            }
            other => warn!("Input error: {}", other),
        },
        None,
    )?;
    Ok(stream)
}

impl CaptureSource for CpalSource {
    fn read(&mut self, frame: &mut [u8]) -> Result<ReadStatus> {
        self.reader.read(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxshift_core::constants::FRAME_BYTES;

    fn reader(timeout_ms: u64) -> (HeapProd<f32>, Arc<AtomicBool>, RingReader) {
        let (producer, consumer) = HeapRb::<f32>::new(SAMPLE_RATE as usize / 10 * CHANNELS).split();
        let lost = Arc::new(AtomicBool::new(false));
        let reader = RingReader::new(consumer, lost.clone(), Duration::from_millis(timeout_ms));
        (producer, lost, reader)
    }

    fn push_frame(producer: &mut HeapProd<f32>, value: f32) {
        for _ in 0..FRAME_SAMPLES {
            producer.try_push(value).unwrap();
        }
    }

    fn first_sample(frame: &[u8]) -> i16 {
        i16::from_le_bytes([frame[0], frame[1]])
    }

    #[test]
    fn test_empty_ring_times_out_as_unavailable() {
        let (_producer, _lost, mut reader) = reader(20);
        let mut frame = vec![0u8; FRAME_BYTES];

        let started = Instant::now();
        assert_eq!(reader.read(&mut frame).unwrap(), ReadStatus::Unavailable);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_millis(40), "read blocked for {:?}", elapsed);
    }

    #[test]
    fn test_partial_frame_is_not_delivered() {
        let (mut producer, _lost, mut reader) = reader(5);
        for _ in 0..FRAME_SAMPLES - 2 {
            producer.try_push(0.5).unwrap();
        }
        let mut frame = vec![0u8; FRAME_BYTES];
        assert_eq!(reader.read(&mut frame).unwrap(), ReadStatus::Unavailable);

        producer.try_push(0.5).unwrap();
        producer.try_push(0.5).unwrap();
        assert_eq!(reader.read(&mut frame).unwrap(), ReadStatus::Ready);
    }

    #[test]
    fn test_ready_frame_is_converted_to_s16le() {
        let (mut producer, _lost, mut reader) = reader(5);
        push_frame(&mut producer, 0.5);
        let mut frame = vec![0u8; FRAME_BYTES];

        assert_eq!(reader.read(&mut frame).unwrap(), ReadStatus::Ready);
        assert!(frame
            .chunks_exact(2)
            .all(|p| i16::from_le_bytes([p[0], p[1]]) == 16384));
        assert_eq!(reader.consumer.occupied_len(), 0);
    }

    #[test]
    fn test_backlog_skips_to_recent_audio() {
        let (mut producer, _lost, mut reader) = reader(5);
        for value in [0.1, 0.2, 0.3, 0.4] {
            push_frame(&mut producer, value);
        }
        let mut frame = vec![0u8; FRAME_BYTES];

        // Four queued: two oldest dropped, the next one out is the third.
        assert_eq!(reader.read(&mut frame).unwrap(), ReadStatus::Ready);
        assert_eq!(first_sample(&frame), clip_sample(0.3 * 32767.0));
        assert!(reader.consumer.occupied_len() < MAX_BUFFERED_FRAMES * FRAME_SAMPLES + 1);

        assert_eq!(reader.read(&mut frame).unwrap(), ReadStatus::Ready);
        assert_eq!(first_sample(&frame), clip_sample(0.4 * 32767.0));
        assert_eq!(reader.read(&mut frame).unwrap(), ReadStatus::Unavailable);
    }

    #[test]
    fn test_lost_device_is_an_error() {
        let (mut producer, lost, mut reader) = reader(5);
        push_frame(&mut producer, 0.25);
        lost.store(true, Ordering::Relaxed);

        let mut frame = vec![0u8; FRAME_BYTES];
        assert!(reader.read(&mut frame).is_err());
    }

    #[test]
    fn test_listed_ids_are_selector_indices() {
        // Whatever the host has (possibly nothing), ids must be enumeration order.
        let devices = CpalBackend::new(Duration::from_millis(5)).list_input_devices();
        for (position, device) in devices.iter().enumerate() {
            assert_eq!(device.id, position);
        }
    }

    #[test]
    fn test_wrong_buffer_length_is_rejected() {
        let (mut producer, _lost, mut reader) = reader(5);
        push_frame(&mut producer, 0.25);
        let mut short = vec![0u8; 64];
        assert!(reader.read(&mut short).is_err());
    }
}
