//! Where produced frames go: a pipe, a local device, or a WAV file.

use crate::stream::StreamKeeper;
use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use log::{info, warn};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use voxshift_core::constants::{CHANNELS, FRAME_BYTES, FRAME_SAMPLES, SAMPLE_RATE};

/// Consumer of finished s16le frames, driven once per frame period.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Flushes anything buffered. Called once when the driver stops.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSpec {
    /// Raw interleaved s16le on stdout
    Stdout,
    /// Local playback; `None` is the default output device
    Device(Option<String>),
    /// 16-bit stereo WAV recording
    Wav(PathBuf),
}

impl FromStr for SinkSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once(':') {
            None if s == "stdout" || s == "-" => Ok(SinkSpec::Stdout),
            None if s == "device" => Ok(SinkSpec::Device(None)),
            Some(("device", name)) if !name.is_empty() => Ok(SinkSpec::Device(Some(name.to_string()))),
            Some(("wav", path)) if !path.is_empty() => Ok(SinkSpec::Wav(PathBuf::from(path))),
            _ => bail!(
                "Unknown sink '{}' (expected stdout, device, device:<name> or wav:<path>)",
                s
            ),
        }
    }
}

pub fn open_sink(spec: &SinkSpec) -> Result<Box<dyn FrameSink>> {
    Ok(match spec {
        SinkSpec::Stdout => Box::new(StdoutSink::new()),
        SinkSpec::Device(name) => Box::new(PlaybackSink::open(name.clone())?),
        SinkSpec::Wav(path) => Box::new(WavSink::create(path.clone())?),
    })
}

fn samples(frame: &[u8]) -> impl Iterator<Item = i16> + '_ {
    frame
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

// ── Stdout ───────────────────────────────────────────────────────

/// Hands frames to whatever reads our stdout (an encoder or transport process).
pub struct StdoutSink {
    out: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl FrameSink for StdoutSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut out = self.out.lock();
        out.write_all(frame).context("Failed to write frame to stdout")?;
        out.flush().context("Failed to flush stdout")
    }
}

// ── WAV ──────────────────────────────────────────────────────────

pub struct WavSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl WavSink {
    pub fn create(path: PathBuf) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: CHANNELS as u16,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        info!("Recording to {}", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }
}

impl FrameSink for WavSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("{} is already finalized", self.path.display());
        };
        for sample in samples(frame) {
            writer
                .write_sample(sample)
                .with_context(|| format!("Failed to write {}", self.path.display()))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .with_context(|| format!("Failed to finalize {}", self.path.display()))?;
        }
        Ok(())
    }
}

// ── Playback ─────────────────────────────────────────────────────

/// Local monitoring through an output device.
pub struct PlaybackSink {
    producer: HeapProd<f32>,
    dropped: u64,
    _keeper: StreamKeeper,
}

impl PlaybackSink {
    pub fn open(device_name: Option<String>) -> Result<Self> {
        // 100ms of stereo audio
        let rb = HeapRb::<f32>::new(SAMPLE_RATE as usize / 10 * CHANNELS);
        let (producer, mut consumer) = rb.split();

        let keeper = StreamKeeper::spawn("voxshift-playback", move || {
            let host = cpal::default_host();
            let device = match device_name.as_deref() {
                None | Some("default") => host
                    .default_output_device()
                    .context("No default output found")?,
                Some(name) => host
                    .output_devices()?
                    .find(|d| d.name().ok().as_deref() == Some(name))
                    .context("Output device not found")?,
            };
            info!("Using output device: {}", device.name().unwrap_or_default());

            let config = cpal::StreamConfig {
                channels: CHANNELS as u16,
                sample_rate: cpal::SampleRate(SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };
            let stream = device.build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    let read = consumer.pop_slice(data);
                    for sample in data.iter_mut().skip(read) {
                        *sample = 0.0;
                    }
                },
                |err| warn!("Output error: {}", err),
                None,
            )?;
            Ok(stream)
        })?;

        Ok(Self {
            producer,
            dropped: 0,
            _keeper: keeper,
        })
    }
}

impl FrameSink for PlaybackSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() != FRAME_BYTES {
            bail!("Playback frame must be {} bytes, got {}", FRAME_BYTES, frame.len());
        }
        // Never block the frame loop on a slow device; drop the frame instead.
        if self.producer.vacant_len() < FRAME_SAMPLES {
            self.dropped += 1;
            if self.dropped % 50 == 1 {
                warn!("Playback buffer full, {} frames dropped so far", self.dropped);
            }
            return Ok(());
        }
        for sample in samples(frame) {
            let _ = self.producer.try_push(sample as f32 / 32768.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxshift_core::frame::silent_frame;

    #[test]
    fn test_parse_sink_specs() {
        assert_eq!("stdout".parse::<SinkSpec>().unwrap(), SinkSpec::Stdout);
        assert_eq!("-".parse::<SinkSpec>().unwrap(), SinkSpec::Stdout);
        assert_eq!("device".parse::<SinkSpec>().unwrap(), SinkSpec::Device(None));
        assert_eq!(
            "device:USB Headset".parse::<SinkSpec>().unwrap(),
            SinkSpec::Device(Some("USB Headset".to_string()))
        );
        assert_eq!(
            "wav:/tmp/out.wav".parse::<SinkSpec>().unwrap(),
            SinkSpec::Wav(PathBuf::from("/tmp/out.wav"))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_sinks() {
        assert!("udp:1.2.3.4".parse::<SinkSpec>().is_err());
        assert!("wav:".parse::<SinkSpec>().is_err());
        assert!("speaker".parse::<SinkSpec>().is_err());
    }

    #[test]
    fn test_wav_sink_records_frames() {
        let path = std::env::temp_dir().join(format!("voxshift-test-{}.wav", std::process::id()));
        let mut sink = WavSink::create(path.clone()).unwrap();

        let mut frame = silent_frame();
        frame[0..2].copy_from_slice(&1234i16.to_le_bytes());
        frame[2..4].copy_from_slice(&(-1234i16).to_le_bytes());
        sink.write_frame(&frame).unwrap();
        sink.write_frame(&silent_frame()).unwrap();
        sink.finish().unwrap();
        assert!(sink.write_frame(&frame).is_err());

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        let recorded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(recorded.len(), FRAME_SAMPLES * 2);
        assert_eq!(&recorded[..3], &[1234, -1234, 0]);

        let _ = std::fs::remove_file(path);
    }
}
