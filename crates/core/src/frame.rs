//! Packing between s16le byte frames and the f32 working buffer.

use crate::constants::{FRAME_BYTES, FRAME_SAMPLES};
use anyhow::{bail, Result};

/// Returns one frame of digital silence.
pub fn silent_frame() -> Vec<u8> {
    vec![0u8; FRAME_BYTES]
}

/// Decodes an interleaved s16le frame into `out`.
///
/// Frames of any other length are rejected, never padded or truncated.
pub fn decode_frame(bytes: &[u8], out: &mut [f32]) -> Result<()> {
    if bytes.len() != FRAME_BYTES {
        bail!("Frame length mismatch: expected {} bytes, got {}", FRAME_BYTES, bytes.len());
    }
    if out.len() != FRAME_SAMPLES {
        bail!("Work buffer mismatch: expected {} samples, got {}", FRAME_SAMPLES, out.len());
    }
    for (sample, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *sample = i16::from_le_bytes([pair[0], pair[1]]) as f32;
    }
    Ok(())
}

/// Rounds and saturates a working sample to the 16-bit range.
#[inline]
pub fn clip_sample(sample: f32) -> i16 {
    // `as` saturates on overflow; NaN maps to 0
    sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Clips every sample and packs the result as s16le, replacing `out`'s contents.
pub fn encode_frame(samples: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&clip_sample(sample).to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_frame_length() {
        let frame = silent_frame();
        assert_eq!(frame.len(), FRAME_BYTES);
        assert!(frame.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_little_endian() {
        let mut bytes = silent_frame();
        bytes[0..2].copy_from_slice(&(-1234i16).to_le_bytes());
        bytes[2..4].copy_from_slice(&i16::MAX.to_le_bytes());
        let mut out = vec![0.0f32; FRAME_SAMPLES];
        decode_frame(&bytes, &mut out).unwrap();
        assert_eq!(out[0], -1234.0);
        assert_eq!(out[1], 32767.0);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        let mut out = vec![0.0f32; FRAME_SAMPLES];
        assert!(decode_frame(&[0u8; 100], &mut out).is_err());
        assert!(decode_frame(&vec![0u8; FRAME_BYTES + 2], &mut out).is_err());
    }

    #[test]
    fn test_clip_saturates_instead_of_wrapping() {
        assert_eq!(clip_sample(40000.0), i16::MAX);
        assert_eq!(clip_sample(-40000.0), i16::MIN);
        assert_eq!(clip_sample(32767.4), i16::MAX);
        assert_eq!(clip_sample(-32768.0), i16::MIN);
        assert_eq!(clip_sample(f32::INFINITY), i16::MAX);
        assert_eq!(clip_sample(f32::NAN), 0);
    }

    #[test]
    fn test_clip_rounds_to_nearest() {
        assert_eq!(clip_sample(99.6), 100);
        assert_eq!(clip_sample(-99.6), -100);
        assert_eq!(clip_sample(10.2), 10);
    }

    #[test]
    fn test_encode_packs_le_pairs() {
        let mut out = Vec::new();
        encode_frame(&[1.0, -2.0, 70000.0], &mut out);
        assert_eq!(out, vec![1, 0, 0xFE, 0xFF, 0xFF, 0x7F]);
    }
}
