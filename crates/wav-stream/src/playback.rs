//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - stages one chunk at a time, withdrawn from the ring without blocking
//! - decodes little-endian PCM bytes to `f32` at the source bit depth
//! - applies mono↔stereo mapping and the session volume
//! - converts to the device sample format, filling underruns with silence

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::ring::ChunkRing;
use crate::wav::StreamFormat;

/// Shared handles wired into the output callback.
#[derive(Clone, Debug, Default)]
pub struct SinkConfig {
    /// When `true`, the callback outputs silence and does **not** drain the
    /// ring, so pause never skips ahead.
    pub paused: Option<Arc<AtomicBool>>,

    /// Output volume in percent (0–100), applied per sample.
    pub volume_percent: Option<Arc<AtomicU8>>,

    /// Incremented by the number of output frames produced.
    pub played_frames: Option<Arc<AtomicU64>>,

    /// Incremented when the callback has to output silence mid-stream.
    pub underrun_frames: Option<Arc<AtomicU64>>,
    pub underrun_events: Option<Arc<AtomicU64>>,

    /// Set once the ring is exhausted and the staged tail has been played.
    pub drained: Option<Arc<AtomicBool>>,
}

/// Build a CPAL output stream that plays PCM chunks from `ring`.
///
/// The ring carries raw interleaved bytes in the source format; all decoding
/// happens in the callback. The callback never blocks on the ring and never
/// waits on a condition variable.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: &Arc<ChunkRing>,
    src: &StreamFormat,
    cfg: SinkConfig,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring, src, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring, src, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring, src, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring, src, cfg),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<ChunkRing>,
    src: &StreamFormat,
    cfg: SinkConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;

    let state = Arc::new(Mutex::new(SinkState::new(src)));
    let ring_cb = ring.clone();
    let paused_flag = cfg.paused.clone();
    let volume = cfg.volume_percent.clone();
    let played_frames = cfg.played_frames.clone();
    let underrun_frames = cfg.underrun_frames.clone();
    let underrun_events = cfg.underrun_events.clone();
    let drained = cfg.drained.clone();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let state_cb = state.clone();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if let Some(p) = &paused_flag {
                if p.load(Ordering::Relaxed) {
                    data.fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                    return;
                }
            }

            let gain = volume
                .as_ref()
                .map(|v| f32::from(v.load(Ordering::Relaxed).min(100)) / 100.0)
                .unwrap_or(1.0);

            let mut st = state_cb.lock().unwrap();
            let frames = data.len() / channels_out;
            let mut filled_frames = 0usize;

            for frame in 0..frames {
                if !st.ensure_frame(&ring_cb) {
                    // Nothing staged and nothing fresh in the ring.
                    if ring_cb.is_exhausted() {
                        if let Some(flag) = &drained {
                            flag.store(true, Ordering::Relaxed);
                        }
                    } else {
                        if let Some(events) = &underrun_events {
                            events.fetch_add(1, Ordering::Relaxed);
                        }
                        if let Some(counter) = &underrun_frames {
                            let remaining = frames.saturating_sub(frame);
                            counter.fetch_add(remaining as u64, Ordering::Relaxed);
                        }
                    }
                    for idx in (frame * channels_out)..data.len() {
                        data[idx] = <T as cpal::Sample>::from_sample::<f32>(0.0);
                    }
                    break;
                }

                for ch in 0..channels_out {
                    let sample = st.mapped_sample(channels_out, ch) * gain;
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample);
                }
                st.advance_frame();
                filled_frames += 1;
            }

            if filled_frames > 0 {
                if let Some(counter) = &played_frames {
                    counter.fetch_add(filled_frames as u64, Ordering::Relaxed);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Staging state for the output callback: the chunk currently being played
/// and the cursor into it.
struct SinkState {
    chunk: Vec<u8>,
    pos: usize,
    src_channels: usize,
    bytes_per_sample: usize,
    block_align: usize,
    bits: u16,
}

impl SinkState {
    fn new(src: &StreamFormat) -> Self {
        Self {
            chunk: Vec::new(),
            pos: 0,
            src_channels: usize::from(src.channels),
            bytes_per_sample: usize::from(src.bits_per_sample / 8),
            block_align: usize::from(src.block_align),
            bits: src.bits_per_sample,
        }
    }

    /// Make sure a whole source frame is staged, restocking from the ring if
    /// needed. Trailing bytes shorter than a frame (truncated source) are
    /// dropped. Returns `false` when no frame is available right now.
    fn ensure_frame(&mut self, ring: &ChunkRing) -> bool {
        loop {
            if self.pos + self.block_align <= self.chunk.len() {
                return true;
            }
            match ring.try_consume() {
                Some(next) => {
                    let last = next.is_last;
                    self.chunk = next.data;
                    self.pos = 0;
                    if last && self.chunk.len() < self.block_align {
                        return false;
                    }
                }
                None => return false,
            }
        }
    }

    /// Decode channel `ch` of the staged frame.
    fn src_sample(&self, ch: usize) -> f32 {
        let at = self.pos + ch * self.bytes_per_sample;
        decode_sample(&self.chunk[at..at + self.bytes_per_sample], self.bits)
    }

    /// Map the staged frame onto output channel `dst_ch`.
    ///
    /// mono→stereo duplicates, stereo→mono averages, anything else clamps to
    /// the available channels.
    fn mapped_sample(&self, dst_channels: usize, dst_ch: usize) -> f32 {
        match (self.src_channels, dst_channels) {
            (1, 1) => self.src_sample(0),
            (2, 2) => self.src_sample(dst_ch.min(1)),
            (2, 1) => 0.5 * (self.src_sample(0) + self.src_sample(1)),
            (1, 2) => self.src_sample(0),
            _ => self.src_sample(dst_ch.min(self.src_channels.saturating_sub(1))),
        }
    }

    fn advance_frame(&mut self) {
        self.pos += self.block_align;
    }
}

/// Decode one little-endian PCM sample to `f32` in [-1, 1].
///
/// 8-bit WAV samples are unsigned around 128; wider depths are signed.
fn decode_sample(bytes: &[u8], bits: u16) -> f32 {
    match bits {
        8 => (f32::from(bytes[0]) - 128.0) / 128.0,
        16 => f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32_768.0,
        24 => {
            let v = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            v as f32 / 8_388_608.0
        }
        32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_16_bit_extremes() {
        assert_eq!(decode_sample(&i16::MAX.to_le_bytes(), 16), 32_767.0 / 32_768.0);
        assert_eq!(decode_sample(&i16::MIN.to_le_bytes(), 16), -1.0);
        assert_eq!(decode_sample(&0i16.to_le_bytes(), 16), 0.0);
    }

    #[test]
    fn decode_8_bit_is_unsigned_centered() {
        assert_eq!(decode_sample(&[128], 8), 0.0);
        assert_eq!(decode_sample(&[0], 8), -1.0);
        assert!(decode_sample(&[255], 8) > 0.99);
    }

    #[test]
    fn decode_24_bit_sign_extends() {
        // -1 in 24-bit two's complement.
        assert!((decode_sample(&[0xFF, 0xFF, 0xFF], 24) + 1.0 / 8_388_608.0).abs() < 1e-9);
        // Most negative value.
        assert_eq!(decode_sample(&[0x00, 0x00, 0x80], 24), -1.0);
    }

    #[test]
    fn decode_32_bit_extremes() {
        assert_eq!(decode_sample(&i32::MIN.to_le_bytes(), 32), -1.0);
        assert_eq!(decode_sample(&0i32.to_le_bytes(), 32), 0.0);
    }

    fn stereo_16_state() -> SinkState {
        SinkState::new(&StreamFormat::new(48_000, 2, 16).unwrap())
    }

    fn mono_16_state() -> SinkState {
        SinkState::new(&StreamFormat::new(48_000, 1, 16).unwrap())
    }

    fn frame_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn mono_source_duplicates_to_stereo() {
        let mut st = mono_16_state();
        st.chunk = frame_bytes(&[8_192]);
        let left = st.mapped_sample(2, 0);
        let right = st.mapped_sample(2, 1);
        assert_eq!(left, right);
        assert_eq!(left, 0.25);
    }

    #[test]
    fn stereo_source_averages_to_mono() {
        let mut st = stereo_16_state();
        st.chunk = frame_bytes(&[16_384, -16_384]);
        assert_eq!(st.mapped_sample(1, 0), 0.0);
    }

    #[test]
    fn ensure_frame_restocks_from_ring_and_drops_partial_tail() {
        let ring = ChunkRing::new(2, 16);
        // One full stereo frame plus a dangling odd byte, flagged final.
        let mut bytes = frame_bytes(&[100, -100]);
        bytes.push(0xEE);
        assert!(ring.try_produce(&bytes, true));

        let mut st = stereo_16_state();
        assert!(st.ensure_frame(&ring));
        st.advance_frame();
        // Only the partial tail remains; it must be discarded, not decoded.
        assert!(!st.ensure_frame(&ring));
        assert!(ring.is_exhausted());
    }

    #[test]
    fn ensure_frame_reports_empty_ring() {
        let ring = ChunkRing::new(2, 4);
        let mut st = mono_16_state();
        assert!(!st.ensure_frame(&ring));
    }
}
