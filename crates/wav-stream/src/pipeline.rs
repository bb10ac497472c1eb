//! Session wiring: parse → slot ring → loader thread → output stream.
//!
//! A [`Session`] owns the whole pipeline for one file. Construction parses
//! the header, spawns the loader, builds the output stream, and blocks until
//! the ring is primed, so by the time the caller gets a `Session` audio is
//! ready to flow. Teardown closes the ring, joins the loader, and stops the
//! stream, in that order.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::PlayerConfig;
use crate::device;
use crate::loader::{LoaderHandle, start_stream_loader};
use crate::playback::{SinkConfig, build_output_stream};
use crate::ring::ChunkRing;
use crate::wav::{StreamFormat, parse_header};

/// A running playback session for one WAV file.
pub struct Session {
    format: StreamFormat,
    duration_ms: u64,
    output_rate: u32,
    stream: cpal::Stream,
    ring: Arc<ChunkRing>,
    loader: Option<LoaderHandle>,
    paused: Arc<AtomicBool>,
    volume: Arc<AtomicU8>,
    played_frames: Arc<AtomicU64>,
    underrun_events: Arc<AtomicU64>,
    drained: Arc<AtomicBool>,
}

/// Parse `path`, spawn the loader, and start playing on `cpal_device`.
///
/// Parse failures come back as values ([`crate::error::LoadError`] under the
/// `anyhow` context), so a caller can report "unsupported sample rate:
/// 32000 Hz" versus "truncated file" instead of aborting. On any failure the
/// readiness latch is never observed set.
pub fn start_session(
    cpal_device: &cpal::Device,
    path: &Path,
    cfg: &PlayerConfig,
) -> Result<Session> {
    let mut file = File::open(path).with_context(|| format!("open {:?}", path))?;
    let (format, region) =
        parse_header(&mut file).with_context(|| format!("load {:?}", path))?;
    let duration_ms = format.duration_ms(region.len);
    tracing::info!(
        rate_hz = format.sample_rate,
        channels = format.channels,
        bits = format.bits_per_sample,
        payload_bytes = region.len,
        "source format"
    );

    let ring = Arc::new(ChunkRing::new(cfg.slot_count, format.bytes_per_second()));
    let loader = start_stream_loader(file, &format, &region, ring.clone());

    let supported = device::pick_output_config(cpal_device, Some(format.sample_rate))?;
    let mut stream_config: cpal::StreamConfig = supported.clone().into();
    if let Some(buf) = device::pick_buffer_size(&supported) {
        stream_config.buffer_size = buf;
    }
    tracing::info!(
        device = %cpal_device.description()?,
        rate_hz = stream_config.sample_rate,
        buffer_size = ?stream_config.buffer_size,
        "output config"
    );
    if stream_config.sample_rate != format.sample_rate {
        // No resampling stage: the device plays at its own rate.
        tracing::warn!(
            source_hz = format.sample_rate,
            output_hz = stream_config.sample_rate,
            "output rate differs from source; playback speed will be off"
        );
    }

    let paused = Arc::new(AtomicBool::new(false));
    let volume = Arc::new(AtomicU8::new(cfg.volume_percent.min(100)));
    let played_frames = Arc::new(AtomicU64::new(0));
    let underrun_frames = Arc::new(AtomicU64::new(0));
    let underrun_events = Arc::new(AtomicU64::new(0));
    let drained = Arc::new(AtomicBool::new(false));

    let stream = build_output_stream(
        cpal_device,
        &stream_config,
        supported.sample_format(),
        &ring,
        &format,
        SinkConfig {
            paused: Some(paused.clone()),
            volume_percent: Some(volume.clone()),
            played_frames: Some(played_frames.clone()),
            underrun_frames: Some(underrun_frames.clone()),
            underrun_events: Some(underrun_events.clone()),
            drained: Some(drained.clone()),
        },
    )?;

    // Hold the sink back until the loader has built its read-ahead lead.
    if !ring.wait_ready() {
        return Err(anyhow!("stream loader stopped before priming"));
    }
    stream.play()?;

    Ok(Session {
        format,
        duration_ms,
        output_rate: stream_config.sample_rate,
        stream,
        ring,
        loader: Some(loader),
        paused,
        volume,
        played_frames,
        underrun_events,
        drained,
    })
}

impl Session {
    /// Source stream format, as parsed.
    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Total playback duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Elapsed playback time in milliseconds, from frames the device has
    /// actually consumed.
    pub fn elapsed_ms(&self) -> u64 {
        if self.output_rate == 0 {
            return 0;
        }
        self.played_frames
            .load(Ordering::Relaxed)
            .saturating_mul(1000)
            / u64::from(self.output_rate)
    }

    /// Flip pause and return the new state (`true` = paused).
    pub fn toggle_pause(&self) -> bool {
        let was = self.paused.fetch_xor(true, Ordering::Relaxed);
        !was
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Current volume in percent.
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Raise volume by 10 points, clamped to 100. Returns the new value.
    pub fn volume_up(&self) -> u8 {
        self.adjust_volume(10)
    }

    /// Lower volume by 10 points, clamped to 0. Returns the new value.
    pub fn volume_down(&self) -> u8 {
        self.adjust_volume(-10)
    }

    fn adjust_volume(&self, delta: i16) -> u8 {
        let current = i16::from(self.volume.load(Ordering::Relaxed));
        let next = (current + delta).clamp(0, 100) as u8;
        self.volume.store(next, Ordering::Relaxed);
        next
    }

    /// Whether the stream has been fully played out: the ring is exhausted
    /// and the sink has drained its staged tail.
    pub fn finished(&self) -> bool {
        self.drained.load(Ordering::Relaxed)
    }

    /// Underrun incidents observed by the output callback.
    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }

    /// Tear the session down: stop the loader, silence the device, release
    /// the slots. Any pull issued against the ring afterwards fails
    /// explicitly instead of blocking.
    pub fn stop(mut self) {
        self.ring.close();
        if let Some(loader) = self.loader.take() {
            loader.stop();
        }
        let _ = self.stream.pause();
    }
}
