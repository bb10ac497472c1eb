//! wavplay — a small CLI player for uncompressed PCM WAV files.
//!
//! ## Pipeline
//! 1. **Parse**: the WAV header is validated strictly; only canonical PCM
//!    containers are accepted.
//! 2. **Load**: a background thread reads the payload in ~1-second chunks
//!    into a bounded slot ring, staying a few seconds ahead of playback.
//! 3. **Playback**: the CPAL callback withdraws chunks without blocking,
//!    decodes them to `f32`, and writes to the device.
//!
//! Playback starts only after the ring is primed, and a slow consumer stalls
//! the disk reader instead of growing memory.

mod cli;
mod console;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use cpal::traits::DeviceTrait;
use tracing_subscriber::EnvFilter;

use wav_stream::config::PlayerConfig;
use wav_stream::{device, pipeline};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wavplay=info")),
        )
        .init();

    let host = cpal::default_host();

    if args.list_devices {
        device::list_devices(&host)?;
        return Ok(());
    }

    let Some(path) = args.path else {
        bail!("a file path is required");
    };

    let device = device::pick_device(&host, args.device.as_deref())?;
    tracing::info!(device = %device.description()?, "output device");

    let cfg = PlayerConfig {
        slot_count: args.slots,
        volume_percent: args.volume.min(100),
    };
    let session = pipeline::start_session(&device, &path, &cfg)?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed));
    }

    let format = session.format();
    println!(
        "Playing {} ({}, {} Hz, {}-bit)",
        path.display(),
        if format.channels == 1 { "mono" } else { "stereo" },
        format.sample_rate,
        format.bits_per_sample,
    );
    println!("Audio duration: {}", console::fmt_time(session.duration_ms()));
    println!("Controls: space pause/resume, up/down volume, q quit");

    console::run(&session, &cancel)?;

    if session.underrun_events() > 0 {
        tracing::warn!(events = session.underrun_events(), "playback underruns");
    }

    // Give the device a moment to flush its last callback.
    std::thread::sleep(Duration::from_millis(100));
    session.stop();
    Ok(())
}
