use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "wavplay", version)]
pub struct Args {
    /// Path to a PCM WAV file
    #[arg(required_unless_present = "list_devices")]
    pub path: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Read-ahead slots in the chunk ring (each holds ~1s of audio)
    #[arg(long, default_value_t = 5)]
    pub slots: usize,

    /// Initial volume in percent (0-100)
    #[arg(long, default_value_t = 50)]
    pub volume: u8,
}
