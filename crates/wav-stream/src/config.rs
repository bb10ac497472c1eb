/// Tuning parameters for a playback session.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Read-ahead slots in the chunk ring. Each slot holds about one second
    /// of audio, so this is also the read-ahead horizon in seconds.
    pub slot_count: usize,
    /// Initial output volume in percent (0–100).
    pub volume_percent: u8,
}

impl Default for PlayerConfig {
    /// Five seconds of read-ahead at half volume.
    fn default() -> Self {
        Self {
            slot_count: 5,
            volume_percent: 50,
        }
    }
}
