//! Error taxonomy for loading a WAV source.
//!
//! Structural problems with the container are [`FormatError`]s; an unreadable
//! or truncated source surfaces as [`LoadError::Io`]. Callers can tell the two
//! apart and report the specific cause instead of aborting the process.

use thiserror::Error;

/// A structural or enumerated-value mismatch in the container header.
///
/// Each variant carries the offending value so the message names it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("not a RIFF container")]
    BadRiffTag,

    #[error("RIFF chunk too small: {0} bytes")]
    BadRiffSize(u32),

    #[error("missing WAVE format descriptor")]
    BadWaveTag,

    #[error("missing 'fmt ' subchunk")]
    BadFmtTag,

    #[error("unsupported fmt subchunk size: {0} bytes (only canonical PCM is supported)")]
    BadFmtSize(u32),

    #[error("unsupported audio format code: {0} (only linear PCM is supported)")]
    UnsupportedCodec(u16),

    #[error("unsupported channel count: {0} (only mono and stereo are supported)")]
    UnsupportedChannels(u16),

    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("stored byte rate {stored} does not match derived byte rate {derived}")]
    ByteRateMismatch { stored: u32, derived: u32 },

    #[error("stored block alignment {stored} does not match derived alignment {derived}")]
    BlockAlignMismatch { stored: u16, derived: u16 },

    #[error("missing 'data' subchunk")]
    BadDataTag,
}

/// Why a WAV source could not be opened for streaming.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The container is readable but structurally invalid.
    #[error("invalid WAV container: {0}")]
    Format(#[from] FormatError),

    /// The source is missing, unreadable, or ended mid-field.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
