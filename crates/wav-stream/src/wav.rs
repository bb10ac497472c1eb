//! WAV container parsing.
//!
//! Validates the fixed 12-byte RIFF prologue, the canonical PCM `fmt `
//! subchunk, and the `data` subchunk header, yielding the stream format plus
//! the location of the raw sample payload. Parsing is strict and sequential:
//! each field is read exactly once, in order, and any mismatch fails closed
//! with a [`FormatError`] naming the offending value.
//!
//! Only the canonical 16-byte PCM `fmt ` layout is accepted; extensible
//! headers and any subchunks between `fmt ` and `data` are rejected rather
//! than skipped.

use std::io::Read;

use crate::error::{FormatError, LoadError};

/// Sample rates accepted by the parser.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44_100, 48_000];

/// Canonical size of the PCM `fmt ` subchunk body.
const PCM_FMT_SIZE: u32 = 16;

/// Minimum RIFF chunk size: "WAVE" + both required subchunks' fixed fields.
const MIN_RIFF_SIZE: u32 = 36;

/// Format code for linear PCM.
const FORMAT_PCM: u16 = 1;

/// Byte offset of the sample payload in a canonical PCM file:
/// 12-byte prologue + 24-byte `fmt ` subchunk + 8-byte `data` header.
const DATA_OFFSET: u64 = 44;

/// Immutable stream description extracted from the `fmt ` subchunk.
///
/// `byte_rate` and `block_align` are always the derived values
/// (`sample_rate * channels * bits/8` and `channels * bits/8`); construction
/// rejects headers whose stored fields disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub byte_rate: u32,
    pub block_align: u16,
}

impl StreamFormat {
    /// Validate the enumerated fields and derive byte rate and block
    /// alignment from them.
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Result<Self, FormatError> {
        if channels != 1 && channels != 2 {
            return Err(FormatError::UnsupportedChannels(channels));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(FormatError::UnsupportedSampleRate(sample_rate));
        }
        if bits_per_sample == 0 || bits_per_sample % 8 != 0 || bits_per_sample > 32 {
            return Err(FormatError::UnsupportedBitDepth(bits_per_sample));
        }

        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let block_align = channels * (bits_per_sample / 8);
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;

        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
            byte_rate,
            block_align,
        })
    }

    /// Bytes consumed per second of playback; also the read-ahead increment.
    pub fn bytes_per_second(&self) -> usize {
        self.byte_rate as usize
    }

    /// Playback duration of a payload of `len` bytes, in milliseconds.
    pub fn duration_ms(&self, len: u64) -> u64 {
        len.saturating_mul(1000) / u64::from(self.byte_rate)
    }
}

/// Position and length of the raw sample payload within the source.
///
/// `len` is reported as stored in the header; it is not checked against the
/// remaining source length, so a loader must tolerate a short final read.
/// Zero length is legal and yields end-of-stream on the first pull.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRegion {
    pub offset: u64,
    pub len: u64,
}

/// Parse and validate a WAV header, leaving `reader` positioned at the first
/// payload byte.
///
/// On success the source has advanced exactly [`DataRegion::offset`] bytes
/// and streaming can begin immediately. Structural mismatches return
/// [`LoadError::Format`]; a source that ends mid-field returns
/// [`LoadError::Io`].
pub fn parse_header<R: Read>(reader: &mut R) -> Result<(StreamFormat, DataRegion), LoadError> {
    // Prologue: "RIFF" <size> "WAVE".
    if read_tag(reader)? != *b"RIFF" {
        return Err(FormatError::BadRiffTag.into());
    }
    let riff_size = read_u32(reader)?;
    if riff_size < MIN_RIFF_SIZE {
        return Err(FormatError::BadRiffSize(riff_size).into());
    }
    if read_tag(reader)? != *b"WAVE" {
        return Err(FormatError::BadWaveTag.into());
    }

    // `fmt ` subchunk. The full four-byte tag is required, trailing space
    // included.
    if read_tag(reader)? != *b"fmt " {
        return Err(FormatError::BadFmtTag.into());
    }
    let fmt_size = read_u32(reader)?;
    if fmt_size != PCM_FMT_SIZE {
        return Err(FormatError::BadFmtSize(fmt_size).into());
    }
    let format_code = read_u16(reader)?;
    if format_code != FORMAT_PCM {
        return Err(FormatError::UnsupportedCodec(format_code).into());
    }
    let channels = read_u16(reader)?;
    let sample_rate = read_u32(reader)?;
    let stored_byte_rate = read_u32(reader)?;
    let stored_block_align = read_u16(reader)?;
    let bits_per_sample = read_u16(reader)?;

    let format = StreamFormat::new(sample_rate, channels, bits_per_sample)?;
    if stored_byte_rate != format.byte_rate {
        return Err(FormatError::ByteRateMismatch {
            stored: stored_byte_rate,
            derived: format.byte_rate,
        }
        .into());
    }
    if stored_block_align != format.block_align {
        return Err(FormatError::BlockAlignMismatch {
            stored: stored_block_align,
            derived: format.block_align,
        }
        .into());
    }

    // `data` subchunk header; the payload itself is left unread.
    if read_tag(reader)? != *b"data" {
        return Err(FormatError::BadDataTag.into());
    }
    let data_len = read_u32(reader)?;

    Ok((
        format,
        DataRegion {
            offset: DATA_OFFSET,
            len: u64::from(data_len),
        },
    ))
}

fn read_tag<R: Read>(reader: &mut R) -> std::io::Result<[u8; 4]> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag)?;
    Ok(tag)
}

fn read_u16<R: Read>(reader: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
