//! Streaming loader stage.
//!
//! Reads the sample payload sequentially in byte-rate-sized increments (about
//! one second of audio per chunk, so the read-ahead horizon is playback time,
//! not a fixed byte count) and blocking-produces each increment into the
//! [`ChunkRing`] from a background thread.

use std::io::Read;
use std::sync::Arc;
use std::thread;

use crate::ring::ChunkRing;
use crate::wav::{DataRegion, StreamFormat};

/// Handle to the loader thread.
///
/// Dropping the handle closes the ring first, so the thread can never be
/// joined while parked on a full slot.
pub struct LoaderHandle {
    ring: Arc<ChunkRing>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LoaderHandle {
    /// Signal the loader to stop before its next read and reap the thread.
    pub fn stop(mut self) {
        self.ring.close();
        self.join_inner();
    }

    /// Reap a loader that has finished naturally (the ring reached its final
    /// chunk).
    pub fn join(mut self) {
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LoaderHandle {
    fn drop(&mut self) {
        self.ring.close();
        self.join_inner();
    }
}

/// Spawn the loader thread over a source positioned at the first payload
/// byte (where [`crate::wav::parse_header`] leaves it).
///
/// The thread runs until the region is exhausted, the source errors, or the
/// ring is closed. A mid-stream read error flags the bytes read so far as the
/// final chunk so the consumer drains gracefully instead of hanging.
pub fn start_stream_loader<R>(
    source: R,
    format: &StreamFormat,
    region: &DataRegion,
    ring: Arc<ChunkRing>,
) -> LoaderHandle
where
    R: Read + Send + 'static,
{
    let increment = format.bytes_per_second();
    debug_assert!(ring.slot_capacity() >= increment);

    let ring_for_thread = ring.clone();
    let remaining = region.len;
    let handle = thread::spawn(move || {
        loader_main(source, increment, remaining, &ring_for_thread);
    });

    LoaderHandle {
        ring,
        handle: Some(handle),
    }
}

fn loader_main<R: Read>(mut source: R, increment: usize, mut remaining: u64, ring: &ChunkRing) {
    let mut buf = vec![0u8; increment];

    loop {
        let want = remaining.min(increment as u64) as usize;
        let (got, read_err) = read_full(&mut source, &mut buf[..want]);
        remaining -= got as u64;

        if let Some(e) = read_err {
            tracing::warn!("payload read failed, ending stream early: {e}");
            ring.produce(&buf[..got], true);
            return;
        }

        // A short read means the source ended before the header's length.
        let last = got < want || remaining == 0;
        if !ring.produce(&buf[..got], last) {
            tracing::debug!("chunk ring closed, loader stopping");
            return;
        }
        if last {
            return;
        }
    }
}

/// Read until `buf` is full or the source reaches end-of-file.
///
/// Returns the byte count actually read, plus the error if the source failed
/// partway (the bytes read before the failure are still valid).
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> (usize, Option<std::io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn format_mono_16() -> StreamFormat {
        StreamFormat::new(44_100, 1, 16).unwrap()
    }

    fn region(len: u64) -> DataRegion {
        DataRegion { offset: 44, len }
    }

    fn ring_for(format: &StreamFormat, slots: usize) -> Arc<ChunkRing> {
        Arc::new(ChunkRing::new(slots, format.bytes_per_second()))
    }

    /// Drain every chunk, returning (per-chunk sizes, total payload bytes).
    fn drain(ring: &ChunkRing) -> (Vec<usize>, u64) {
        let mut sizes = Vec::new();
        let mut total = 0u64;
        loop {
            let chunk = ring.pull().unwrap();
            total += chunk.data.len() as u64;
            if !chunk.data.is_empty() {
                sizes.push(chunk.data.len());
            }
            if chunk.is_last {
                return (sizes, total);
            }
        }
    }

    #[test]
    fn three_second_payload_drains_in_three_chunks() {
        let format = format_mono_16();
        let increment = format.bytes_per_second();
        let payload: Vec<u8> = (0..increment * 3).map(|n| (n % 251) as u8).collect();

        let ring = ring_for(&format, 5);
        let loader = start_stream_loader(
            Cursor::new(payload.clone()),
            &format,
            &region(payload.len() as u64),
            ring.clone(),
        );

        let mut collected = Vec::new();
        let mut chunks = 0;
        loop {
            let chunk = ring.pull().unwrap();
            chunks += 1;
            collected.extend_from_slice(&chunk.data);
            if chunk.is_last {
                break;
            }
        }
        loader.join();

        assert_eq!(chunks, 3);
        assert_eq!(collected, payload);
    }

    #[test]
    fn partial_final_chunk_is_flagged() {
        let format = format_mono_16();
        let increment = format.bytes_per_second();
        let payload = vec![0x5Au8; increment + increment / 2];

        let ring = ring_for(&format, 5);
        let loader = start_stream_loader(
            Cursor::new(payload.clone()),
            &format,
            &region(payload.len() as u64),
            ring.clone(),
        );

        let (sizes, total) = drain(&ring);
        loader.join();

        assert_eq!(sizes, vec![increment, increment / 2]);
        assert_eq!(total, payload.len() as u64);
    }

    #[test]
    fn zero_length_region_yields_one_empty_last_pull() {
        let format = format_mono_16();
        let ring = ring_for(&format, 5);
        let loader = start_stream_loader(Cursor::new(vec![]), &format, &region(0), ring.clone());

        let chunk = ring.pull().unwrap();
        assert!(chunk.data.is_empty());
        assert!(chunk.is_last);
        loader.join();

        // Idempotent tail after the stream ends.
        let tail = ring.pull().unwrap();
        assert!(tail.data.is_empty());
        assert!(tail.is_last);
    }

    #[test]
    fn short_source_ends_stream_at_actual_length() {
        // Header claims 4 seconds but the file holds 1.25; the loader must
        // flag the short read as final instead of erroring.
        let format = format_mono_16();
        let increment = format.bytes_per_second();
        let payload = vec![1u8; increment + increment / 4];

        let ring = ring_for(&format, 5);
        let loader = start_stream_loader(
            Cursor::new(payload.clone()),
            &format,
            &region(increment as u64 * 4),
            ring.clone(),
        );

        let (sizes, total) = drain(&ring);
        loader.join();

        assert_eq!(sizes, vec![increment, increment / 4]);
        assert_eq!(total, payload.len() as u64);
    }

    #[test]
    fn read_error_marks_stream_final() {
        struct FailingSource {
            served: usize,
            limit: usize,
        }

        impl Read for FailingSource {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.served >= self.limit {
                    return Err(std::io::Error::other("disk pulled"));
                }
                let n = buf.len().min(self.limit - self.served);
                buf[..n].fill(7);
                self.served += n;
                Ok(n)
            }
        }

        let format = format_mono_16();
        let increment = format.bytes_per_second();
        let source = FailingSource {
            served: 0,
            limit: increment / 2,
        };

        let ring = ring_for(&format, 5);
        let loader =
            start_stream_loader(source, &format, &region(increment as u64 * 10), ring.clone());

        // The half-read chunk arrives flagged final; no hang, no byte loss.
        let chunk = ring.pull().unwrap();
        assert_eq!(chunk.data.len(), increment / 2);
        assert!(chunk.is_last);
        loader.join();
    }

    #[test]
    fn stop_interrupts_a_backpressured_loader() {
        let format = format_mono_16();
        let increment = format.bytes_per_second();
        // Ten seconds of payload into a three-slot ring with no consumer:
        // the loader parks on backpressure until stop() closes the ring.
        let payload = vec![0u8; increment * 10];

        let ring = Arc::new(ChunkRing::new(3, increment));
        let loader = start_stream_loader(
            Cursor::new(payload),
            &format,
            &region((increment * 10) as u64),
            ring.clone(),
        );

        ring.wait_ready();
        loader.stop();
        assert!(ring.is_closed());
        assert!(ring.pull().is_none());
    }

    #[test]
    fn streams_payload_from_a_file_on_disk() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let samples: Vec<i16> = (0..22_050).map(|n| (n % 600) as i16).collect();
        for &s in &samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let mut file = std::fs::File::open(&path).unwrap();
        let (format, region) = crate::wav::parse_header(&mut file).unwrap();

        let ring = ring_for(&format, 5);
        let loader = start_stream_loader(file, &format, &region, ring.clone());

        let mut collected = Vec::new();
        loop {
            let chunk = ring.pull().unwrap();
            collected.extend_from_slice(&chunk.data);
            if chunk.is_last {
                break;
            }
        }
        loader.join();

        let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn read_full_tolerates_interrupted_reads() {
        struct Choppy {
            data: Vec<u8>,
            pos: usize,
            hiccuped: bool,
        }

        impl Read for Choppy {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if !self.hiccuped {
                    self.hiccuped = true;
                    return Err(std::io::Error::from(std::io::ErrorKind::Interrupted));
                }
                let n = buf.len().min(2).min(self.data.len() - self.pos);
                buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }

        let mut source = Choppy {
            data: vec![1, 2, 3, 4, 5],
            pos: 0,
            hiccuped: false,
        };
        let mut buf = [0u8; 5];
        let (got, err) = read_full(&mut source, &mut buf);
        assert_eq!(got, 5);
        assert!(err.is_none());
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }
}
