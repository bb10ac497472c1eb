//! Bounded ring of reusable chunk slots shared by one producer and one
//! consumer.
//!
//! The loader thread fills slots in write order; the playback side drains
//! them in the same order. Every slot is either `free` (drained, writable by
//! the producer) or `fresh` (written, unread); the free→fresh transition is
//! made only by the producer and fresh→free only by the consumer. All slot
//! flags and both indices live under a single [`Mutex`], and a single
//! [`Condvar`] serves as the "state changed" signal for both sides, so
//! producer backpressure and consumer waits never spin.
//!
//! A readiness latch delays the first pull until the producer has primed the
//! ring (N−1 slots filled, or the whole stream if it is shorter than that).
//! `close()` makes shutdown deterministic: it wakes all waiters, blocked
//! pulls return `None`, and blocked produces give up.

use std::sync::{Condvar, Mutex};

/// One increment of sample data withdrawn from the ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Raw interleaved PCM bytes; may be shorter than the increment size on
    /// the final read, and empty on the idempotent tail.
    pub data: Vec<u8>,
    /// Set on the chunk that carried end-of-source, and on every pull after.
    pub is_last: bool,
}

struct Slot {
    data: Vec<u8>,
    is_last: bool,
    fresh: bool,
}

struct RingState {
    slots: Vec<Slot>,
    write_idx: usize,
    read_idx: usize,
    /// Slots filled since creation; drives the priming threshold.
    produced: usize,
    /// Priming latch: set once, never cleared.
    ready: bool,
    /// Producer has written the chunk flagged `is_last`.
    finished: bool,
    /// Consumer has drained the chunk flagged `is_last`.
    exhausted: bool,
    /// Torn down; both sides give up instead of waiting.
    closed: bool,
}

impl RingState {
    fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.fresh).count()
    }
}

/// Fixed-capacity slot ring with blocking and non-blocking produce/consume.
pub struct ChunkRing {
    state: Mutex<RingState>,
    cv: Condvar,
    slot_capacity: usize,
}

impl ChunkRing {
    /// Create a ring of `slot_count` slots, each holding up to
    /// `slot_capacity` bytes. Buffers are allocated once, up front; a count
    /// below 2 is raised to 2 so the priming threshold stays meaningful.
    pub fn new(slot_count: usize, slot_capacity: usize) -> Self {
        let slot_count = slot_count.max(2);
        let slots = (0..slot_count)
            .map(|_| Slot {
                data: Vec::with_capacity(slot_capacity),
                is_last: false,
                fresh: false,
            })
            .collect();

        Self {
            state: Mutex::new(RingState {
                slots,
                write_idx: 0,
                read_idx: 0,
                produced: 0,
                ready: false,
                finished: false,
                exhausted: false,
                closed: false,
            }),
            cv: Condvar::new(),
            slot_capacity,
        }
    }

    /// Number of slots in the ring.
    pub fn slot_count(&self) -> usize {
        self.state.lock().unwrap().slots.len()
    }

    /// Per-slot byte capacity (the read-ahead increment size).
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// Fresh (written, unread) slots right now. Best-effort snapshot.
    pub fn occupied(&self) -> usize {
        self.state.lock().unwrap().occupied()
    }

    /// Write `bytes` into the next slot if it is free, without blocking.
    ///
    /// Returns `false` when the slot is still fresh (consumer lagging) or the
    /// ring is closed. `is_last` marks this as the stream's final chunk.
    pub fn try_produce(&self, bytes: &[u8], is_last: bool) -> bool {
        let mut g = self.state.lock().unwrap();
        if g.closed || g.slots[g.write_idx].fresh {
            return false;
        }
        self.fill_slot(&mut g, bytes, is_last);
        drop(g);
        self.cv.notify_all();
        true
    }

    /// Write `bytes` into the next slot, waiting while it is still fresh.
    ///
    /// This wait is the pipeline's backpressure: a slow consumer stalls the
    /// producer here instead of letting memory grow. Returns `false` if the
    /// ring was closed before the slot came free.
    pub fn produce(&self, bytes: &[u8], is_last: bool) -> bool {
        let mut g = self.state.lock().unwrap();
        while !g.closed && g.slots[g.write_idx].fresh {
            g = self.cv.wait(g).unwrap();
        }
        if g.closed {
            return false;
        }
        self.fill_slot(&mut g, bytes, is_last);
        drop(g);
        self.cv.notify_all();
        true
    }

    fn fill_slot(&self, g: &mut RingState, bytes: &[u8], is_last: bool) {
        debug_assert!(bytes.len() <= self.slot_capacity);
        let idx = g.write_idx;
        let slot = &mut g.slots[idx];
        slot.data.clear();
        slot.data.extend_from_slice(bytes);
        slot.is_last = is_last;
        slot.fresh = true;

        g.write_idx = (g.write_idx + 1) % g.slots.len();
        g.produced += 1;
        if is_last {
            g.finished = true;
        }
        // Priming: one slot short of full, or the whole (short) stream.
        if !g.ready && (g.produced >= g.slots.len() - 1 || g.finished) {
            g.ready = true;
        }
    }

    /// Withdraw the next chunk if one is fresh, without blocking.
    ///
    /// Intended for the real-time output callback. Returns `None` before the
    /// ring is primed, when the next slot is not fresh yet, after the stream
    /// is exhausted, and after teardown.
    pub fn try_consume(&self) -> Option<Chunk> {
        let mut g = self.state.lock().unwrap();
        if g.closed || !g.ready || g.exhausted {
            return None;
        }
        if !g.slots[g.read_idx].fresh {
            return None;
        }
        let chunk = self.drain_slot(&mut g);
        drop(g);
        self.cv.notify_all();
        Some(chunk)
    }

    /// Withdraw the next chunk, blocking first on the priming latch and then
    /// on slot availability.
    ///
    /// Once the chunk flagged `is_last` has been returned, every later call
    /// returns an empty chunk with `is_last = true` instead of blocking.
    /// Returns `None` only after [`ChunkRing::close`].
    pub fn pull(&self) -> Option<Chunk> {
        let mut g = self.state.lock().unwrap();
        while !g.closed && !g.ready {
            g = self.cv.wait(g).unwrap();
        }
        loop {
            if g.closed {
                return None;
            }
            if g.exhausted {
                // Idempotent tail.
                return Some(Chunk {
                    data: Vec::new(),
                    is_last: true,
                });
            }
            if g.slots[g.read_idx].fresh {
                let chunk = self.drain_slot(&mut g);
                drop(g);
                self.cv.notify_all();
                return Some(chunk);
            }
            // Raced ahead of the producer; wait for the next transition.
            g = self.cv.wait(g).unwrap();
        }
    }

    fn drain_slot(&self, g: &mut RingState) -> Chunk {
        let idx = g.read_idx;
        let slot = &mut g.slots[idx];
        let data = slot.data.clone();
        let is_last = slot.is_last;
        slot.fresh = false;

        g.read_idx = (g.read_idx + 1) % g.slots.len();
        if is_last {
            g.exhausted = true;
        } else if g.occupied() == 0 && !g.finished {
            tracing::debug!("chunk ring drained ahead of the loader");
        }
        Chunk { data, is_last }
    }

    /// Block until the ring is primed. Returns `false` if it was closed
    /// first (a failed load never reports readiness).
    pub fn wait_ready(&self) -> bool {
        let mut g = self.state.lock().unwrap();
        while !g.ready && !g.closed {
            g = self.cv.wait(g).unwrap();
        }
        g.ready && !g.closed
    }

    /// Whether the final chunk has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.state.lock().unwrap().exhausted
    }

    /// Whether the ring has been torn down.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Tear the ring down and wake every waiter.
    ///
    /// Blocked pulls return `None`, blocked produces return `false`, and the
    /// loader stops before its next read. Idempotent.
    pub fn close(&self) {
        let mut g = self.state.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Block until the final chunk has been consumed or the ring is closed.
    pub fn wait_until_exhausted(&self) {
        let mut g = self.state.lock().unwrap();
        while !g.exhausted && !g.closed {
            g = self.cv.wait(g).unwrap();
        }
    }
}
