//! Loom-based concurrency tests for the turn-counter ring protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom exhaustively explores all possible thread interleavings to find
//! concurrency bugs that might only occur under specific scheduling. The
//! real `RingBuffer` is generic and heap-sized in a way loom cannot model
//! directly (loom replaces `std::sync`/`std::cell` with instrumented
//! equivalents at the type level), so these tests reimplement the same
//! turn-counter protocol at a fixed, tiny capacity.

#![cfg(feature = "loom")]

use loom::cell::UnsafeCell;
use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;

const CAPACITY: usize = 2;

struct LoomRing {
    write_counter: AtomicU64,
    turns: [AtomicU64; CAPACITY],
    data: [UnsafeCell<u64>; CAPACITY],
}

unsafe impl Send for LoomRing {}
unsafe impl Sync for LoomRing {}

impl LoomRing {
    fn new() -> Self {
        Self {
            write_counter: AtomicU64::new(0),
            turns: [AtomicU64::new(0), AtomicU64::new(0)],
            data: [UnsafeCell::new(0), UnsafeCell::new(0)],
        }
    }

    fn turn_for(pos: u64) -> u64 {
        let generation = pos / CAPACITY as u64;
        generation * 2 + 1
    }

    fn write(&self, value: u64) -> u64 {
        let pos = self.write_counter.fetch_add(1, Ordering::Relaxed);
        let idx = (pos as usize) % CAPACITY;

        self.data[idx].with_mut(|d| unsafe { *d = value });

        let turn = Self::turn_for(pos);
        self.turns[idx].store(turn, Ordering::Release);
        pos
    }

    fn try_read(&self, pos: u64) -> Option<u64> {
        let idx = (pos as usize) % CAPACITY;
        let expected = Self::turn_for(pos);
        let turn = self.turns[idx].load(Ordering::Acquire);
        if turn != expected {
            return None;
        }
        Some(self.data[idx].with(|d| unsafe { *d }))
    }
}

/// Two producers racing for distinct positions never corrupt each other's
/// slot: whatever the consumer reads back for a position it successfully
/// matches the turn for is the value that producer wrote, never a torn or
/// partially-published value.
#[test]
fn loom_two_producers_no_torn_reads() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let r1 = Arc::clone(&ring);
        let r2 = Arc::clone(&ring);

        let p1 = thread::spawn(move || r1.write(111));
        let p2 = thread::spawn(move || r2.write(222));

        let pos1 = p1.join().unwrap();
        let pos2 = p2.join().unwrap();
        assert_ne!(pos1, pos2, "fetch_add must hand out distinct positions");

        let v1 = ring.try_read(pos1);
        let v2 = ring.try_read(pos2);
        // Either read may have been overtaken by the other producer wrapping
        // around (not possible at this small write count, but the protocol
        // makes no stronger promise), so only assert on whichever is Some.
        if let Some(v) = v1 {
            assert_eq!(v, 111);
        }
        if let Some(v) = v2 {
            assert_eq!(v, 222);
        }
    });
}

/// A consumer racing a producer's write to the same slot either sees the
/// fully published value (turn matches) or correctly detects it is not
/// ready yet (turn mismatch) - never a half-written value.
#[test]
fn loom_consumer_never_observes_partial_write() {
    loom::model(|| {
        let ring = Arc::new(LoomRing::new());
        let producer_ring = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            producer_ring.write(99);
        });

        // Consumer polls position 0 concurrently with the producer claiming it.
        let observed = ring.try_read(0);
        if let Some(v) = observed {
            assert_eq!(v, 99, "a matching turn must mean the full value is visible");
        }

        producer.join().unwrap();
        assert_eq!(ring.try_read(0), Some(99));
    });
}
