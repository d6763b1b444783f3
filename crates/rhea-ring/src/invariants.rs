//! Debug assertion macros for the ring buffer, packet, and codec invariants.
//!
//! These macros provide runtime checks for invariants documented alongside the
//! functions that use them. They are only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release builds.

// =============================================================================
// INV-RING-01: Slot size is cache-line aligned
// =============================================================================

/// Assert that a ring slot's size is a multiple of the cache line (64 bytes),
/// so adjacent slots never share a cache line with their neighbor's turn
/// counter.
///
/// Used in: `RingBuffer::new()` (checked once, not per-write).
macro_rules! debug_assert_slot_cache_aligned {
    ($size:expr) => {
        debug_assert!(
            $size % 64 == 0,
            "INV-RING-01 violated: slot size {} is not a multiple of 64",
            $size
        )
    };
}

// =============================================================================
// INV-RING-02: Turn parity
// =============================================================================

/// Assert that a published turn counter is odd (a slot is only readable once
/// its writer has finished the store that makes it odd).
///
/// Used in: `RingBuffer::write()` after publication.
macro_rules! debug_assert_turn_odd {
    ($turn:expr) => {
        debug_assert!($turn % 2 == 1, "INV-RING-02 violated: published turn {} is even", $turn)
    };
}

// =============================================================================
// INV-PKT-01: Packet payload bound
// =============================================================================

/// Assert a packet's declared size never exceeds the data area.
macro_rules! debug_assert_packet_size_bound {
    ($size:expr, $max:expr) => {
        debug_assert!(
            $size as usize <= $max,
            "INV-PKT-01 violated: packet size {} exceeds data area {}",
            $size,
            $max
        )
    };
}

// =============================================================================
// INV-CODEC-01: Packed size matches calculated size
// =============================================================================

/// Assert that the number of bytes actually written equals `calculate_size`.
macro_rules! debug_assert_packed_len {
    ($written:expr, $expected:expr) => {
        debug_assert!(
            $written == $expected,
            "INV-CODEC-01 violated: wrote {} bytes, calculate_size predicted {}",
            $written,
            $expected
        )
    };
}

// =============================================================================
// INV-REASM-01: Bounded active-stream set
// =============================================================================

/// Assert the reassembler's free-list pool never exceeds its configured cap.
macro_rules! debug_assert_pool_bound {
    ($len:expr, $cap:expr) => {
        debug_assert!($len <= $cap, "INV-REASM-01 violated: pool holds {} buffers, cap is {}", $len, $cap)
    };
}

pub(crate) use debug_assert_packed_len;
pub(crate) use debug_assert_packet_size_bound;
pub(crate) use debug_assert_pool_bound;
pub(crate) use debug_assert_slot_cache_aligned;
pub(crate) use debug_assert_turn_odd;
