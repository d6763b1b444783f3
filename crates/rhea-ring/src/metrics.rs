use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for the ring buffer's hot path.
///
/// Every field is an independent atomic updated with `Relaxed` ordering: these
/// are monitoring counters, not synchronization points, so there is nothing to
/// order against.
#[derive(Debug, Default)]
pub struct Metrics {
    packets_written: AtomicU64,
    packets_overwritten: AtomicU64,
    streams_started: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_write(&self) {
        self.packets_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stream_started(&self) {
        self.streams_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_overwrite(&self) {
        self.packets_overwritten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_written: self.packets_written.load(Ordering::Relaxed),
            packets_overwritten: self.packets_overwritten.load(Ordering::Relaxed),
            streams_started: self.streams_started.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Metrics`], safe to move across threads and print.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_written: u64,
    pub packets_overwritten: u64,
    pub streams_started: u64,
}
