use std::collections::HashSet;
use std::path::Path;

/// Why a trace's lifecycle ended without reaching `TraceEnd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    IoError,
    Timeout,
    /// The writer's forward scan ran out of readable ring slots (two
    /// consecutive `try_read` misses) before this trace's `TRACE_END`/
    /// `TRACE_ABORT` ever appeared - overwritten or never produced.
    BufferExhausted,
    External(String),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::IoError => write!(f, "I/O error"),
            AbortReason::Timeout => write!(f, "timeout"),
            AbortReason::BufferExhausted => write!(f, "ring buffer exhausted before trace completed"),
            AbortReason::External(reason) => write!(f, "external: {reason}"),
        }
    }
}

/// Observer invoked from the writer thread as traces progress through their
/// lifecycle. All methods have no-op defaults - implementers override only
/// the events they care about. `rhea_trace` invokes these synchronously from
/// a single thread; an implementation must not block it for long.
pub trait Callbacks: Send + Sync {
    fn on_trace_start(&self, _trace_id: i32) {}

    fn on_trace_end(&self, _trace_id: i32, _path: &Path) {}

    fn on_trace_abort(&self, _trace_id: i32, _reason: &AbortReason) {}

    fn on_trace_write_exception(&self, _trace_id: i32, _err: &crate::TraceError) {}

    /// Carries the final file content, for callers that want it in memory
    /// rather than (or in addition to) reading it back from disk.
    fn on_data_ready(&self, _trace_id: i32, _data: &[u8]) {}

    /// Fires once per `TraceWriter::process_trace` scan, naming every trace
    /// id that scan admitted (whether or not it has finished yet).
    fn on_scan_complete(&self, _consumed_trace_ids: &HashSet<i32>) {}
}

/// A `Callbacks` that does nothing; the default observer when none is
/// supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCallbacks;

impl Callbacks for NullCallbacks {}
