use std::collections::HashSet;
use std::path::PathBuf;

/// Compression applied to a trace file's body before it is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Deflate,
    None,
}

impl Compression {
    /// File suffix appended after `.log` for a file written with this
    /// compression kind.
    pub const fn suffix(self) -> &'static str {
        match self {
            Compression::Deflate => ".gz",
            Compression::None => "",
        }
    }
}

/// Runtime configuration for the trace subsystem.
///
/// Mirrors the recognised options and defaults of the upstream collector
/// configuration: a 1000-slot ring, deflate-compressed output, a 10-second
/// backwards-replay window, and per-subsystem category toggles that gate
/// which producers are expected to be active (consumed by callers wiring up
/// hooks, not enforced by this crate).
#[derive(Debug, Clone)]
pub struct Configuration {
    pub buffer_slots: usize,
    pub trace_folder: PathBuf,
    pub trace_prefix: String,
    pub compression: Compression,
    pub timestamp_precision: u8,
    pub backdating_window_us: u64,
    pub categories: HashSet<String>,
    pub main_thread_only: bool,
    pub enable_io: bool,
    pub enable_memory: bool,
    pub enable_class_load: bool,
    pub enable_thread: bool,
    pub enable_binder: bool,
    pub enable_detail_render: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            buffer_slots: 1000,
            trace_folder: std::env::temp_dir(),
            trace_prefix: "rhea".to_string(),
            compression: Compression::Deflate,
            timestamp_precision: 6,
            backdating_window_us: 10_000_000,
            categories: HashSet::new(),
            main_thread_only: false,
            enable_io: true,
            enable_memory: true,
            enable_class_load: true,
            enable_thread: true,
            enable_binder: true,
            enable_detail_render: true,
        }
    }
}
