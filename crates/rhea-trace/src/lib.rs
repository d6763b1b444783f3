//! Per-trace lifecycle state machines and the compressed trace-file sink
//! that sit on top of `rhea-ring`'s lock-free transport.
//!
//! A [`TraceWriter`] owns the single consumer thread that scans the shared
//! ring, feeding reassembled records through a fan-out
//! [`MultiTraceLifecycleVisitor`] that routes each record to the
//! [`TraceLifecycleVisitor`] of the trace it belongs to. Completed traces
//! become DEFLATE-compressed, line-oriented log files; callers observe
//! progress through the [`Callbacks`] trait.

mod callbacks;
mod config;
mod delegate;
mod error;
mod headers;
mod lifecycle;
mod multi_trace;
mod priority;
mod writer;

pub use callbacks::{AbortReason, Callbacks, NullCallbacks};
pub use config::{Compression, Configuration};
pub use delegate::{RecordDelegate, StackFrameDeduper};
pub use error::TraceError;
pub use headers::TraceHeaders;
pub use lifecycle::TraceLifecycleVisitor;
pub use multi_trace::MultiTraceLifecycleVisitor;
pub use writer::TraceWriter;
