use rhea_ring::CodecError;

/// Errors surfaced by the trace-writing path.
///
/// Producer-side codec/logger errors never reach here - C3/C4 convert those
/// to drops at the hook boundary (see `rhea_ring::LoggerError`,
/// `rhea_ring::CodecError`). This enum covers what can go wrong once a
/// record has been reassembled and handed to a lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("I/O error writing trace file for trace {trace_id}: {source}")]
    Io {
        trace_id: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognised entry type in reassembled record: {0}")]
    UnknownType(#[from] CodecError),
}

impl TraceError {
    pub fn trace_id(&self) -> Option<i32> {
        match self {
            TraceError::Io { trace_id, .. } => Some(*trace_id),
            TraceError::UnknownType(_) => None,
        }
    }
}
