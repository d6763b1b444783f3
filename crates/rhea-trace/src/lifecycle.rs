use crate::callbacks::{AbortReason, Callbacks};
use crate::config::{Compression, Configuration};
use crate::delegate::RecordDelegate;
use crate::error::TraceError;
use crate::headers::TraceHeaders;
use crate::priority::PriorityGuard;
use flate2::write::DeflateEncoder;
use flate2::Compression as DeflateLevel;
use rand::Rng;
use rhea_ring::codec::Record;
use rhea_ring::EntryType;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Background priority target used while a trace is Running. A small
/// positive nice value so the writer yields to latency-sensitive
/// application threads without starving entirely.
const WRITER_THREAD_NICE: i32 = 5;

/// A trace file's output stream, either compressed or raw.
///
/// Not type-erased behind `Box<dyn Write>`: [`Sink::finish`] needs the
/// concrete encoder to call its real `finish()` and surface any I/O error
/// from flushing the final deflate block, rather than relying on the
/// encoder's `Drop` impl (which finishes the stream but has nowhere to
/// report a failure).
enum Sink {
    Deflate(DeflateEncoder<File>),
    Plain(File),
}

impl Sink {
    /// Flushes and finalizes the stream, consuming it. For a compressed
    /// sink this writes the final deflate block; for a raw sink it is a
    /// plain flush.
    fn finish(self) -> io::Result<()> {
        match self {
            Sink::Deflate(encoder) => encoder.finish().map(|_| ()),
            Sink::Plain(mut file) => file.flush(),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Deflate(encoder) => encoder.write(buf),
            Sink::Plain(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Deflate(encoder) => encoder.flush(),
            Sink::Plain(file) => file.flush(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Idle,
    Running,
    Ended,
    Aborted,
    TimedOut,
}

/// Per-trace state machine: `Idle -> Running -> (Ended | Aborted |
/// TimedOut)`. Owns the destination file's compressed sink for as long as
/// the trace is Running.
pub struct TraceLifecycleVisitor {
    trace_id: i32,
    state: LifecycleState,
    config: Arc<Configuration>,
    callbacks: Arc<dyn Callbacks>,
    delegates: Vec<Box<dyn RecordDelegate>>,
    sink: Option<Sink>,
    tmp_path: Option<PathBuf>,
    extra_headers: Vec<(String, String)>,
    priority_guard: Option<PriorityGuard>,
    done: bool,
}

impl TraceLifecycleVisitor {
    pub fn new(trace_id: i32, config: Arc<Configuration>, callbacks: Arc<dyn Callbacks>) -> Self {
        Self {
            trace_id,
            state: LifecycleState::Idle,
            config,
            callbacks,
            delegates: Vec::new(),
            sink: None,
            tmp_path: None,
            extra_headers: Vec::new(),
            priority_guard: None,
            done: false,
        }
    }

    pub fn with_delegate(mut self, delegate: Box<dyn RecordDelegate>) -> Self {
        self.delegates.push(delegate);
        self
    }

    pub fn with_extra_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.extra_headers = headers;
        self
    }

    pub fn trace_id(&self) -> i32 {
        self.trace_id
    }

    pub fn done(&self) -> bool {
        self.done
    }

    /// Aborts this trace immediately with an externally supplied reason,
    /// e.g. writer shutdown with the trace still in flight.
    pub(crate) fn force_abort(&mut self, reason: AbortReason) {
        self.abort(reason);
    }

    /// Feeds one reassembled record to this lifecycle.
    pub fn visit(&mut self, record: &Record<'_>) {
        if let Record::Standard(entry) = record {
            if entry.extra == i64::from(self.trace_id) {
                match entry.entry_type {
                    EntryType::TraceStart => return self.start(),
                    EntryType::TraceBackwards => return self.start(),
                    EntryType::TraceEnd => return self.end(),
                    EntryType::TraceAbort => return self.abort(AbortReason::External("TRACE_ABORT".to_string())),
                    EntryType::TraceTimeout => return self.abort_as(LifecycleState::TimedOut, AbortReason::Timeout),
                    _ => {}
                }
            }
        }

        if self.state == LifecycleState::Running {
            self.emit(record);
        }
    }

    fn start(&mut self) {
        if self.state == LifecycleState::Running {
            // TRACE_START and TRACE_BACKWARDS both arriving for the same id:
            // keep the lifecycle already opened rather than reopening the
            // file (see the Open Questions resolution in DESIGN.md).
            return;
        }

        let tmp_path = self.build_tmp_path();
        let file = match File::create(&tmp_path) {
            Ok(f) => f,
            Err(err) => {
                warn!(trace_id = self.trace_id, %err, "failed to create trace file");
                self.callbacks.on_trace_write_exception(self.trace_id, &TraceError::Io { trace_id: self.trace_id, source: err });
                return self.abort(AbortReason::IoError);
            }
        };

        let mut sink = match self.config.compression {
            Compression::Deflate => Sink::Deflate(DeflateEncoder::new(file, DeflateLevel::default())),
            Compression::None => Sink::Plain(file),
        };

        let headers = TraceHeaders::collect(self.config.backdating_window_us, &self.extra_headers);
        if let Err(err) = write_header_block(&mut sink, self.config.timestamp_precision, &headers) {
            self.callbacks.on_trace_write_exception(self.trace_id, &TraceError::Io { trace_id: self.trace_id, source: err });
            return self.abort(AbortReason::IoError);
        }

        self.sink = Some(sink);
        self.tmp_path = Some(tmp_path);
        self.priority_guard = Some(PriorityGuard::raise(WRITER_THREAD_NICE));
        self.state = LifecycleState::Running;
        debug!(trace_id = self.trace_id, "trace started");
        self.callbacks.on_trace_start(self.trace_id);
    }

    fn emit(&mut self, record: &Record<'_>) {
        for delegate in &mut self.delegates {
            if !delegate.admit(record) {
                return;
            }
        }

        let result = match record {
            Record::Standard(e) => {
                let line = format!(
                    "{}|{}|{}|{}|{}|{}|{}\n",
                    e.id,
                    e.entry_type.as_str(),
                    e.timestamp,
                    e.tid,
                    e.callid,
                    e.matchid,
                    e.extra
                );
                self.sink.as_mut().expect("emit only called while Running").write_all(line.as_bytes())
            }
            Record::Frames(e) => {
                let sink = self.sink.as_mut().expect("emit only called while Running");
                let mut res = Ok(());
                for value in e.iter() {
                    let line = format!("{}|{}|{}|{}|0|{}|{}\n", e.id, e.entry_type.as_str(), e.timestamp, e.tid, e.matchid, value);
                    res = sink.write_all(line.as_bytes());
                    if res.is_err() {
                        break;
                    }
                }
                res
            }
            Record::Bytes(e) => self.sink.as_mut().expect("emit only called while Running").write_all(e.bytes),
        };

        if let Err(err) = result {
            let trace_error = TraceError::Io { trace_id: self.trace_id, source: err };
            self.callbacks.on_trace_write_exception(self.trace_id, &trace_error);
            self.abort(AbortReason::IoError);
        }
    }

    fn end(&mut self) {
        if self.state != LifecycleState::Running {
            return;
        }

        let Some(sink) = self.sink.take() else { return };
        let Some(tmp_path) = self.tmp_path.take() else { return };

        if let Err(err) = sink.finish() {
            self.callbacks.on_trace_write_exception(self.trace_id, &TraceError::Io { trace_id: self.trace_id, source: err });
            let _ = std::fs::remove_file(&tmp_path);
            self.state = LifecycleState::Aborted;
            self.priority_guard = None;
            self.done = true;
            self.callbacks.on_trace_abort(self.trace_id, &AbortReason::IoError);
            return;
        }

        let final_path = self.build_final_path();
        if let Err(err) = std::fs::rename(&tmp_path, &final_path) {
            self.callbacks.on_trace_write_exception(self.trace_id, &TraceError::Io { trace_id: self.trace_id, source: err });
            let _ = std::fs::remove_file(&tmp_path);
            self.state = LifecycleState::Aborted;
            self.priority_guard = None;
            self.done = true;
            self.callbacks.on_trace_abort(self.trace_id, &AbortReason::IoError);
            return;
        }

        self.state = LifecycleState::Ended;
        self.priority_guard = None;
        self.done = true;
        debug!(trace_id = self.trace_id, path = %final_path.display(), "trace ended");
        self.callbacks.on_trace_end(self.trace_id, &final_path);

        if let Ok(data) = std::fs::read(&final_path) {
            self.callbacks.on_data_ready(self.trace_id, &data);
        }
    }

    fn abort(&mut self, reason: AbortReason) {
        self.abort_as(LifecycleState::Aborted, reason);
    }

    /// Same cleanup as [`Self::abort`] but lands in `terminal_state` instead
    /// of always `Aborted` - used by the `TRACE_TIMEOUT` path so a timed-out
    /// trace is observably distinct from a plain abort.
    fn abort_as(&mut self, terminal_state: LifecycleState, reason: AbortReason) {
        self.sink = None;
        self.priority_guard = None;
        if let Some(tmp_path) = self.tmp_path.take() {
            let _ = std::fs::remove_file(tmp_path);
        }
        self.state = terminal_state;
        self.done = true;
        warn!(trace_id = self.trace_id, %reason, "trace aborted");
        self.callbacks.on_trace_abort(self.trace_id, &reason);
    }

    fn build_tmp_path(&self) -> PathBuf {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_micros();
        let rand_suffix: u32 = rand::thread_rng().gen();
        self.config.trace_folder.join(format!("{}-{}.{}.{:08x}.tmp", self.config.trace_prefix, self.trace_id, timestamp, rand_suffix))
    }

    fn build_final_path(&self) -> PathBuf {
        let epoch_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        let rand_suffix: u32 = rand::thread_rng().gen();
        self.config.trace_folder.join(format!(
            "{}-{}-{}-{:08x}.log{}",
            self.config.trace_prefix,
            self.trace_id,
            epoch_ms,
            rand_suffix,
            self.config.compression.suffix()
        ))
    }
}

fn write_header_block(sink: &mut dyn Write, precision: u8, headers: &[(String, String)]) -> std::io::Result<()> {
    writeln!(sink, "dt")?;
    writeln!(sink, "{precision}")?;
    for (key, value) in headers {
        writeln!(sink, "{key}|{value}")?;
    }
    writeln!(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhea_ring::codec::StandardEntry;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn standard(entry_type: EntryType, extra: i64) -> Record<'static> {
        Record::Standard(StandardEntry { id: 1, entry_type, timestamp: 1000, tid: 7, callid: 0, matchid: 0, extra })
    }

    #[derive(Default)]
    struct RecordingCallbacks {
        started: AtomicBool,
        ended: Mutex<Option<PathBuf>>,
        aborted: Mutex<Option<AbortReason>>,
    }

    impl Callbacks for RecordingCallbacks {
        fn on_trace_start(&self, _trace_id: i32) {
            self.started.store(true, Ordering::SeqCst);
        }
        fn on_trace_end(&self, _trace_id: i32, path: &std::path::Path) {
            *self.ended.lock().unwrap() = Some(path.to_path_buf());
        }
        fn on_trace_abort(&self, _trace_id: i32, reason: &AbortReason) {
            *self.aborted.lock().unwrap() = Some(reason.clone());
        }
    }

    fn test_config() -> (Arc<Configuration>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().expect("create temp dir for trace output");
        let config = Arc::new(Configuration { trace_folder: tmp.path().to_path_buf(), ..Configuration::default() });
        (config, tmp)
    }

    #[test]
    fn full_lifecycle_produces_a_readable_compressed_file() {
        let (config, _tmp) = test_config();
        let callbacks = Arc::new(RecordingCallbacks::default());
        let mut visitor = TraceLifecycleVisitor::new(10, Arc::clone(&config), callbacks.clone() as Arc<dyn Callbacks>);

        visitor.visit(&standard(EntryType::TraceStart, 10));
        assert!(callbacks.started.load(Ordering::SeqCst));

        for i in 0..5 {
            visitor.visit(&standard(EntryType::Counter, i));
        }
        visitor.visit(&standard(EntryType::TraceEnd, 10));

        assert!(visitor.done());
        let path = callbacks.ended.lock().unwrap().clone().expect("trace should have ended");
        assert!(path.exists());

        let compressed = std::fs::read(&path).unwrap();
        let mut decoder = flate2::read::DeflateDecoder::new(&compressed[..]);
        let mut text = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut text).unwrap();

        assert!(text.starts_with("dt\n6\n"));
        assert!(text.contains("trace_backdating_window|10000000"));
        let body_lines: Vec<&str> = text.split("\n\n").nth(1).unwrap().lines().collect();
        assert_eq!(body_lines.len(), 5);
    }

    #[test]
    fn abort_removes_the_tmp_file_and_never_calls_end() {
        let (config, _tmp) = test_config();
        let callbacks = Arc::new(RecordingCallbacks::default());
        let mut visitor = TraceLifecycleVisitor::new(20, Arc::clone(&config), callbacks.clone() as Arc<dyn Callbacks>);

        visitor.visit(&standard(EntryType::TraceStart, 20));
        let tmp_path = visitor.tmp_path.clone().unwrap();
        assert!(tmp_path.exists());

        visitor.visit(&standard(EntryType::TraceAbort, 20));

        assert!(visitor.done());
        assert!(!tmp_path.exists());
        assert!(callbacks.ended.lock().unwrap().is_none());
        assert!(callbacks.aborted.lock().unwrap().is_some());
    }

    #[test]
    fn records_for_a_different_trace_id_are_ignored() {
        let (config, _tmp) = test_config();
        let callbacks = Arc::new(RecordingCallbacks::default());
        let mut visitor = TraceLifecycleVisitor::new(30, Arc::clone(&config), callbacks.clone() as Arc<dyn Callbacks>);
        visitor.visit(&standard(EntryType::TraceStart, 999));
        assert!(!callbacks.started.load(Ordering::SeqCst));
    }
}
