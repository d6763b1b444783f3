use crate::callbacks::{AbortReason, Callbacks};
use crate::config::Configuration;
use crate::lifecycle::TraceLifecycleVisitor;
use rhea_ring::codec::Record;
use rhea_ring::EntryType;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fan-out visitor holding one [`TraceLifecycleVisitor`] per active trace.
///
/// Broadcasts every non-control record to all active lifecycles and routes
/// start/end/abort control records to the lifecycle they name. Tracks every
/// trace id ever admitted in `consumed_traces`, independent of whether that
/// trace is still active - `TraceWriter` uses this set to report which ids a
/// single forward scan touched.
pub struct MultiTraceLifecycleVisitor {
    active: HashMap<i32, TraceLifecycleVisitor>,
    consumed_traces: HashSet<i32>,
    config: Arc<Configuration>,
    callbacks: Arc<dyn Callbacks>,
}

impl MultiTraceLifecycleVisitor {
    pub fn new(config: Arc<Configuration>, callbacks: Arc<dyn Callbacks>) -> Self {
        Self { active: HashMap::new(), consumed_traces: HashSet::new(), config, callbacks }
    }

    pub fn consumed_traces(&self) -> &HashSet<i32> {
        &self.consumed_traces
    }

    /// `true` once every admitted trace has finished (ended or aborted) and
    /// at least one trace was ever admitted.
    pub fn done(&self) -> bool {
        !self.consumed_traces.is_empty() && self.active.is_empty()
    }

    /// Returns `true` if this visit started a new trace whose history should
    /// now be replayed backwards (a `TRACE_BACKWARDS` admission).
    pub fn visit(&mut self, record: &Record<'_>) -> bool {
        let Record::Standard(entry) = record else {
            self.broadcast(record);
            return false;
        };

        match entry.entry_type {
            EntryType::TraceStart | EntryType::TraceBackwards => {
                let trace_id = entry.extra as i32;
                let is_backwards = entry.entry_type == EntryType::TraceBackwards;
                self.active
                    .entry(trace_id)
                    .or_insert_with(|| TraceLifecycleVisitor::new(trace_id, Arc::clone(&self.config), Arc::clone(&self.callbacks)))
                    .visit(record);
                self.consumed_traces.insert(trace_id);
                is_backwards
            }
            EntryType::TraceEnd | EntryType::TraceAbort | EntryType::TraceTimeout => {
                let trace_id = entry.extra as i32;
                if let Some(lifecycle) = self.active.get_mut(&trace_id) {
                    lifecycle.visit(record);
                    if lifecycle.done() {
                        self.active.remove(&trace_id);
                    }
                }
                false
            }
            _ => {
                self.broadcast(record);
                false
            }
        }
    }

    fn broadcast(&mut self, record: &Record<'_>) {
        for lifecycle in self.active.values_mut() {
            lifecycle.visit(record);
        }
    }

    /// Aborts every active trace, e.g. on writer shutdown with in-flight
    /// traces still open.
    pub fn abort_all(&mut self, reason: AbortReason) {
        for (_, mut lifecycle) in self.active.drain() {
            lifecycle.force_abort(reason.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NullCallbacks;
    use rhea_ring::codec::StandardEntry;

    fn standard(entry_type: EntryType, extra: i64) -> Record<'static> {
        Record::Standard(StandardEntry { id: 1, entry_type, timestamp: 0, tid: 1, callid: 0, matchid: 0, extra })
    }

    fn test_config() -> (Arc<Configuration>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().expect("create temp dir for trace output");
        let config = Arc::new(Configuration { trace_folder: tmp.path().to_path_buf(), ..Configuration::default() });
        (config, tmp)
    }

    #[test]
    fn two_concurrent_traces_both_receive_broadcasts_independently() {
        let (config, _tmp) = test_config();
        let callbacks: Arc<dyn Callbacks> = Arc::new(NullCallbacks);
        let mut visitor = MultiTraceLifecycleVisitor::new(config, callbacks);

        visitor.visit(&standard(EntryType::TraceStart, 1));
        visitor.visit(&standard(EntryType::TraceStart, 2));
        for i in 0..10 {
            visitor.visit(&standard(EntryType::Counter, i));
        }
        assert!(!visitor.done());

        visitor.visit(&standard(EntryType::TraceEnd, 1));
        assert!(!visitor.done(), "trace 2 is still active");
        assert!(visitor.consumed_traces().contains(&1));

        visitor.visit(&standard(EntryType::TraceEnd, 2));
        assert!(visitor.done());
        assert!(visitor.consumed_traces().contains(&2));
    }

    #[test]
    fn ending_one_trace_does_not_remove_the_other() {
        let (config, _tmp) = test_config();
        let callbacks: Arc<dyn Callbacks> = Arc::new(NullCallbacks);
        let mut visitor = MultiTraceLifecycleVisitor::new(config, callbacks);
        visitor.visit(&standard(EntryType::TraceStart, 1));
        visitor.visit(&standard(EntryType::TraceStart, 2));
        visitor.visit(&standard(EntryType::TraceEnd, 1));
        assert_eq!(visitor.active.len(), 1);
        assert!(visitor.active.contains_key(&2));
    }
}
