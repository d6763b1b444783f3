use crate::callbacks::{AbortReason, Callbacks};
use crate::config::Configuration;
use crate::multi_trace::MultiTraceLifecycleVisitor;
use rhea_ring::codec;
use rhea_ring::{Cursor, Packet, PacketReassembler, RingBuffer};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tracing::{info, trace};

struct WorkItem {
    trace_id: i32,
    cursor: Option<Cursor>,
}

/// Single dedicated consumer thread: owns the submit queue and drives every
/// trace scan against the shared ring.
pub struct TraceWriter {
    queue: Arc<(Mutex<VecDeque<WorkItem>>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl TraceWriter {
    pub fn spawn(ring: Arc<RingBuffer<Packet>>, config: Arc<Configuration>, callbacks: Arc<dyn Callbacks>) -> Self {
        let queue = Arc::new((Mutex::new(VecDeque::new()), Condvar::new()));
        let worker_queue = Arc::clone(&queue);
        let handle = std::thread::Builder::new()
            .name("rhea-trace-writer".to_string())
            .spawn(move || Self::run(&worker_queue, &ring, &config, &callbacks))
            .expect("spawning the writer thread should not fail");

        Self { queue, handle: Some(handle) }
    }

    /// Enqueues a work item and wakes the writer thread.
    ///
    /// `cursor` should point at the slot carrying the `TRACE_START`/
    /// `TRACE_BACKWARDS` record for `trace_id`. Passing `None` means "scan
    /// forward from the current tail to find it" - the slow path, used only
    /// when the caller didn't capture `PacketLogger::write`'s return value.
    pub fn submit(&self, trace_id: i32, cursor: Option<Cursor>) {
        debug_assert_ne!(trace_id, 0, "trace_id 0 is the shutdown sentinel");
        let (lock, cvar) = &*self.queue;
        let mut queue = lock.lock().expect("writer queue mutex poisoned");
        queue.push_back(WorkItem { trace_id, cursor });
        cvar.notify_one();
    }

    /// Requests shutdown and blocks until the writer thread has drained its
    /// queue and exited.
    pub fn shutdown(mut self) {
        let (lock, cvar) = &*self.queue;
        {
            let mut queue = lock.lock().expect("writer queue mutex poisoned");
            queue.push_back(WorkItem { trace_id: 0, cursor: None });
            cvar.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn run(queue: &Arc<(Mutex<VecDeque<WorkItem>>, Condvar)>, ring: &RingBuffer<Packet>, config: &Arc<Configuration>, callbacks: &Arc<dyn Callbacks>) {
        let (lock, cvar) = &**queue;
        loop {
            let item = {
                let mut guard = lock.lock().expect("writer queue mutex poisoned");
                while guard.is_empty() {
                    guard = cvar.wait(guard).expect("writer queue mutex poisoned");
                }
                guard.pop_front().expect("queue was just checked non-empty")
            };

            if item.trace_id == 0 {
                info!("writer thread received shutdown sentinel");
                return;
            }

            let cursor = item.cursor.unwrap_or_else(|| ring.current_tail());
            let consumed = Self::process_trace(ring, cursor, Arc::clone(config), Arc::clone(callbacks));
            callbacks.on_scan_complete(&consumed);
        }
    }

    /// Drives a fresh [`MultiTraceLifecycleVisitor`] forward from `cursor`
    /// until it reports done or two consecutive reads miss, replaying any
    /// `TRACE_BACKWARDS` admissions' history backwards as they're seen.
    /// Returns every trace id this scan admitted.
    fn process_trace(ring: &RingBuffer<Packet>, cursor: Cursor, config: Arc<Configuration>, callbacks: Arc<dyn Callbacks>) -> HashSet<i32> {
        let visitor = RefCell::new(MultiTraceLifecycleVisitor::new(config, callbacks));
        let stream_starts: RefCell<HashMap<u32, Cursor>> = RefCell::new(HashMap::new());
        let current_stream = Cell::new(0u32);

        {
            let mut reassembler = PacketReassembler::new(|payload: &[u8]| {
                let stream_id = current_stream.get();
                let start_cursor = stream_starts.borrow_mut().remove(&stream_id);
                let Ok(record) = codec::unpack(payload) else {
                    trace!("dropping unreadable record during forward scan");
                    return;
                };
                let starts_backwards_replay = visitor.borrow_mut().visit(&record);
                if starts_backwards_replay {
                    if let Some(anchor) = start_cursor {
                        // Fires while the lifecycle is still open, matching
                        // MultiTraceLifecycleVisitor.cpp's inline
                        // trace_backward_callback_ - the prior visit()'s
                        // borrow is already released by the time this runs.
                        Self::replay_backwards(ring, anchor, &visitor);
                    }
                }
            });

            let mut cursor = cursor;
            let mut consecutive_misses = 0u32;
            loop {
                if visitor.borrow().done() {
                    break;
                }

                let mut packet = Packet::empty();
                if !ring.try_read(cursor, &mut packet) {
                    consecutive_misses += 1;
                    if consecutive_misses >= 2 {
                        break;
                    }
                    cursor = cursor.next();
                    continue;
                }
                consecutive_misses = 0;

                if packet.start() {
                    stream_starts.borrow_mut().insert(packet.stream(), cursor);
                }
                current_stream.set(packet.stream());
                reassembler.process(&packet);
                cursor = cursor.next();
            }
        }

        let mut visitor = visitor.into_inner();
        if !visitor.done() {
            // The scan ran out of readable slots before every admitted trace
            // reached TRACE_END/TRACE_ABORT/TRACE_TIMEOUT - clean up whatever
            // is still open rather than leaking an open sink and a `.tmp`
            // file nothing will ever close.
            visitor.abort_all(AbortReason::BufferExhausted);
        }
        visitor.consumed_traces().clone()
    }

    /// Walks backward from just before `anchor` (the stream's first packet,
    /// i.e. the `TRACE_BACKWARDS` record itself), reassembling through a
    /// reverse-mode [`PacketReassembler`] and feeding reconstructed payloads
    /// into the same visitor so older history lands in the same trace file.
    fn replay_backwards(ring: &RingBuffer<Packet>, anchor: Cursor, visitor: &RefCell<MultiTraceLifecycleVisitor>) {
        let mut reassembler = PacketReassembler::new(|payload: &[u8]| {
            if let Ok(record) = codec::unpack(payload) {
                visitor.borrow_mut().visit(&record);
            }
        });

        let mut cursor = anchor;
        // Move back before trace start: `anchor` is the TRACE_BACKWARDS
        // record itself, not history.
        if !cursor.move_backward() {
            return;
        }

        loop {
            let mut packet = Packet::empty();
            if !ring.try_read(cursor, &mut packet) {
                break;
            }
            reassembler.process_backwards(&packet);
            if !cursor.move_backward() {
                break;
            }
        }
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let (lock, cvar) = &*self.queue;
            {
                let mut queue = lock.lock().expect("writer queue mutex poisoned");
                queue.push_back(WorkItem { trace_id: 0, cursor: None });
                cvar.notify_one();
            }
            let _ = handle.join();
        }
    }
}
