use crate::invariants::debug_assert_pool_bound;
use crate::packet::Packet;

/// Free-list cap for recycled reassembly buffers. Bounded so steady-state
/// memory use stays flat regardless of how many streams were ever seen.
const POOL_CAP: usize = 8;

struct ActiveStream {
    stream: u32,
    data: Vec<u8>,
}

/// Reconstructs payloads from a sequence of [`Packet`]s belonging to the same
/// stream, delivering each completed payload to `on_payload` exactly once.
///
/// A single reassembler instance is meant to be fed packets in one direction
/// only for its lifetime: [`process`](Self::process) for a forward scan,
/// [`process_backwards`](Self::process_backwards) for a backward one. Mixing
/// the two on the same instance is not meaningful (the active-stream buffers
/// mean different things in each direction) and is not guarded against
/// because `TraceWriter` never does it - it creates a fresh reassembler per
/// scan direction.
pub struct PacketReassembler<F> {
    active: Vec<ActiveStream>,
    pool: Vec<Vec<u8>>,
    on_payload: F,
}

impl<F: FnMut(&[u8])> PacketReassembler<F> {
    pub fn new(on_payload: F) -> Self {
        Self { active: Vec::new(), pool: Vec::new(), on_payload }
    }

    /// Number of streams currently being accumulated. Kept small in practice:
    /// bounded by how many payloads are interleaved in flight at once.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    fn take_buffer(&mut self) -> Vec<u8> {
        self.pool.pop().unwrap_or_default()
    }

    fn recycle_buffer(&mut self, mut buf: Vec<u8>) {
        debug_assert_pool_bound!(self.pool.len(), POOL_CAP);
        if self.pool.len() < POOL_CAP {
            buf.clear();
            self.pool.push(buf);
        }
    }

    fn find_active(&self, stream: u32) -> Option<usize> {
        self.active.iter().position(|s| s.stream == stream)
    }

    /// Feeds one packet from a forward (oldest-to-newest) scan.
    ///
    /// A packet matching an in-progress stream is appended; the stream
    /// flushes to `on_payload` when a terminator (`next == false`) arrives.
    /// A self-contained single packet (`start && !next`) with no matching
    /// active stream is delivered immediately, with no buffer involved. A
    /// continuation packet (`!start`) with no matching active stream is a
    /// recovery artifact of starting mid-stream and is dropped silently.
    pub fn process(&mut self, packet: &Packet) {
        if let Some(idx) = self.find_active(packet.stream()) {
            self.active[idx].data.extend_from_slice(packet.payload());
            if !packet.next() {
                let stream = self.active.swap_remove(idx);
                (self.on_payload)(&stream.data);
                self.recycle_buffer(stream.data);
            }
            return;
        }

        if packet.start() && !packet.next() {
            (self.on_payload)(packet.payload());
        } else if packet.start() && packet.next() {
            let mut buf = self.take_buffer();
            buf.extend_from_slice(packet.payload());
            self.active.push(ActiveStream { stream: packet.stream(), data: buf });
        }
        // !start with no active match: orphan continuation, dropped silently.
    }

    /// Feeds one packet from a backward (newest-to-oldest) scan.
    ///
    /// Packets are appended in the order encountered and the newly appended
    /// segment is reversed in place; once the terminator in this direction
    /// (`start == true`, the payload's first packet, seen last) arrives, the
    /// whole buffer is reversed once more, restoring transmission order,
    /// then flushed. A lone packet (`start && !next`) with no active stream
    /// is self-contained and delivered as-is. The tail fragment of a
    /// multi-packet stream, encountered first walking backward
    /// (`!start && !next`, no active match), seeds a new active stream. Any
    /// other unmatched continuation (`!start && next`) means the tail was
    /// already lost and is dropped.
    pub fn process_backwards(&mut self, packet: &Packet) {
        if let Some(idx) = self.find_active(packet.stream()) {
            let stream = &mut self.active[idx];
            let segment_start = stream.data.len();
            stream.data.extend_from_slice(packet.payload());
            stream.data[segment_start..].reverse();

            if packet.start() {
                let mut stream = self.active.swap_remove(idx);
                stream.data.reverse();
                (self.on_payload)(&stream.data);
                self.recycle_buffer(stream.data);
            }
            return;
        }

        if packet.start() && !packet.next() {
            (self.on_payload)(packet.payload());
        } else if !packet.start() && !packet.next() {
            let mut buf = self.take_buffer();
            buf.extend_from_slice(packet.payload());
            self.active.push(ActiveStream { stream: packet.stream(), data: buf });
        }
        // Any other unmatched continuation means the tail fragment was
        // already overwritten; dropped silently.
    }
}
