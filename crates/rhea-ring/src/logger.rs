use crate::packet::{Packet, PACKET_DATA_LEN};
use crate::ring::{Cursor, RingBuffer};
use std::sync::atomic::{AtomicU32, Ordering};

/// Errors raised by [`PacketLogger::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LoggerError {
    #[error("payload must be non-empty")]
    EmptyPayload,
}

/// Splits a serialized record into fixed-size [`Packet`]s and publishes them
/// to a shared [`RingBuffer`], tagging every packet of one call with a
/// unique, monotonically increasing stream id.
pub struct PacketLogger<'a> {
    ring: &'a RingBuffer<Packet>,
    next_stream: AtomicU32,
}

impl<'a> PacketLogger<'a> {
    pub fn new(ring: &'a RingBuffer<Packet>) -> Self {
        Self { ring, next_stream: AtomicU32::new(0) }
    }

    /// Fragments `payload` into `ceil(payload.len() / 52)` packets and writes
    /// them to the ring in order. Returns a cursor at the *first* packet of
    /// the new stream, which callers use to seed a subsequent backward scan.
    ///
    /// The stream id counter advances even when `payload` is rejected, so
    /// that no two calls - successful or not - ever share a stream id.
    pub fn write(&self, payload: &[u8]) -> Result<Cursor, LoggerError> {
        // Relaxed: uniqueness across producers is all that matters here, not
        // ordering with any other memory access.
        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);

        if payload.is_empty() {
            return Err(LoggerError::EmptyPayload);
        }

        self.ring.record_stream_started();

        let size = payload.len();
        let mut offset = 0;
        let mut first_cursor = None;

        while offset < size {
            let write_size = (size - offset).min(PACKET_DATA_LEN);
            let start = offset == 0;
            let next = offset + write_size < size;
            let packet = Packet::new(stream, start, next, &payload[offset..offset + write_size]);
            let cursor = self.ring.write(packet);
            if first_cursor.is_none() {
                first_cursor = Some(cursor);
            }
            offset += write_size;
        }

        Ok(first_cursor.expect("at least one packet is written for a non-empty payload"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn single_packet_payload() {
        let ring = RingBuffer::<Packet>::new(Config::new(6, false));
        let logger = PacketLogger::new(&ring);
        let cursor = logger.write(b"small payload").unwrap();
        let mut out = Packet::empty();
        assert!(ring.try_read(cursor, &mut out));
        assert!(out.start());
        assert!(!out.next());
        assert_eq!(out.payload(), b"small payload");
    }

    #[test]
    fn fragments_large_payload_into_ceil_n_div_52_packets() {
        let ring = RingBuffer::<Packet>::new(Config::new(6, false));
        let logger = PacketLogger::new(&ring);
        let payload: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        let start_cursor = logger.write(&payload).unwrap();

        let expected_packets = payload.len().div_ceil(PACKET_DATA_LEN);
        let mut cursor = start_cursor;
        let mut seen = 0;
        let mut rebuilt = Vec::new();
        loop {
            let mut out = Packet::empty();
            assert!(ring.try_read(cursor, &mut out));
            if seen == 0 {
                assert!(out.start());
            }
            rebuilt.extend_from_slice(out.payload());
            seen += 1;
            if !out.next() {
                break;
            }
            cursor = cursor.next();
        }
        assert_eq!(seen, expected_packets);
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn empty_payload_is_rejected_but_still_advances_stream_id() {
        let ring = RingBuffer::<Packet>::new(Config::new(6, false));
        let logger = PacketLogger::new(&ring);
        assert_eq!(logger.write(&[]), Err(LoggerError::EmptyPayload));

        let cursor = logger.write(b"x").unwrap();
        let mut out = Packet::empty();
        assert!(ring.try_read(cursor, &mut out));
        assert_eq!(out.stream(), 1, "stream id 0 was consumed by the rejected call");
    }

    #[test]
    fn distinct_streams_for_concurrent_writers() {
        let ring = RingBuffer::<Packet>::new(Config::new(8, false));
        let logger = PacketLogger::new(&ring);
        let mut streams = std::collections::HashSet::new();
        for _ in 0..10 {
            let cursor = logger.write(b"payload").unwrap();
            let mut out = Packet::empty();
            assert!(ring.try_read(cursor, &mut out));
            streams.insert(out.stream());
        }
        assert_eq!(streams.len(), 10);
    }
}
