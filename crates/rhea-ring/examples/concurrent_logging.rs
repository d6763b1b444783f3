//! Demonstrates multiple producer threads logging records through
//! `PacketLogger` into a shared `RingBuffer`, reassembled by a single
//! consumer using `PacketReassembler`.

use rhea_ring::codec::{self, Record};
use rhea_ring::{Config, EntryType, Packet, PacketLogger, PacketReassembler, RingBuffer, StandardEntry};
use std::thread;
use std::time::Instant;

fn main() {
    println!("rhea-ring concurrent logging example");
    println!("=====================================\n");

    let ring = RingBuffer::<Packet>::new(Config::new(10, true));
    let logger = PacketLogger::new(&ring);
    const N_PRODUCERS: u32 = 4;
    const RECORDS_PER_PRODUCER: u64 = 5_000;

    println!("Ring capacity: {} slots", ring.capacity());
    println!("Producers: {N_PRODUCERS}, records each: {RECORDS_PER_PRODUCER}\n");

    let start_cursor = ring.current_tail();
    let start = Instant::now();

    // A scoped thread pool so producers can share `&logger`/`&ring` without
    // an Arc: the scope guarantees every thread joins before either drops.
    thread::scope(|s| {
        for tid in 0..N_PRODUCERS {
            let logger = &logger;
            s.spawn(move || {
                for i in 0..RECORDS_PER_PRODUCER {
                    let record = Record::Standard(StandardEntry {
                        id: i as i32,
                        entry_type: EntryType::Counter,
                        timestamp: i as i64,
                        tid: tid as i32,
                        callid: 0,
                        matchid: 0,
                        extra: 0,
                    });
                    let mut buf = vec![0u8; codec::calculate_size(&record)];
                    codec::pack(&record, &mut buf).expect("pack always succeeds for a valid record");
                    logger.write(&buf).expect("non-empty payload");
                }
            });
        }
    });

    let elapsed = start.elapsed();
    println!("Producers finished in {elapsed:?}\n");

    let mut decoded = 0u64;
    let mut dropped = 0u64;
    let mut cursor = start_cursor;
    let mut reassembler = PacketReassembler::new(|payload: &[u8]| {
        if codec::unpack(payload).is_ok() {
            decoded += 1;
        }
    });
    let end = ring.current_tail();
    while cursor.pos() < end.pos() {
        let mut packet = Packet::empty();
        if ring.try_read(cursor, &mut packet) {
            reassembler.process(&packet);
        } else {
            dropped += 1;
        }
        cursor = cursor.next();
    }
    drop(reassembler);

    println!("Decoded records: {decoded}");
    println!("Packets lost to overwrite before consumption: {dropped}");
    println!("Ring metrics: {:?}", ring.metrics());
}
