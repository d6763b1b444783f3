//! Lock-free, single-buffer, multi-producer / single-consumer trace event
//! transport.
//!
//! This crate is the hot-path core of a mobile performance-tracing SDK: a
//! wait-free ring buffer of fixed-size [`Packet`]s ([`RingBuffer`]), a
//! fragmenter that splits serialized records across packets
//! ([`PacketLogger`]), a binary codec for the three record shapes
//! ([`codec`]), and a two-direction reassembler that turns a packet stream
//! back into a payload ([`PacketReassembler`]).
//!
//! The higher-level per-trace lifecycle state machines that consume this
//! transport live in the sibling `rhea-trace` crate.
//!
//! # Example
//!
//! ```
//! use rhea_ring::{Config, EntryType, PacketLogger, Record, RingBuffer, StandardEntry};
//! use rhea_ring::codec::{self};
//!
//! let ring = RingBuffer::new(Config::default());
//! let logger = PacketLogger::new(&ring);
//!
//! let record = Record::Standard(StandardEntry {
//!     id: 1,
//!     entry_type: EntryType::Counter,
//!     timestamp: 1_000,
//!     tid: 7,
//!     callid: 0,
//!     matchid: 0,
//!     extra: 42,
//! });
//! let mut buf = vec![0u8; codec::calculate_size(&record)];
//! codec::pack(&record, &mut buf).unwrap();
//! logger.write(&buf).unwrap();
//! ```

mod config;
pub mod codec;
mod invariants;
mod logger;
mod metrics;
mod packet;
mod reassembler;
mod ring;

pub use codec::{BytesEntry, CodecError, EntryType, FramesEntry, Record, StandardEntry};
pub use config::Config;
pub use logger::{LoggerError, PacketLogger};
pub use metrics::{Metrics, MetricsSnapshot};
pub use packet::{Packet, PACKET_DATA_LEN};
pub use reassembler::PacketReassembler;
pub use ring::{Cursor, RingBuffer};
