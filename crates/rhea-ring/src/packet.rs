use crate::invariants::debug_assert_packet_size_bound;

/// Bytes of payload a single packet can carry.
pub const PACKET_DATA_LEN: usize = 52;

const FLAG_START: u16 = 1 << 0;
const FLAG_NEXT: u16 = 1 << 1;
const SIZE_SHIFT: u16 = 2;
const SIZE_MASK: u16 = 0x3FFF; // 14 bits

/// A fixed 64-byte, cache-line-sized fragment of a serialized record.
///
/// Layout: `stream:u32, flags:u16 (start:1, next:1, size:14), pad:u16,
/// data:[u8; 52], pad:[u8; 4]`. The data region begins at byte offset 8,
/// which is 4-byte aligned from the start of the packet, so a reassembler
/// that recognizes a single self-contained packet can hand out a pointer
/// into `data` without a copy.
///
/// `Packet` is `Copy`: the ring buffer stores it by value, so a producer's
/// `write` and a consumer's `tryRead` never alias the same memory.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Packet {
    stream: u32,
    flags: u16,
    _pad: u16,
    data: [u8; PACKET_DATA_LEN],
    _tail_pad: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<Packet>() == 64, "Packet must be exactly 64 bytes");

impl Packet {
    /// Builds a packet from a `stream` id, fragmentation flags, and up to
    /// [`PACKET_DATA_LEN`] bytes of payload.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds [`PACKET_DATA_LEN`] or `src` is shorter than
    /// `size`.
    pub fn new(stream: u32, start: bool, next: bool, src: &[u8]) -> Self {
        let size = src.len();
        debug_assert_packet_size_bound!(size, PACKET_DATA_LEN);
        assert!(size <= PACKET_DATA_LEN, "packet payload {} exceeds {}", size, PACKET_DATA_LEN);

        let mut data = [0u8; PACKET_DATA_LEN];
        data[..size].copy_from_slice(src);

        let mut flags = (size as u16 & SIZE_MASK) << SIZE_SHIFT;
        if start {
            flags |= FLAG_START;
        }
        if next {
            flags |= FLAG_NEXT;
        }

        Self { stream, flags, _pad: 0, data, _tail_pad: [0; 4] }
    }

    /// An all-zero packet, used as a placeholder for uninitialized slots.
    pub const fn empty() -> Self {
        Self { stream: 0, flags: 0, _pad: 0, data: [0; PACKET_DATA_LEN], _tail_pad: [0; 4] }
    }

    #[inline]
    pub fn stream(&self) -> u32 {
        self.stream
    }

    /// True for the first packet of a stream.
    #[inline]
    pub fn start(&self) -> bool {
        self.flags & FLAG_START != 0
    }

    /// True when another packet follows this one in the stream.
    #[inline]
    pub fn next(&self) -> bool {
        self.flags & FLAG_NEXT != 0
    }

    /// Number of valid bytes in [`data`](Self::data), always `<= PACKET_DATA_LEN`.
    #[inline]
    pub fn size(&self) -> u16 {
        (self.flags >> SIZE_SHIFT) & SIZE_MASK
    }

    /// The valid payload slice, `data()[..size()]`.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.size() as usize]
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("stream", &self.stream)
            .field("start", &self.start())
            .field("next", &self.next())
            .field("size", &self.size())
            .finish()
    }
}
