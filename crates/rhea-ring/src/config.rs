/// Configuration for the ring buffer.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Ring buffer size as a power of 2 (default: 1024 slots, rounded up from the
    /// nominal 1000-slot default so that index wrapping is a mask, not a divide).
    pub ring_bits: u8,
    /// Enable metrics collection (slight overhead).
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `ring_bits` is 0 or greater than 24 (16M slots max) to prevent
    /// excessive memory usage.
    pub const fn new(ring_bits: u8, enable_metrics: bool) -> Self {
        assert!(ring_bits > 0 && ring_bits <= 24, "ring_bits must be between 1 and 24");

        Self { ring_bits, enable_metrics }
    }

    /// Builds a config from a requested slot count, rounding up to the next
    /// power of two (the ring always addresses slots with a mask).
    ///
    /// # Panics
    ///
    /// Panics if `slots` is 0 or would require more than 24 bits.
    pub fn from_slots(slots: usize, enable_metrics: bool) -> Self {
        assert!(slots > 0, "slots must be positive");
        let bits = usize::BITS - (slots - 1).leading_zeros().min(usize::BITS - 1);
        let bits = bits.max(1);
        Self::new(bits as u8, enable_metrics)
    }

    /// Returns the capacity of the ring buffer.
    #[inline]
    pub const fn capacity(&self) -> usize {
        1 << self.ring_bits
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity() - 1
    }
}

impl Default for Config {
    /// Default capacity: 1024 slots (nearest power of two to the configured
    /// default of 1000 slots), metrics disabled.
    fn default() -> Self {
        Self { ring_bits: 10, enable_metrics: false }
    }
}
