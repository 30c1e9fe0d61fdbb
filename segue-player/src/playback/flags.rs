//! Player flags
//!
//! Two bits guard the now-playing slot against event races:
//! `RENDERING_IMMINENT` is set between a decoder's render-will-start and
//! render-started notifications, `HAVE_PENDING_DECODER` between a decoder
//! being handed to the node and the node starting to decode it. Readers
//! always observe a consistent snapshot of both bits.

use std::sync::atomic::{AtomicU32, Ordering};

/// Atomic bitmask of engine flags
#[derive(Debug, Default)]
pub struct PlayerFlags(AtomicU32);

impl PlayerFlags {
    /// A decoder is about to start rendering
    pub const RENDERING_IMMINENT: u32 = 1 << 0;
    /// A decoder was enqueued that the node has not started decoding
    pub const HAVE_PENDING_DECODER: u32 = 1 << 1;

    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Current bits
    pub fn snapshot(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn contains(&self, bits: u32) -> bool {
        self.snapshot() & bits == bits
    }

    /// True if any of `bits` is set
    pub fn intersects(&self, bits: u32) -> bool {
        self.snapshot() & bits != 0
    }

    pub fn set(&self, bits: u32) {
        self.0.fetch_or(bits, Ordering::AcqRel);
    }

    pub fn clear(&self, bits: u32) {
        self.0.fetch_and(!bits, Ordering::AcqRel);
    }

    pub fn clear_all(&self) {
        self.0.store(0, Ordering::Release);
    }

    pub fn rendering_imminent(&self) -> bool {
        self.contains(Self::RENDERING_IMMINENT)
    }

    pub fn have_pending_decoder(&self) -> bool {
        self.contains(Self::HAVE_PENDING_DECODER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear_are_independent() {
        let flags = PlayerFlags::new();
        flags.set(PlayerFlags::RENDERING_IMMINENT);
        flags.set(PlayerFlags::HAVE_PENDING_DECODER);
        assert!(flags.rendering_imminent());
        assert!(flags.have_pending_decoder());

        flags.clear(PlayerFlags::RENDERING_IMMINENT);
        assert!(!flags.rendering_imminent());
        assert!(flags.have_pending_decoder());
    }

    #[test]
    fn test_intersects() {
        let flags = PlayerFlags::new();
        let both = PlayerFlags::RENDERING_IMMINENT | PlayerFlags::HAVE_PENDING_DECODER;
        assert!(!flags.intersects(both));
        flags.set(PlayerFlags::HAVE_PENDING_DECODER);
        assert!(flags.intersects(both));
        assert!(!flags.contains(both));
        flags.clear_all();
        assert_eq!(flags.snapshot(), 0);
    }
}
