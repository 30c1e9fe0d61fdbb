//! Per-decoder bookkeeping shared by the decoding thread, the render callback
//! and the notifier.
//!
//! Counters only grow between seeks. The decoding thread bumps
//! `frames_decoded` before pushing the frames into the ring, so the render
//! callback never sees more frames in the ring than it can attribute.

use crate::audio::DecoderHandle;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const NO_SEEK: u64 = u64::MAX;

/// Lifecycle bits of an active decoder
pub(crate) mod state_flags {
    pub const DECODING_STARTED: u32 = 1 << 0;
    pub const DECODING_COMPLETE: u32 = 1 << 1;
    pub const RENDERING_STARTED: u32 = 1 << 2;
    pub const RENDERING_COMPLETE: u32 = 1 << 3;
    pub const CANCEL_REQUESTED: u32 = 1 << 4;
    pub const CANCELED: u32 = 1 << 5;
}

use state_flags::*;

pub(crate) struct DecoderState {
    pub sequence: u64,
    pub decoder: DecoderHandle,
    pub sample_rate: u32,
    flags: AtomicU32,
    frames_decoded: AtomicU64,
    frames_rendered: AtomicU64,
    /// Decoder frame the counters are relative to (moves on seek)
    frame_offset: AtomicU64,
    seek_request: AtomicU64,
}

impl DecoderState {
    pub fn new(sequence: u64, decoder: DecoderHandle, sample_rate: u32) -> Self {
        Self {
            sequence,
            decoder,
            sample_rate,
            flags: AtomicU32::new(DECODING_STARTED),
            frames_decoded: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            frame_offset: AtomicU64::new(0),
            seek_request: AtomicU64::new(NO_SEEK),
        }
    }

    pub fn has(&self, bits: u32) -> bool {
        self.flags.load(Ordering::Acquire) & bits == bits
    }

    pub fn set(&self, bits: u32) {
        self.flags.fetch_or(bits, Ordering::AcqRel);
    }

    pub fn clear(&self, bits: u32) {
        self.flags.fetch_and(!bits, Ordering::AcqRel);
    }

    /// Rendered to the end or canceled; contributes nothing further
    pub fn is_finished(&self) -> bool {
        let flags = self.flags.load(Ordering::Acquire);
        flags & (RENDERING_COMPLETE | CANCELED) != 0
    }

    /// Will neither render more frames nor be canceled again
    pub fn is_settled(&self) -> bool {
        self.is_finished() || self.has(CANCEL_REQUESTED)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Acquire)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// Frames in the ring not yet rendered
    pub fn frames_buffered(&self) -> u64 {
        self.frames_decoded().saturating_sub(self.frames_rendered())
    }

    pub fn add_decoded(&self, frames: u64) {
        self.frames_decoded.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn add_rendered(&self, frames: u64) {
        self.frames_rendered.fetch_add(frames, Ordering::AcqRel);
    }

    /// Decoder frame currently reaching the output
    pub fn playback_frame(&self) -> u64 {
        self.frame_offset.load(Ordering::Acquire) + self.frames_rendered()
    }

    /// Restart the counters at decoder frame `frame`
    pub fn rebase(&self, frame: u64) {
        self.frame_offset.store(frame, Ordering::Release);
        self.frames_decoded.store(0, Ordering::Release);
        self.frames_rendered.store(0, Ordering::Release);
    }

    pub fn request_seek(&self, frame: u64) {
        self.seek_request.store(frame, Ordering::Release);
    }

    pub fn take_seek_request(&self) -> Option<u64> {
        match self.seek_request.swap(NO_SEEK, Ordering::AcqRel) {
            NO_SEEK => None,
            frame => Some(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{ProcessingFormat, ToneDecoder};

    fn state() -> DecoderState {
        let format = ProcessingFormat::standard(44100, 2);
        DecoderState::new(1, DecoderHandle::new(ToneDecoder::silence(format, 100)), 44100)
    }

    #[test]
    fn test_lifecycle_flags() {
        let state = state();
        assert!(state.has(DECODING_STARTED));
        assert!(!state.is_settled());

        state.set(CANCEL_REQUESTED);
        assert!(state.is_settled());
        assert!(!state.is_finished());

        state.set(CANCELED);
        assert!(state.is_finished());
    }

    #[test]
    fn test_counters_and_rebase() {
        let state = state();
        state.add_decoded(64);
        state.add_rendered(16);
        assert_eq!(state.frames_buffered(), 48);
        assert_eq!(state.playback_frame(), 16);

        state.rebase(50);
        assert_eq!(state.frames_buffered(), 0);
        assert_eq!(state.playback_frame(), 50);
    }

    #[test]
    fn test_seek_request_taken_once() {
        let state = state();
        assert_eq!(state.take_seek_request(), None);
        state.request_seek(10);
        assert_eq!(state.take_seek_request(), Some(10));
        assert_eq!(state.take_seek_request(), None);
    }
}
