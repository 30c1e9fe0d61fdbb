//! Decoding thread
//!
//! Each pass handles, in order: cancel requests (ascending sequence, so each
//! canceled decoder's frames are at the head of the ring when skipped), seek
//! requests, slot recycling, dequeuing the next decoder, and one chunk of
//! decoding.

use super::decoder_state::state_flags::*;
use super::decoder_state::DecoderState;
use super::{DecodeNotice, NodeShared};
use crate::playback::ring_buffer::PcmProducer;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

pub(super) struct DecodingLoop {
    shared: Arc<NodeShared>,
    producer: PcmProducer,
    wake: Receiver<()>,
    notices: Sender<DecodeNotice>,
    chunk_frames: usize,
    idle_wait: Duration,
    scratch: Vec<f32>,
    current: Option<Arc<DecoderState>>,
    next_sequence: u64,
}

impl DecodingLoop {
    pub fn new(
        shared: Arc<NodeShared>,
        producer: PcmProducer,
        wake: Receiver<()>,
        notices: Sender<DecodeNotice>,
        chunk_frames: usize,
        idle_wait_ms: u64,
    ) -> Self {
        let chunk_frames = chunk_frames.max(1);
        let channels = shared.format.channels.max(1) as usize;
        Self {
            shared,
            producer,
            wake,
            notices,
            chunk_frames,
            idle_wait: Duration::from_millis(idle_wait_ms.max(1)),
            scratch: vec![0.0; chunk_frames * channels],
            current: None,
            next_sequence: 1,
        }
    }

    pub fn run(mut self) {
        debug!("Decoding thread started ({})", self.shared.format);

        while !self.shared.shutdown.load(Ordering::Acquire) {
            self.process_cancels();
            self.process_seeks();
            self.release_finished_slots();

            if self.current.is_none() {
                self.start_next_decoder();
            }

            let progressed = match self.current.clone() {
                Some(state) => self.decode_chunk(&state),
                None => false,
            };

            if !progressed {
                let _ = self.wake.recv_timeout(self.idle_wait);
            }
        }

        debug!("Decoding thread stopped ({})", self.shared.format);
    }

    fn notify(&self, notice: DecodeNotice) {
        // Notifier gone means the node is shutting down
        let _ = self.notices.send(notice);
    }

    fn process_cancels(&mut self) {
        for state in self.shared.active_states() {
            if !state.has(CANCEL_REQUESTED) || state.is_finished() {
                continue;
            }

            let partially_rendered = {
                let mut consumer = self.shared.consumer.lock();
                let skipped = consumer.skip_frames(state.frames_buffered() as usize);
                state.set(CANCELED);
                trace!(
                    "Skipped {} buffered frames of {}",
                    skipped,
                    state.decoder.source()
                );
                state.has(RENDERING_STARTED)
            };

            if self
                .current
                .as_ref()
                .is_some_and(|c| c.sequence == state.sequence)
            {
                self.current = None;
            }

            debug!(
                "Canceled {} (partially rendered: {})",
                state.decoder.source(),
                partially_rendered
            );
            self.notify(DecodeNotice::Canceled {
                state,
                partially_rendered,
            });
        }
    }

    fn process_seeks(&mut self) {
        let states = self.shared.active_states();
        for (index, state) in states.iter().enumerate() {
            let Some(frame) = state.take_seek_request() else {
                continue;
            };
            if state.is_settled() {
                continue;
            }
            if states[index + 1..].iter().any(|later| !later.is_finished()) {
                debug!("Dropping seek in {}: next decoder started", state.decoder.source());
                continue;
            }

            let mut consumer = self.shared.consumer.lock();
            let result = state.decoder.lock().seek_to_frame(frame);
            match result {
                Ok(()) => {
                    consumer.skip_frames(state.frames_buffered() as usize);
                    state.rebase(frame);
                    state.clear(DECODING_COMPLETE);
                    drop(consumer);

                    debug!("Seeked {} to frame {}", state.decoder.source(), frame);
                    self.current = Some(Arc::clone(state));
                }
                Err(error) => {
                    drop(consumer);
                    warn!("Seek in {} failed: {}", state.decoder.source(), error);
                    self.notify(DecodeNotice::Failed {
                        state: Arc::clone(state),
                        error,
                    });
                }
            }
        }
    }

    /// Free slots whose decoder rendered to the end or was canceled
    fn release_finished_slots(&self) {
        for slot in self.shared.slots.iter() {
            if matches!(&*slot.load(), Some(state) if state.is_finished()) {
                slot.store(None);
            }
        }
    }

    /// Move the queue head into a free slot.
    ///
    /// Runs under the queue lock so observers never see a decoder that is
    /// neither queued nor active.
    fn start_next_decoder(&mut self) {
        let Some(index) = self.shared.slots.iter().position(|s| s.load().is_none()) else {
            return;
        };

        let state = {
            let mut queue = self.shared.queue.lock();
            let Some(decoder) = queue.pop_front() else {
                return;
            };
            self.shared.queued.store(queue.len(), Ordering::Release);

            let sample_rate = decoder
                .processing_format()
                .map_or(self.shared.format.sample_rate, |f| f.sample_rate);
            let state = Arc::new(DecoderState::new(self.next_sequence, decoder, sample_rate));
            self.shared.slots[index].store(Some(Arc::clone(&state)));
            state
        };
        self.next_sequence += 1;

        debug!(
            "Decoding started: {} (sequence {})",
            state.decoder.source(),
            state.sequence
        );
        self.current = Some(Arc::clone(&state));
        self.notify(DecodeNotice::Started(state));
    }

    /// Decode one chunk of the current decoder; returns whether work was done
    fn decode_chunk(&mut self, state: &Arc<DecoderState>) -> bool {
        if state.is_settled() {
            self.current = None;
            return true;
        }

        let frames = self.chunk_frames.min(self.producer.vacant_frames());
        if frames == 0 {
            return false;
        }

        let channels = self.shared.format.channels.max(1) as usize;
        let samples = frames * channels;
        let result = state
            .decoder
            .lock()
            .read_frames(&mut self.scratch[..samples], frames);

        match result {
            Ok(0) => self.finish(state),
            Ok(read) => {
                let read = read.min(frames);
                state.add_decoded(read as u64);
                let pushed = self.producer.push_frames(&self.scratch[..read * channels]);
                if pushed < read {
                    warn!(
                        "Ring accepted {} of {} frames from {}",
                        pushed,
                        read,
                        state.decoder.source()
                    );
                }
            }
            Err(error) => {
                warn!("Decoding {} failed: {}", state.decoder.source(), error);
                self.notify(DecodeNotice::Failed {
                    state: Arc::clone(state),
                    error,
                });
                self.finish(state);
            }
        }
        true
    }

    fn finish(&mut self, state: &Arc<DecoderState>) {
        state.set(DECODING_COMPLETE);
        debug!(
            "Decoding complete: {} ({} frames)",
            state.decoder.source(),
            state.frames_decoded()
        );
        self.current = None;
        self.notify(DecodeNotice::Complete(Arc::clone(state)));
    }
}
