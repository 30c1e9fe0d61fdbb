//! Notifier thread
//!
//! Converts decoding notices and render events into `NodeEvent`s. Rendering
//! is reported as started once the host time of the decoder's first frame has
//! passed. End of audio is detected here, after a completion, by checking
//! under the queue lock that nothing is queued or still active.

use super::decoder_state::DecoderState;
use super::{DecodeNotice, NodeShared, RenderEvent};
use crate::playback::events::{NodeEvent, NodeEventSink};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use ringbuf::traits::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub(super) struct Notifier {
    shared: Arc<NodeShared>,
    notices: Receiver<DecodeNotice>,
    events: ringbuf::HeapCons<RenderEvent>,
    sink: NodeEventSink,
    tick: Duration,
    tracked: Vec<Arc<DecoderState>>,
    pending_starts: Vec<(u64, Instant)>,
}

impl Notifier {
    pub fn new(
        shared: Arc<NodeShared>,
        notices: Receiver<DecodeNotice>,
        events: ringbuf::HeapCons<RenderEvent>,
        sink: NodeEventSink,
        tick_ms: u64,
    ) -> Self {
        Self {
            shared,
            notices,
            events,
            sink,
            tick: Duration::from_millis(tick_ms.max(1)),
            tracked: Vec::new(),
            pending_starts: Vec::new(),
        }
    }

    pub fn run(mut self) {
        debug!("Notifier thread started");

        while !self.shared.shutdown.load(Ordering::Acquire) {
            match self.notices.recv_timeout(self.tick) {
                Ok(notice) => self.handle_notice(notice),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(self.tick),
            }
            self.drain_notices();

            while let Some(event) = self.events.try_pop() {
                self.handle_render_event(event);
            }

            self.emit_due_starts(Instant::now());
        }

        debug!("Notifier thread stopped");
    }

    fn emit(&self, event: NodeEvent) {
        trace!("Node event: {}", event.name());
        (self.sink)(event);
    }

    fn drain_notices(&mut self) {
        while let Ok(notice) = self.notices.try_recv() {
            self.handle_notice(notice);
        }
    }

    fn handle_notice(&mut self, notice: DecodeNotice) {
        match notice {
            DecodeNotice::Started(state) => {
                let decoder = state.decoder.clone();
                self.tracked.push(state);
                self.emit(NodeEvent::DecodingStarted(decoder));
            }
            DecodeNotice::Complete(state) => {
                self.emit(NodeEvent::DecodingComplete(state.decoder.clone()));
            }
            DecodeNotice::Canceled {
                state,
                partially_rendered,
            } => {
                // Announced starts are honored before the cancellation
                self.flush_start(state.sequence);
                self.untrack(state.sequence);
                self.emit(NodeEvent::DecodingCanceled {
                    decoder: state.decoder.clone(),
                    partially_rendered,
                });
            }
            DecodeNotice::Failed { state, error } => {
                self.emit(NodeEvent::DecodeError {
                    decoder: state.decoder.clone(),
                    error,
                });
            }
        }
    }

    fn handle_render_event(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::WillStart {
                sequence,
                host_time,
            } => {
                let Some(state) = self.lookup(sequence) else {
                    return;
                };
                self.pending_starts.push((sequence, host_time));
                self.emit(NodeEvent::RenderingWillStart {
                    decoder: state.decoder.clone(),
                    host_time,
                });
            }
            RenderEvent::Complete { sequence } => {
                let Some(state) = self.lookup(sequence) else {
                    return;
                };
                self.flush_start(sequence);
                self.untrack(sequence);
                self.emit(NodeEvent::RenderingComplete(state.decoder.clone()));
                self.check_end_of_audio();
            }
        }
    }

    /// Find a tracked decoder, catching up on notices if it is not known yet
    fn lookup(&mut self, sequence: u64) -> Option<Arc<DecoderState>> {
        if let Some(state) = self.find(sequence) {
            return Some(state);
        }
        self.drain_notices();
        self.find(sequence)
    }

    fn find(&self, sequence: u64) -> Option<Arc<DecoderState>> {
        self.tracked
            .iter()
            .find(|s| s.sequence == sequence)
            .cloned()
    }

    fn untrack(&mut self, sequence: u64) {
        self.tracked.retain(|s| s.sequence != sequence);
    }

    fn emit_due_starts(&mut self, now: Instant) {
        let due: Vec<u64> = self
            .pending_starts
            .iter()
            .filter(|(_, host_time)| *host_time <= now)
            .map(|(sequence, _)| *sequence)
            .collect();
        for sequence in due {
            self.flush_start(sequence);
        }
    }

    /// Emit `RenderingStarted` for `sequence` if it is still pending
    fn flush_start(&mut self, sequence: u64) {
        let Some(index) = self.pending_starts.iter().position(|(s, _)| *s == sequence) else {
            return;
        };
        self.pending_starts.remove(index);
        if let Some(state) = self.find(sequence) {
            self.emit(NodeEvent::RenderingStarted(state.decoder.clone()));
        }
    }

    fn check_end_of_audio(&self) {
        let ended = {
            let queue = self.shared.queue.lock();
            queue.is_empty() && !self.shared.has_unfinished_states()
        };
        if ended {
            debug!("End of audio");
            self.emit(NodeEvent::EndOfAudio);
        }
    }
}
