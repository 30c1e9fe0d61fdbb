//! Gapless playback node
//!
//! A `PlaybackNode` renders one fixed format. Decoders whose format joins
//! gaplessly with it are queued and decoded back to back into a single PCM
//! ring, so the last frame of one decoder is followed by the first frame of
//! the next within the same render cycle.
//!
//! Three contexts share the node:
//! - decoding thread: dequeues decoders, fills the ring, applies cancel and
//!   seek requests (`decoding.rs`)
//! - render callback: drains the ring and attributes frames to decoders
//!   (`render.rs`); lock-free apart from a `try_lock` on the ring consumer
//! - notifier thread: turns decoding notices and render events into
//!   `NodeEvent`s for the owner (`notifier.rs`)

mod decoder_state;
mod decoding;
mod notifier;
mod render;

use crate::audio::{DecoderHandle, ProcessingFormat};
use crate::error::{Error, Result};
use crate::graph::{RenderSource, RenderTimestamp};
use crate::playback::events::NodeEventSink;
use crate::playback::ring_buffer::{PcmConsumer, PcmRingBuffer, RingBufferStats};
use arc_swap::ArcSwapOption;
use crossbeam_channel::Sender;
use decoder_state::state_flags::CANCEL_REQUESTED;
use decoder_state::DecoderState;
use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use segue_common::config::PlaybackConfig;
use segue_common::time::frames_to_seconds;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, warn, Dispatch};

/// Upper bound on concurrently active decoders
pub const MAX_ACTIVE_DECODERS: usize = 64;

/// Render context → notifier
#[derive(Debug, Clone, Copy)]
pub(crate) enum RenderEvent {
    WillStart { sequence: u64, host_time: Instant },
    Complete { sequence: u64 },
}

/// Decoding thread → notifier
pub(crate) enum DecodeNotice {
    Started(Arc<DecoderState>),
    Complete(Arc<DecoderState>),
    Canceled {
        state: Arc<DecoderState>,
        partially_rendered: bool,
    },
    Failed {
        state: Arc<DecoderState>,
        error: Error,
    },
}

/// Playback position of the decoder currently reaching the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePosition {
    pub frame: u64,
    pub frame_length: Option<u64>,
    pub sample_rate: u32,
}

/// Playback time of the decoder currently reaching the output, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTime {
    pub current: f64,
    pub total: Option<f64>,
}

impl From<NodePosition> for NodeTime {
    fn from(position: NodePosition) -> Self {
        Self {
            current: frames_to_seconds(position.frame, position.sample_rate),
            total: position
                .frame_length
                .map(|length| frames_to_seconds(length, position.sample_rate)),
        }
    }
}

pub(crate) struct NodeShared {
    format: ProcessingFormat,
    playing: AtomicBool,
    shutdown: AtomicBool,
    queue: Mutex<VecDeque<DecoderHandle>>,
    queued: AtomicUsize,
    slots: Box<[ArcSwapOption<DecoderState>]>,
    consumer: Mutex<PcmConsumer>,
    render_events: Mutex<ringbuf::HeapProd<RenderEvent>>,
    dropped_events: AtomicU64,
    wake: Sender<()>,
}

impl NodeShared {
    fn wake_decoder(&self) {
        // A pending wake-up is as good as a new one
        let _ = self.wake.try_send(());
    }

    /// Occupied slots, ascending by sequence
    fn active_states(&self) -> Vec<Arc<DecoderState>> {
        let mut states: Vec<_> = self.slots.iter().filter_map(|s| s.load_full()).collect();
        states.sort_by_key(|s| s.sequence);
        states
    }

    /// The earliest decoder that still renders and can be canceled
    fn current_state(&self) -> Option<Arc<DecoderState>> {
        self.active_states().into_iter().find(|s| !s.is_settled())
    }

    /// Whether any decoder still has frames to deliver
    fn has_unfinished_states(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(&*slot.load(), Some(state) if !state.is_finished()))
    }

    fn request_cancel_all(&self) -> usize {
        let mut count = 0;
        for state in self.active_states() {
            if !state.is_settled() {
                state.set(CANCEL_REQUESTED);
                count += 1;
            }
        }
        count
    }

    fn clear_queue(&self) -> usize {
        let mut queue = self.queue.lock();
        let count = queue.len();
        queue.clear();
        self.queued.store(0, Ordering::Release);
        count
    }
}

/// Gapless source node for one processing format
pub struct PlaybackNode {
    shared: Arc<NodeShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackNode {
    /// Create a node rendering `format` and start its decoding and notifier
    /// threads.
    ///
    /// Events are delivered to `sink` on the notifier thread. Both threads log
    /// through `dispatch`.
    pub fn new(
        format: ProcessingFormat,
        config: &PlaybackConfig,
        sink: NodeEventSink,
        dispatch: Dispatch,
    ) -> Result<Self> {
        if format.canonical().is_none() {
            return Err(Error::FormatConversion(format.to_string()));
        }

        let (producer, consumer) =
            PcmRingBuffer::new(config.ring_buffer_frames, format.channels).split();
        let (event_producer, event_consumer) =
            HeapRb::<RenderEvent>::new(config.event_ring_capacity.max(1)).split();
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let (notice_tx, notice_rx) = crossbeam_channel::unbounded();

        let slot_count = config.active_decoder_slots.clamp(2, MAX_ACTIVE_DECODERS);
        let slots = (0..slot_count).map(|_| ArcSwapOption::empty()).collect();

        let shared = Arc::new(NodeShared {
            format,
            playing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            queued: AtomicUsize::new(0),
            slots,
            consumer: Mutex::new(consumer),
            render_events: Mutex::new(event_producer),
            dropped_events: AtomicU64::new(0),
            wake: wake_tx,
        });

        let decoding = decoding::DecodingLoop::new(
            Arc::clone(&shared),
            producer,
            wake_rx,
            notice_tx,
            config.decode_chunk_frames,
            config.notifier_tick_ms,
        );
        let notifier = notifier::Notifier::new(
            Arc::clone(&shared),
            notice_rx,
            event_consumer,
            sink,
            config.notifier_tick_ms,
        );

        let node = Self {
            shared,
            threads: Mutex::new(Vec::with_capacity(2)),
        };
        node.spawn("segue-decode", dispatch.clone(), move || decoding.run())?;
        node.spawn("segue-notify", dispatch, move || notifier.run())?;

        debug!("Created playback node for {}", format);
        Ok(node)
    }

    fn spawn<F>(&self, name: &str, dispatch: Dispatch, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                body();
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn {} thread: {}", name, e)))?;
        self.threads.lock().push(handle);
        Ok(())
    }

    /// The format this node renders
    pub fn format(&self) -> ProcessingFormat {
        self.shared.format
    }

    /// Whether decoders in `format` can be queued here
    pub fn supports_format(&self, format: &ProcessingFormat) -> bool {
        self.shared.format.joins_gaplessly_with(format)
    }

    /// Append a decoder to the gapless queue.
    ///
    /// The decoder is opened if needed; its format must join gaplessly with
    /// the node's.
    pub fn enqueue(&self, decoder: DecoderHandle) -> Result<()> {
        decoder.open()?;
        let format = decoder
            .processing_format()
            .ok_or_else(|| Error::InvalidState(format!("{} has no format", decoder.source())))?;
        if !self.supports_format(&format) {
            return Err(Error::FormatMismatch {
                decoder: format.to_string(),
                node: self.shared.format.to_string(),
            });
        }

        {
            let mut queue = self.shared.queue.lock();
            debug!("Queued {} (position {})", decoder.source(), queue.len());
            queue.push_back(decoder);
            self.shared.queued.store(queue.len(), Ordering::Release);
        }
        self.shared.wake_decoder();
        Ok(())
    }

    /// Cancel everything and make `decoder` the only queued decoder.
    ///
    /// Nothing changes if the decoder is rejected.
    pub fn reset_and_enqueue(&self, decoder: DecoderHandle) -> Result<()> {
        decoder.open()?;
        if let Some(format) = decoder.processing_format() {
            if !self.supports_format(&format) {
                return Err(Error::FormatMismatch {
                    decoder: format.to_string(),
                    node: self.shared.format.to_string(),
                });
            }
        }
        self.reset();
        self.enqueue(decoder)
    }

    /// Drop all queued (not yet decoding) decoders
    pub fn clear_queue(&self) -> usize {
        self.shared.clear_queue()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.shared.queued.load(Ordering::Acquire) == 0
    }

    /// Decoders queued but not yet decoding
    pub fn queued_len(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Whether the node holds anything it could still render
    pub fn has_pending_audio(&self) -> bool {
        !self.queue_is_empty() || self.shared.has_unfinished_states()
    }

    pub fn play(&self) {
        self.shared.playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Whether a decoder is active and can deliver frames
    pub fn is_ready(&self) -> bool {
        self.shared.current_state().is_some()
    }

    /// Pause and cancel everything
    pub fn stop(&self) {
        self.pause();
        self.reset();
    }

    /// Clear the queue and cancel all active decoders
    pub fn reset(&self) {
        let dropped = self.shared.clear_queue();
        let canceled = self.shared.request_cancel_all();
        if dropped > 0 || canceled > 0 {
            debug!(
                "Node reset: {} queued dropped, {} active canceled",
                dropped, canceled
            );
        }
        self.shared.wake_decoder();
    }

    /// Cancel the decoder currently rendering.
    ///
    /// Returns `false` if there is none.
    pub fn cancel_current_decoder(&self) -> bool {
        match self.shared.current_state() {
            Some(state) => {
                debug!("Canceling {}", state.decoder.source());
                state.set(CANCEL_REQUESTED);
                self.shared.wake_decoder();
                true
            }
            None => false,
        }
    }

    /// The decoder currently rendering (or next to render)
    pub fn current_decoder(&self) -> Option<DecoderHandle> {
        self.shared.current_state().map(|s| s.decoder.clone())
    }

    pub fn supports_seeking(&self) -> bool {
        self.shared
            .current_state()
            .is_some_and(|s| s.decoder.supports_seeking())
    }

    /// Request a seek within the current decoder.
    ///
    /// Only possible while no later decoder has started decoding, since its
    /// frames would already follow in the ring. Returns whether the request
    /// was accepted; the decoding thread applies it.
    pub fn seek_to_frame(&self, frame: u64) -> bool {
        let states = self.shared.active_states();
        let Some(index) = states.iter().position(|s| !s.is_settled()) else {
            return false;
        };
        if index + 1 < states.len() {
            debug!("Seek refused: next decoder already decoding");
            return false;
        }

        let state = &states[index];
        if !state.decoder.supports_seeking() {
            return false;
        }
        if let Some(length) = state.decoder.frame_length() {
            if frame >= length {
                return false;
            }
        }

        state.request_seek(frame);
        self.shared.wake_decoder();
        true
    }

    /// Position of the decoder currently reaching the output
    pub fn playback_position(&self) -> Option<NodePosition> {
        self.shared.current_state().map(|state| NodePosition {
            frame: state.playback_frame(),
            frame_length: state.decoder.frame_length(),
            sample_rate: state.sample_rate,
        })
    }

    pub fn playback_time(&self) -> Option<NodeTime> {
        self.playback_position().map(NodeTime::from)
    }

    /// Whether a decoder after the current one is already decoding
    pub fn has_active_successor(&self) -> bool {
        let states = self.shared.active_states();
        match states.iter().position(|s| !s.is_settled()) {
            Some(index) => states[index + 1..].iter().any(|s| !s.is_settled()),
            None => false,
        }
    }

    pub fn ring_stats(&self) -> RingBufferStats {
        self.shared.consumer.lock().stats()
    }

    /// Render events dropped because the event ring was full
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped_events.load(Ordering::Relaxed)
    }
}

impl RenderSource for PlaybackNode {
    fn render(&self, timestamp: &RenderTimestamp, output: &mut [f32], frames: usize) {
        render::render(&self.shared, timestamp, output, frames);
    }

    fn format(&self) -> ProcessingFormat {
        self.shared.format
    }
}

impl Drop for PlaybackNode {
    fn drop(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake_decoder();

        for handle in self.threads.lock().drain(..) {
            if handle.join().is_err() {
                warn!("Playback node thread panicked");
            }
        }
        debug!("Playback node for {} shut down", self.shared.format);
    }
}

impl std::fmt::Debug for PlaybackNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackNode")
            .field("format", &self.shared.format)
            .field("playing", &self.is_playing())
            .field("queued", &self.queued_len())
            .finish()
    }
}
