//! Core playback engine - state, lifecycle and transport
//!
//! **Responsibilities:**
//! - `EngineShared`: everything the control thread and callers share
//! - Transport (play, pause, stop, reset, toggle)
//! - Observable notifications (playback state, now playing, broadcast events)
//! - Shutdown
//!
//! PlaybackState is never stored: it is derived from whether the graph runs
//! and whether the node renders. The last reported value is kept only to
//! decide when to notify.

use super::builder::PlaybackEngineBuilder;
use super::control::{ControlMessage, ControlQueue};
use crate::audio::{DecoderFactory, DecoderHandle, DeviceQuery};
use crate::error::{Error, Result};
use crate::graph::{NodeId, RenderGraph};
use crate::playback::delegate::PlayerDelegate;
use crate::playback::flags::PlayerFlags;
use crate::playback::node::PlaybackNode;
use arc_swap::ArcSwap;
use chrono::Utc;
use parking_lot::Mutex;
use segue_common::config::PlaybackConfig;
use segue_common::{PlaybackState, PlayerEvent};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn, Dispatch};

/// State touched only on the control thread
pub(super) struct ControlState {
    /// Graph id of the current node
    pub node_id: NodeId,
    /// Token of the current node; events carrying another token are stale
    pub node_token: u64,
    pub next_token: u64,
    /// Last playback state reported to observers
    pub reported_state: PlaybackState,
}

/// Engine state shared by the public handle and the control thread
pub(crate) struct EngineShared {
    pub(super) graph: Arc<dyn RenderGraph>,
    /// Swapped only after the replacement is attached and connected
    pub(super) node: ArcSwap<PlaybackNode>,
    pub(super) flags: PlayerFlags,
    pub(super) now_playing: Mutex<Option<DecoderHandle>>,
    /// Decoders whose format did not join the node at enqueue time (FIFO)
    pub(super) overflow: Mutex<VecDeque<DecoderHandle>>,
    pub(super) control_state: Mutex<ControlState>,
    pub(super) control: ControlQueue,
    pub(super) delegate: PlayerDelegate,
    pub(super) events: broadcast::Sender<PlayerEvent>,
    pub(super) config: PlaybackConfig,
    pub(super) decoder_factory: Option<Arc<dyn DecoderFactory>>,
    pub(super) devices: Option<Arc<dyn DeviceQuery>>,
    pub(super) dispatch: Dispatch,
}

impl EngineShared {
    pub(super) fn playback_state(&self) -> PlaybackState {
        PlaybackState::derive(self.graph.is_running(), self.node.load().is_playing())
    }

    /// Broadcast an event to subscribers (no receivers is fine)
    pub(super) fn broadcast(&self, event: PlayerEvent) {
        trace!("Broadcasting {}", event.name());
        let _ = self.events.send(event);
    }

    /// Notify observers if the derived state differs from the last report
    pub(super) fn update_playback_state(&self) {
        let new_state = self.playback_state();
        let old_state = {
            let mut control = self.control_state.lock();
            if control.reported_state == new_state {
                return;
            }
            std::mem::replace(&mut control.reported_state, new_state)
        };

        info!("Playback state: {} -> {}", old_state, new_state);
        self.delegate.playback_state_changed(new_state);
        self.broadcast(PlayerEvent::PlaybackStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    /// Replace NowPlaying, notifying only on an actual change
    pub(super) fn set_now_playing(&self, decoder: Option<DecoderHandle>) {
        let previous = {
            let mut now_playing = self.now_playing.lock();
            if *now_playing == decoder {
                return;
            }
            std::mem::replace(&mut *now_playing, decoder.clone())
        };

        match &decoder {
            Some(d) => debug!("Now playing: {}", d.source()),
            None => debug!("Now playing: nothing"),
        }
        self.delegate
            .now_playing_changed(decoder.as_ref(), previous.as_ref());
        self.broadcast(PlayerEvent::NowPlayingChanged {
            decoder: decoder.as_ref().map(DecoderHandle::info),
            timestamp: Utc::now(),
        });
    }

    /// Report a failure the engine absorbed
    pub(super) fn report_error(&self, error: &Error) {
        error!("{}", error);
        self.delegate.encountered_error(error);
        self.broadcast(PlayerEvent::Error {
            message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub(super) fn clear_overflow(&self) -> usize {
        let mut overflow = self.overflow.lock();
        let count = overflow.len();
        overflow.clear();
        count
    }

    pub(super) fn play(&self) -> Result<()> {
        if self.playback_state() == PlaybackState::Playing {
            return Ok(());
        }

        if let Some(decoder) = self.take_idle_promotion() {
            return self.promote_decoder(decoder);
        }
        self.play_returning_error()
    }

    /// Overflow head to play when the node holds nothing to render
    fn take_idle_promotion(&self) -> Option<DecoderHandle> {
        if self.flags.have_pending_decoder() || self.node.load().has_pending_audio() {
            return None;
        }
        let decoder = self.overflow.lock().pop_front()?;
        debug!("Promoting {} from overflow queue", decoder.source());
        Some(decoder)
    }

    /// Start the graph if needed, then the node
    pub(super) fn play_returning_error(&self) -> Result<()> {
        if !self.graph.is_running() {
            if let Err(e) = self.graph.start() {
                error!("Render graph failed to start: {}", e);
                self.update_playback_state();
                return Err(match e {
                    Error::GraphStart(_) => e,
                    other => Error::GraphStart(other.to_string()),
                });
            }
        }

        self.node.load().play();
        self.update_playback_state();
        Ok(())
    }

    pub(super) fn pause(&self) {
        if self.playback_state() != PlaybackState::Playing {
            return;
        }
        self.node.load().pause();
        self.update_playback_state();
    }

    pub(super) fn stop(&self) {
        if self.playback_state() == PlaybackState::Stopped {
            // No graph operation, but nothing may stay queued after a stop
            let queued = self.node.load().clear_queue() + self.clear_overflow();
            debug!("Already stopped ({} queued decoders dropped)", queued);
            return;
        }

        self.graph.stop();
        self.node.load().stop();
        self.flags.clear_all();
        let dropped = self.clear_overflow();
        info!("Playback stopped ({} overflow decoders dropped)", dropped);
        self.update_playback_state();
    }

    pub(super) fn reset(&self) {
        self.graph.reset();
        self.node.load().reset();
        self.flags.clear_all();
        let dropped = self.clear_overflow();
        debug!("Playback reset ({} overflow decoders dropped)", dropped);
        self.update_playback_state();
    }

    pub(super) fn toggle_play_pause(&self) -> Result<()> {
        match self.playback_state() {
            PlaybackState::Playing => {
                self.pause();
                Ok(())
            }
            _ => self.play(),
        }
    }

    /// Release the graph before the control thread exits
    fn teardown(&self) {
        self.graph.set_configuration_change_handler(None);
        if self.graph.is_running() {
            self.graph.stop();
        }

        let node = self.node.load_full();
        node.stop();
        self.flags.clear_all();
        let node_id = self.control_state.lock().node_id;
        if let Err(e) = self.graph.detach(node_id) {
            warn!("Failed to detach {} during shutdown: {}", node_id, e);
        }

        self.clear_overflow();
        self.set_now_playing(None);
        self.update_playback_state();
    }
}

/// Gapless playback orchestrator
///
/// Owns the render graph wiring, the playback node, the overflow queue and
/// the now-playing reference. Control operations are synchronous: each runs
/// on the engine's control thread and returns once it has fully succeeded or
/// failed.
pub struct PlaybackEngine {
    pub(super) shared: Arc<EngineShared>,
    control_thread: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    pub fn builder(graph: Arc<dyn RenderGraph>) -> PlaybackEngineBuilder {
        PlaybackEngineBuilder::new(graph)
    }

    pub(super) fn from_parts(shared: Arc<EngineShared>, control_thread: JoinHandle<()>) -> Self {
        Self {
            shared,
            control_thread: Mutex::new(Some(control_thread)),
        }
    }

    /// Start or resume playback; no-op if already playing.
    ///
    /// Fails with `Error::GraphStart` if the graph cannot start, leaving the
    /// engine stopped.
    pub fn play(&self) -> Result<()> {
        self.shared.run_sync(|shared| shared.play())?
    }

    /// Pause rendering; no-op unless playing
    pub fn pause(&self) -> Result<()> {
        self.shared.run_sync(|shared| shared.pause())
    }

    /// Halt the graph and node and drop the overflow queue; no-op if stopped
    pub fn stop(&self) -> Result<()> {
        self.shared.run_sync(|shared| shared.stop())
    }

    /// Reset graph and node and drop the overflow queue
    pub fn reset(&self) -> Result<()> {
        self.shared.run_sync(|shared| shared.reset())
    }

    pub fn toggle_play_pause(&self) -> Result<()> {
        self.shared.run_sync(|shared| shared.toggle_play_pause())?
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.shared.playback_state()
    }

    pub fn is_playing(&self) -> bool {
        self.playback_state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.playback_state() == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.playback_state() == PlaybackState::Stopped
    }

    /// The decoder currently being rendered
    pub fn now_playing(&self) -> Option<DecoderHandle> {
        self.shared.now_playing.lock().clone()
    }

    /// Subscribe to engine events
    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.shared.events.subscribe()
    }

    /// Stop playback, release the graph and join the control thread.
    ///
    /// Idempotent; later control calls fail with `Error::ControlContextGone`.
    pub fn shutdown(&self) {
        let Some(handle) = self.control_thread.lock().take() else {
            return;
        };

        if self.shared.control.is_control_thread() {
            // Called from a delegate callback: the thread cannot join itself
            self.shared.teardown();
            let _ = self.shared.control.post(ControlMessage::Shutdown);
            return;
        }

        if self.shared.run_sync(|shared| shared.teardown()).is_err() {
            warn!("Control thread gone before shutdown");
        }
        let _ = self.shared.control.post(ControlMessage::Shutdown);
        if handle.join().is_err() {
            warn!("Control thread panicked");
        }
        info!("Playback engine shut down");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.playback_state())
            .field("node", &*self.shared.node.load())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ProcessingFormat;
    use crate::graph::SoftwareGraph;

    fn engine() -> PlaybackEngine {
        PlaybackEngine::builder(Arc::new(SoftwareGraph::new(
            ProcessingFormat::standard(44100, 2),
            512,
        )))
        .build()
        .unwrap()
    }

    const BOTH: u32 = PlayerFlags::RENDERING_IMMINENT | PlayerFlags::HAVE_PENDING_DECODER;

    #[test]
    fn test_stop_clears_every_guard_flag() {
        let engine = engine();
        engine.play().unwrap();
        engine.shared.flags.set(BOTH);

        engine.stop().unwrap();
        assert_eq!(engine.shared.flags.snapshot(), 0);
    }

    #[test]
    fn test_reset_clears_every_guard_flag() {
        let engine = engine();
        engine.shared.flags.set(BOTH);

        engine.reset().unwrap();
        assert_eq!(engine.shared.flags.snapshot(), 0);
    }
}
