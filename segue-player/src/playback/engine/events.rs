//! Node event handling
//!
//! Node events arrive on the control thread tagged with the token of the node
//! that raised them. Events from a node that has since been replaced are
//! dropped; everything else updates NowPlaying and the flags, then fans out
//! to the delegate and the broadcast channel.

use super::control::ControlMessage;
use super::core::EngineShared;
use crate::audio::DecoderHandle;
use crate::playback::events::{NodeEvent, NodeEventSink};
use crate::playback::flags::PlayerFlags;
use chrono::Utc;
use crossbeam_channel::Sender;
use segue_common::PlayerEvent;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Sink forwarding a node's events to the control thread
pub(super) fn node_sink(sender: Sender<ControlMessage>, token: u64) -> NodeEventSink {
    Arc::new(move |event| {
        // The control thread is gone during shutdown; nothing left to notify
        let _ = sender.send(ControlMessage::Node { token, event });
    })
}

impl EngineShared {
    pub(super) fn handle_node_event(&self, token: u64, event: NodeEvent) {
        let current = self.control_state.lock().node_token;
        if token != current {
            trace!("Ignoring {} from replaced node (token {})", event.name(), token);
            return;
        }
        trace!("Node event: {}", event.name());

        match event {
            NodeEvent::DecodingStarted(decoder) => {
                self.flags.clear(PlayerFlags::HAVE_PENDING_DECODER);
                debug!("Decoding started: {}", decoder.source());
                self.delegate.decoding_started(&decoder);
                self.broadcast(PlayerEvent::DecodingStarted {
                    decoder: decoder.info(),
                    timestamp: Utc::now(),
                });
            }
            NodeEvent::DecodingComplete(decoder) => {
                debug!("Decoding complete: {}", decoder.source());
                self.delegate.decoding_complete(&decoder);
                self.broadcast(PlayerEvent::DecodingComplete {
                    decoder: decoder.info(),
                    timestamp: Utc::now(),
                });
            }
            NodeEvent::DecodingCanceled {
                decoder,
                partially_rendered,
            } => {
                debug!(
                    "Decoding canceled: {} (partially rendered: {})",
                    decoder.source(),
                    partially_rendered
                );
                if partially_rendered {
                    self.clear_now_playing_unless_successor(&decoder);
                }
                self.delegate.decoding_canceled(&decoder, partially_rendered);
                self.broadcast(PlayerEvent::DecodingCanceled {
                    decoder: decoder.info(),
                    partially_rendered,
                    timestamp: Utc::now(),
                });
            }
            NodeEvent::RenderingWillStart { decoder, host_time } => {
                self.flags.set(PlayerFlags::RENDERING_IMMINENT);
                debug!("Rendering will start: {}", decoder.source());
                self.delegate.rendering_will_start(&decoder, host_time);
                self.broadcast(PlayerEvent::RenderingWillStart {
                    decoder: decoder.info(),
                    timestamp: Utc::now(),
                });
            }
            NodeEvent::RenderingStarted(decoder) => {
                self.flags.clear(PlayerFlags::RENDERING_IMMINENT);
                info!("Rendering started: {}", decoder.source());
                self.set_now_playing(Some(decoder.clone()));
                self.delegate.rendering_started(&decoder);
                self.broadcast(PlayerEvent::RenderingStarted {
                    decoder: decoder.info(),
                    timestamp: Utc::now(),
                });
            }
            NodeEvent::RenderingComplete(decoder) => {
                debug!("Rendering complete: {}", decoder.source());
                self.clear_now_playing_unless_successor(&decoder);
                self.delegate.rendering_complete(&decoder);
                self.broadcast(PlayerEvent::RenderingComplete {
                    decoder: decoder.info(),
                    timestamp: Utc::now(),
                });
            }
            NodeEvent::EndOfAudio => self.handle_end_of_audio(),
            NodeEvent::DecodeError { decoder, error } => {
                debug!("Decode error in {}", decoder.source());
                self.report_error(&error);
            }
        }
    }

    /// Clear NowPlaying after `finished` stops rendering, unless a successor
    /// is already committed or about to render.
    fn clear_now_playing_unless_successor(&self, finished: &DecoderHandle) {
        let successor = PlayerFlags::RENDERING_IMMINENT | PlayerFlags::HAVE_PENDING_DECODER;
        if self.flags.intersects(successor) {
            trace!("Keeping now playing: successor in flight");
            return;
        }

        let is_current = match &*self.now_playing.lock() {
            Some(playing) => playing == finished,
            None => false,
        };
        if is_current {
            self.set_now_playing(None);
        }
    }

    /// Promote the overflow queue once the node has run dry.
    ///
    /// Entries that fail to play are reported and dropped. If nothing plays,
    /// the delegate is told, or playback stops when no delegate slot is set.
    fn handle_end_of_audio(&self) {
        loop {
            let Some(decoder) = self.overflow.lock().pop_front() else {
                break;
            };
            info!("End of audio: promoting {}", decoder.source());
            match self.promote_decoder(decoder) {
                Ok(()) => return,
                Err(e) => self.report_error(&e),
            }
        }

        info!("End of audio");
        self.broadcast(PlayerEvent::EndOfAudio {
            timestamp: Utc::now(),
        });
        if !self.delegate.end_of_audio() {
            self.stop();
        }
    }
}
