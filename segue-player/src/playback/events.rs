//! Events a playback node reports to its owner
//!
//! Delivered from the node's notifier thread, never from the render context.
//! Events for one decoder arrive in lifecycle order: decoding started,
//! rendering will start, rendering started, then rendering complete or
//! decoding canceled. When one decoder hands over to the next within a render
//! cycle, the successor's `RenderingWillStart` precedes the predecessor's
//! `RenderingComplete`.

use crate::audio::DecoderHandle;
use crate::error::Error;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle notification from a playback node
#[derive(Debug)]
pub enum NodeEvent {
    DecodingStarted(DecoderHandle),
    DecodingComplete(DecoderHandle),
    DecodingCanceled {
        decoder: DecoderHandle,
        /// Some of the decoder's frames reached the output
        partially_rendered: bool,
    },
    RenderingWillStart {
        decoder: DecoderHandle,
        /// When the decoder's first frame reaches the output
        host_time: Instant,
    },
    RenderingStarted(DecoderHandle),
    RenderingComplete(DecoderHandle),
    /// The last queued decoder finished rendering and nothing follows
    EndOfAudio,
    /// A decoder failed mid-stream; its decoding ends at the failure
    DecodeError { decoder: DecoderHandle, error: Error },
}

impl NodeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NodeEvent::DecodingStarted(_) => "DecodingStarted",
            NodeEvent::DecodingComplete(_) => "DecodingComplete",
            NodeEvent::DecodingCanceled { .. } => "DecodingCanceled",
            NodeEvent::RenderingWillStart { .. } => "RenderingWillStart",
            NodeEvent::RenderingStarted(_) => "RenderingStarted",
            NodeEvent::RenderingComplete(_) => "RenderingComplete",
            NodeEvent::EndOfAudio => "EndOfAudio",
            NodeEvent::DecodeError { .. } => "DecodeError",
        }
    }
}

/// Receives node events; called on the node's notifier thread
pub type NodeEventSink = Arc<dyn Fn(NodeEvent) + Send + Sync>;
