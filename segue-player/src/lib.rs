//! # Segue Player Library (segue-player)
//!
//! Gapless playback orchestration over a mutable render graph.
//!
//! **Purpose:** Play decoders back to back without gaps, rebuild the render
//! graph when the processing format changes, and keep playback state and the
//! now-playing decoder consistent across the control, decoding and render
//! threads.
//!
//! **Architecture:** `PlaybackEngine` owns a `RenderGraph` and one
//! `PlaybackNode` at a time. All graph mutation runs on a single control
//! thread; the node reports render-side events back to it by message passing.

pub mod audio;
pub mod error;
pub mod graph;
pub mod playback;

pub use audio::{
    Decoder, DecoderFactory, DecoderHandle, DeviceQuery, OutputDevice, ProcessingFormat,
    ProgramSource, StaticDevices, ToneDecoder,
};
pub use error::{Error, Result};
pub use graph::{RenderGraph, SoftwareGraph};
pub use playback::{
    PlaybackEngine, PlaybackEngineBuilder, PlaybackNode, PlayerDelegate, PlayerStatus,
};
pub use segue_common::{PlaybackState, PlayerEvent};
