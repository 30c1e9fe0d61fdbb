//! Playback node, engine and their shared plumbing

pub mod delegate;
pub mod engine;
pub mod events;
pub mod flags;
pub mod node;
pub mod ring_buffer;

pub use delegate::PlayerDelegate;
pub use engine::{PlaybackEngine, PlaybackEngineBuilder, PlayerStatus};
pub use events::{NodeEvent, NodeEventSink};
pub use flags::PlayerFlags;
pub use node::{NodePosition, NodeTime, PlaybackNode};
