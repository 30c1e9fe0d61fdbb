//! Playback engine (orchestrator)
//!
//! **Module Structure:**
//! - `core.rs`: shared state, transport, notifications, shutdown
//! - `control.rs`: serial control thread and synchronous hand-off
//! - `builder.rs`: construction and initial graph wiring
//! - `queue.rs`: play/enqueue, skip, overflow queue
//! - `reconfigure.rs`: node replacement on format change or interruption
//! - `events.rs`: node events → NowPlaying, delegate, broadcast
//! - `diagnostics.rs`: seek, volume, output device, status

mod builder;
mod control;
mod core;
mod diagnostics;
mod events;
mod queue;
mod reconfigure;

pub use builder::PlaybackEngineBuilder;
pub use core::PlaybackEngine;
pub use diagnostics::PlayerStatus;
pub use reconfigure::render_frame_budget;
