//! # Segue Common Library
//!
//! Shared code for the segue playback crates:
//! - Configuration loading and path resolution
//! - Logging initialisation
//! - Event types (`PlayerEvent`, `PlaybackState`)
//! - Frame/time conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
pub use events::{PlaybackState, PlayerEvent};
