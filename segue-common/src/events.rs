//! Event types broadcast by the playback engine
//!
//! `PlayerEvent` mirrors the delegate notifications in a serialisable form so
//! observers (loggers, UIs, test harnesses) can subscribe without registering
//! callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback state
///
/// Always derived from (graph running, node rendering); never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackState {
    /// Derive the state from the two underlying booleans
    pub fn derive(graph_running: bool, node_playing: bool) -> Self {
        if !graph_running {
            PlaybackState::Stopped
        } else if !node_playing {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Identity of a decoder as seen by observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderInfo {
    pub id: Uuid,
    pub source: String,
}

/// Engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Derived playback state flipped
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// The decoder being rendered changed (None = nothing rendering)
    NowPlayingChanged {
        decoder: Option<DecoderInfo>,
        timestamp: DateTime<Utc>,
    },

    DecodingStarted {
        decoder: DecoderInfo,
        timestamp: DateTime<Utc>,
    },

    DecodingComplete {
        decoder: DecoderInfo,
        timestamp: DateTime<Utc>,
    },

    /// Decoding was preempted; `partially_rendered` is true if any of its
    /// frames reached the output
    DecodingCanceled {
        decoder: DecoderInfo,
        partially_rendered: bool,
        timestamp: DateTime<Utc>,
    },

    RenderingWillStart {
        decoder: DecoderInfo,
        timestamp: DateTime<Utc>,
    },

    RenderingStarted {
        decoder: DecoderInfo,
        timestamp: DateTime<Utc>,
    },

    RenderingComplete {
        decoder: DecoderInfo,
        timestamp: DateTime<Utc>,
    },

    /// The node's gapless chain and the overflow queue are exhausted
    EndOfAudio { timestamp: DateTime<Utc> },

    /// The render graph was rebuilt (format change or external interruption)
    ConfigurationChanged {
        sample_rate: u32,
        channels: u16,
        forced: bool,
        timestamp: DateTime<Utc>,
    },

    /// A failure the engine absorbed (e.g. during queue promotion)
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::NowPlayingChanged { .. } => "NowPlayingChanged",
            PlayerEvent::DecodingStarted { .. } => "DecodingStarted",
            PlayerEvent::DecodingComplete { .. } => "DecodingComplete",
            PlayerEvent::DecodingCanceled { .. } => "DecodingCanceled",
            PlayerEvent::RenderingWillStart { .. } => "RenderingWillStart",
            PlayerEvent::RenderingStarted { .. } => "RenderingStarted",
            PlayerEvent::RenderingComplete { .. } => "RenderingComplete",
            PlayerEvent::EndOfAudio { .. } => "EndOfAudio",
            PlayerEvent::ConfigurationChanged { .. } => "ConfigurationChanged",
            PlayerEvent::Error { .. } => "Error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_derivation_truth_table() {
        assert_eq!(PlaybackState::derive(false, false), PlaybackState::Stopped);
        assert_eq!(PlaybackState::derive(false, true), PlaybackState::Stopped);
        assert_eq!(PlaybackState::derive(true, false), PlaybackState::Paused);
        assert_eq!(PlaybackState::derive(true, true), PlaybackState::Playing);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&PlaybackState::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
        assert_eq!(PlaybackState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_event_tagged_serialization() {
        let event = PlayerEvent::DecodingCanceled {
            decoder: DecoderInfo {
                id: Uuid::nil(),
                source: "tone:440".to_string(),
            },
            partially_rendered: true,
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "DecodingCanceled");
        assert_eq!(value["partially_rendered"], true);
        assert_eq!(event.name(), "DecodingCanceled");
    }
}
