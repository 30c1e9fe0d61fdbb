//! Error types for segue-player
//!
//! Every public control operation either fully succeeds or returns one of
//! these before returning; graph and node pointers are never left half-swapped.

use thiserror::Error;

/// Main error type for segue-player
#[derive(Error, Debug)]
pub enum Error {
    /// Decoder failed to open (carries the decoder's diagnostic)
    #[error("Failed to open decoder: {0}")]
    Open(String),

    /// No canonical equivalent exists for a requested format
    #[error("No canonical equivalent for format: {0}")]
    FormatConversion(String),

    /// The playback node rejected a decoder
    #[error("Failed to enqueue decoder: {0}")]
    Enqueue(Box<Error>),

    /// The render graph failed to start
    #[error("Render graph failed to start: {0}")]
    GraphStart(String),

    /// Gapless append rejected because formats differ
    #[error("Format mismatch: decoder {decoder} vs node {node}")]
    FormatMismatch { decoder: String, node: String },

    /// Topology or configuration error reported by the render graph
    #[error("Render graph error: {0}")]
    Graph(String),

    /// Decoder failed while producing frames or seeking
    #[error("Decode error: {0}")]
    Decode(String),

    /// Requested output device is unknown to the device service
    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The serial control context has shut down
    #[error("Control context is no longer running")]
    ControlContextGone,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] segue_common::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` if the failure is a format/compatibility problem
    pub fn is_format_error(&self) -> bool {
        match self {
            Error::FormatConversion(_) | Error::FormatMismatch { .. } => true,
            Error::Enqueue(inner) => inner.is_format_error(),
            _ => false,
        }
    }

    /// Returns `true` if the failure came from the render graph
    pub fn is_graph_error(&self) -> bool {
        matches!(self, Error::Graph(_) | Error::GraphStart(_))
    }
}

/// Convenience Result type using segue-player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_wraps_format_mismatch() {
        let err = Error::Enqueue(Box::new(Error::FormatMismatch {
            decoder: "48000 Hz, 2 ch".into(),
            node: "44100 Hz, 2 ch".into(),
        }));
        assert!(err.is_format_error());
        assert!(!err.is_graph_error());
        assert!(err.to_string().contains("48000 Hz"));
    }

    #[test]
    fn test_graph_errors() {
        assert!(Error::GraphStart("device busy".into()).is_graph_error());
        assert!(!Error::Open("missing".into()).is_graph_error());
    }
}
