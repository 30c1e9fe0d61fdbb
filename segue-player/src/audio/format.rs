//! PCM processing formats
//!
//! A decoder advertises the format it produces; a playback node renders one
//! fixed format. Two formats join gaplessly when their canonical forms agree
//! on sample rate and channel count. Decoders always hand the node `f32`
//! frames, so encoding and interleaving are descriptive only.

use serde::{Deserialize, Serialize};

/// Highest channel count the graph accepts
pub const MAX_CHANNELS: u16 = 64;

/// Highest sample rate the graph accepts (Hz)
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Sample encoding of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleEncoding {
    Float32,
    Float64,
    Int16,
    Int24,
    Int32,
    /// 1-bit Direct Stream Digital; has no canonical PCM equivalent
    Dsd,
}

impl SampleEncoding {
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            SampleEncoding::Float32 => 32,
            SampleEncoding::Float64 => 64,
            SampleEncoding::Int16 => 16,
            SampleEncoding::Int24 => 24,
            SampleEncoding::Int32 => 32,
            SampleEncoding::Dsd => 1,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SampleEncoding::Float32 => "f32",
            SampleEncoding::Float64 => "f64",
            SampleEncoding::Int16 => "i16",
            SampleEncoding::Int24 => "i24",
            SampleEncoding::Int32 => "i32",
            SampleEncoding::Dsd => "dsd",
        }
    }
}

/// Channel count, sample rate and sample layout of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessingFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Sample encoding
    pub encoding: SampleEncoding,
    /// Interleaved (true) or one buffer per channel (false)
    pub interleaved: bool,
}

impl ProcessingFormat {
    pub fn new(sample_rate: u32, channels: u16, encoding: SampleEncoding, interleaved: bool) -> Self {
        Self {
            sample_rate,
            channels,
            encoding,
            interleaved,
        }
    }

    /// The graph's canonical layout: deinterleaved 32-bit float
    pub fn standard(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, SampleEncoding::Float32, false)
    }

    /// Whether this format already is the canonical layout
    pub fn is_standard(&self) -> bool {
        self.encoding == SampleEncoding::Float32 && !self.interleaved
    }

    /// Normalize to the canonical representation.
    ///
    /// Returns `None` when no canonical equivalent exists (DSD, zero or
    /// out-of-range channel counts or sample rates).
    pub fn canonical(&self) -> Option<ProcessingFormat> {
        if self.encoding == SampleEncoding::Dsd {
            return None;
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return None;
        }
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return None;
        }
        Some(Self::standard(self.sample_rate, self.channels))
    }

    /// Whether frames in `other` can follow frames in `self` without a rebuild
    pub fn joins_gaplessly_with(&self, other: &ProcessingFormat) -> bool {
        match (self.canonical(), other.canonical()) {
            (Some(a), Some(b)) => a.sample_rate == b.sample_rate && a.channels == b.channels,
            _ => false,
        }
    }
}

impl std::fmt::Display for ProcessingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {} {}",
            self.sample_rate,
            self.channels,
            self.encoding.label(),
            if self.interleaved { "interleaved" } else { "deinterleaved" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_normalizes_layout() {
        let cd = ProcessingFormat::new(44100, 2, SampleEncoding::Int16, true);
        let canonical = cd.canonical().unwrap();
        assert_eq!(canonical, ProcessingFormat::standard(44100, 2));
        assert!(canonical.is_standard());
        assert!(!cd.is_standard());
    }

    #[test]
    fn test_canonical_rejects_unrepresentable() {
        assert!(ProcessingFormat::new(2_822_400, 2, SampleEncoding::Dsd, false)
            .canonical()
            .is_none());
        assert!(ProcessingFormat::standard(44100, 0).canonical().is_none());
        assert!(ProcessingFormat::standard(0, 2).canonical().is_none());
        assert!(ProcessingFormat::standard(44100, MAX_CHANNELS + 1).canonical().is_none());
    }

    #[test]
    fn test_gapless_join_ignores_encoding() {
        let a = ProcessingFormat::new(48000, 2, SampleEncoding::Int24, true);
        let b = ProcessingFormat::standard(48000, 2);
        let c = ProcessingFormat::standard(44100, 2);
        let d = ProcessingFormat::standard(48000, 1);

        assert!(a.joins_gaplessly_with(&b));
        assert!(!b.joins_gaplessly_with(&c));
        assert!(!b.joins_gaplessly_with(&d));
    }

    #[test]
    fn test_display() {
        let f = ProcessingFormat::new(96000, 6, SampleEncoding::Int24, true);
        assert_eq!(f.to_string(), "96000 Hz, 6 ch, i24 interleaved");
        assert_eq!(f.encoding.bits_per_sample(), 24);
    }
}
