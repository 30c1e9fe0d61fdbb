//! Synthetic decoders
//!
//! `ToneDecoder` produces a sine tone (or silence) of a fixed length in any
//! format. Used by the demo binary and the tests; it behaves like a real
//! decoder (open step, seeking, end of stream).

use super::decoder::Decoder;
use super::format::ProcessingFormat;
use crate::error::{Error, Result};
use std::f32::consts::TAU;

/// Sine/silence generator implementing `Decoder`
#[derive(Debug, Clone)]
pub struct ToneDecoder {
    name: String,
    format: ProcessingFormat,
    frequency: Option<f32>,
    amplitude: f32,
    total_frames: u64,
    position: u64,
    open: bool,
    open_failure: Option<String>,
    seekable: bool,
}

impl ToneDecoder {
    /// A sine tone at `frequency` Hz lasting `total_frames` frames
    pub fn sine(frequency: f32, format: ProcessingFormat, total_frames: u64) -> Self {
        Self {
            name: format!("tone:{}Hz@{}", frequency, format.sample_rate),
            format,
            frequency: Some(frequency),
            amplitude: 0.25,
            total_frames,
            position: 0,
            open: false,
            open_failure: None,
            seekable: true,
        }
    }

    /// Digital silence lasting `total_frames` frames
    pub fn silence(format: ProcessingFormat, total_frames: u64) -> Self {
        Self {
            name: format!("silence@{}", format.sample_rate),
            frequency: None,
            ..Self::sine(0.0, format, total_frames)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make `open` fail with the given diagnostic
    pub fn failing_open(mut self, diagnostic: impl Into<String>) -> Self {
        self.open_failure = Some(diagnostic.into());
        self
    }

    pub fn non_seekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    fn sample_at(&self, frame: u64) -> f32 {
        match self.frequency {
            Some(freq) => {
                let t = frame as f32 / self.format.sample_rate as f32;
                self.amplitude * (TAU * freq * t).sin()
            }
            None => 0.0,
        }
    }
}

impl Decoder for ToneDecoder {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    fn open(&mut self) -> Result<()> {
        if let Some(diagnostic) = &self.open_failure {
            return Err(Error::Open(format!("{}: {}", self.name, diagnostic)));
        }
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn processing_format(&self) -> ProcessingFormat {
        self.format
    }

    fn frame_length(&self) -> Option<u64> {
        Some(self.total_frames)
    }

    fn frame_position(&self) -> u64 {
        self.position
    }

    fn read_frames(&mut self, buffer: &mut [f32], frames: usize) -> Result<usize> {
        if !self.open {
            return Err(Error::Decode(format!("{} is not open", self.name)));
        }

        let channels = self.format.channels as usize;
        let remaining = self.total_frames.saturating_sub(self.position) as usize;
        let count = frames.min(remaining).min(buffer.len() / channels.max(1));

        for i in 0..count {
            let sample = self.sample_at(self.position + i as u64);
            buffer[i * channels..(i + 1) * channels].fill(sample);
        }

        self.position += count as u64;
        Ok(count)
    }

    fn supports_seeking(&self) -> bool {
        self.seekable
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<()> {
        if !self.seekable {
            return Err(Error::Decode(format!("{} does not support seeking", self.name)));
        }
        if frame > self.total_frames {
            return Err(Error::Decode(format!(
                "seek to frame {} beyond length {}",
                frame, self.total_frames
            )));
        }
        self.position = frame;
        Ok(())
    }
}
