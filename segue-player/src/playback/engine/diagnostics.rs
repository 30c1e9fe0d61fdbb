//! Seeking, volume, output device and status pass-throughs

use super::core::{EngineShared, PlaybackEngine};
use crate::audio::OutputDevice;
use crate::error::{Error, Result};
use crate::playback::node::{NodePosition, NodeTime};
use segue_common::events::DecoderInfo;
use segue_common::time::seconds_to_frames;
use segue_common::PlaybackState;
use tracing::{debug, info};

/// Point-in-time view of the engine for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub now_playing: Option<DecoderInfo>,
    pub position: Option<NodePosition>,
    pub time: Option<NodeTime>,
    pub queue_is_empty: bool,
}

impl EngineShared {
    /// Seek the current decoder to `frame`, clamped to its length
    fn seek_clamped(&self, frame: u64) -> bool {
        let node = self.node.load();
        let Some(position) = node.playback_position() else {
            return false;
        };
        let frame = match position.frame_length {
            Some(length) if length > 0 => frame.min(length - 1),
            _ => frame,
        };
        let accepted = node.seek_to_frame(frame);
        debug!("Seek to frame {}: {}", frame, if accepted { "accepted" } else { "refused" });
        accepted
    }

    fn seek_relative(&self, seconds: f64) -> bool {
        let Some(position) = self.node.load().playback_position() else {
            return false;
        };
        let delta = seconds_to_frames(seconds.abs(), position.sample_rate);
        let target = if seconds >= 0.0 {
            position.frame.saturating_add(delta)
        } else {
            position.frame.saturating_sub(delta)
        };
        self.seek_clamped(target)
    }

    fn seek_to_time(&self, seconds: f64) -> bool {
        let Some(position) = self.node.load().playback_position() else {
            return false;
        };
        let frame = seconds_to_frames(seconds, position.sample_rate);
        self.seek_clamped(frame)
    }

    fn seek_to_position(&self, fraction: f64) -> bool {
        let Some(length) = self
            .node
            .load()
            .playback_position()
            .and_then(|position| position.frame_length)
        else {
            return false;
        };
        let frame = (fraction.clamp(0.0, 1.0) * length as f64) as u64;
        self.seek_clamped(frame)
    }
}

impl PlaybackEngine {
    /// Seek `seconds` ahead in the current decoder
    pub fn seek_forward(&self, seconds: f64) -> Result<bool> {
        self.shared.run_sync(move |shared| shared.seek_relative(seconds.abs()))
    }

    /// Seek `seconds` back in the current decoder
    pub fn seek_backward(&self, seconds: f64) -> Result<bool> {
        self.shared.run_sync(move |shared| shared.seek_relative(-seconds.abs()))
    }

    pub fn seek_to_time(&self, seconds: f64) -> Result<bool> {
        self.shared.run_sync(move |shared| shared.seek_to_time(seconds))
    }

    /// Seek to `fraction` (0.0 to 1.0) of the current decoder's length
    pub fn seek_to_position(&self, fraction: f64) -> Result<bool> {
        self.shared.run_sync(move |shared| shared.seek_to_position(fraction))
    }

    /// Seek to an absolute frame.
    ///
    /// Refused (`Ok(false)`) when the decoder cannot seek, the frame is past
    /// its end, or the next decoder has already started decoding.
    pub fn seek_to_frame(&self, frame: u64) -> Result<bool> {
        self.shared
            .run_sync(move |shared| shared.node.load().seek_to_frame(frame))
    }

    pub fn supports_seeking(&self) -> bool {
        self.shared.node.load().supports_seeking()
    }

    pub fn playback_position(&self) -> Option<NodePosition> {
        self.shared.node.load().playback_position()
    }

    pub fn playback_time(&self) -> Option<NodeTime> {
        self.shared.node.load().playback_time()
    }

    /// Output volume (0.0 to 1.0)
    pub fn volume(&self) -> f32 {
        self.shared.graph.output_volume()
    }

    /// Set the output volume, clamped to 0.0 to 1.0
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.shared
            .run_sync(move |shared| shared.graph.set_output_volume(volume))?
    }

    /// Identifier of the current output device
    pub fn output_device(&self) -> Option<String> {
        self.shared.graph.output_device()
    }

    /// Devices reported by the configured device service
    pub fn output_devices(&self) -> Result<Vec<OutputDevice>> {
        match &self.shared.devices {
            Some(devices) => devices.output_devices(),
            None => Ok(Vec::new()),
        }
    }

    /// Switch to the output device with `id`.
    ///
    /// The graph reports the switch as a configuration change, which rebuilds
    /// the graph; playback resumes with the next `play`.
    pub fn set_output_device(&self, id: &str) -> Result<()> {
        let devices = self
            .shared
            .devices
            .as_ref()
            .ok_or_else(|| Error::DeviceNotFound(format!("{} (no device service)", id)))?;
        let device = devices
            .find(id)?
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;

        info!("Switching output to '{}'", device.name);
        self.shared
            .run_sync(move |shared| shared.graph.set_output_device(&device))?
    }

    pub fn status(&self) -> PlayerStatus {
        let node = self.shared.node.load();
        PlayerStatus {
            state: self.shared.playback_state(),
            now_playing: self.now_playing().map(|d| d.info()),
            position: node.playback_position(),
            time: node.playback_time(),
            queue_is_empty: self.shared.queue_is_empty(),
        }
    }
}
