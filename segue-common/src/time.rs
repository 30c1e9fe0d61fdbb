//! Frame and time conversions

use std::time::Duration;

/// Seconds represented by `frames` at `sample_rate`
pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Duration represented by `frames` at `sample_rate`
pub fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(frames_to_seconds(frames, sample_rate))
}

/// Frame index nearest to `seconds` at `sample_rate` (negative input clamps to 0)
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}
