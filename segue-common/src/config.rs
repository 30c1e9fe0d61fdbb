//! Configuration loading and config file resolution
//!
//! Configuration is a single TOML file with three sections:
//! - `[playback]`: render budgets, ring sizes and tick intervals
//! - `[output]`: format of the software output device
//! - `[logging]`: log level and optional log file
//!
//! Every key has a built-in default, so a missing file or a partial file is
//! never fatal.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SEGUE_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SegueConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Playback engine tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// Default maximum frames rendered per cycle.
    ///
    /// Scaled up when a node runs at a higher rate than its downstream mixer.
    #[serde(default = "default_frame_budget")]
    pub frame_budget: u32,

    /// Capacity of each node's PCM ring buffer, in frames
    #[serde(default = "default_ring_buffer_frames")]
    pub ring_buffer_frames: usize,

    /// Frames requested from a decoder per read
    #[serde(default = "default_decode_chunk_frames")]
    pub decode_chunk_frames: usize,

    /// Capacity of the render→notifier event ring
    #[serde(default = "default_event_ring_capacity")]
    pub event_ring_capacity: usize,

    /// Notifier poll interval in milliseconds
    #[serde(default = "default_notifier_tick_ms")]
    pub notifier_tick_ms: u64,

    /// Number of decoders a node tracks at once (decoding + rendering)
    #[serde(default = "default_active_decoder_slots")]
    pub active_decoder_slots: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_budget: default_frame_budget(),
            ring_buffer_frames: default_ring_buffer_frames(),
            decode_chunk_frames: default_decode_chunk_frames(),
            event_ring_capacity: default_event_ring_capacity(),
            notifier_tick_ms: default_notifier_tick_ms(),
            active_decoder_slots: default_active_decoder_slots(),
        }
    }
}

/// Software output device format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Frames pulled from the graph per render cycle
    #[serde(default = "default_period_frames")]
    pub period_frames: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            period_frames: default_period_frames(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_frame_budget() -> u32 {
    512
}

fn default_ring_buffer_frames() -> usize {
    16384
}

fn default_decode_chunk_frames() -> usize {
    2048
}

fn default_event_ring_capacity() -> usize {
    512
}

fn default_notifier_tick_ms() -> u64 {
    5
}

fn default_active_decoder_slots() -> usize {
    8
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_period_frames() -> u32 {
    512
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SegueConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SegueConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve and load configuration, falling back to defaults.
    ///
    /// A file named on the command line or via `SEGUE_CONFIG` must load;
    /// discovered platform files that fail to parse are reported and skipped.
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_arg {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        for candidate in platform_config_candidates() {
            if !candidate.exists() {
                continue;
            }
            match Self::load(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Ignoring config file {}: {}", candidate.display(), e),
            }
        }

        debug!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let p = &self.playback;
        if p.frame_budget == 0 {
            return Err(Error::Config("playback.frame_budget must be > 0".to_string()));
        }
        if p.ring_buffer_frames == 0 {
            return Err(Error::Config("playback.ring_buffer_frames must be > 0".to_string()));
        }
        if p.decode_chunk_frames == 0 || p.decode_chunk_frames > p.ring_buffer_frames {
            return Err(Error::Config(
                "playback.decode_chunk_frames must be > 0 and fit in the ring buffer".to_string(),
            ));
        }
        if p.event_ring_capacity == 0 {
            return Err(Error::Config("playback.event_ring_capacity must be > 0".to_string()));
        }
        if p.active_decoder_slots < 2 {
            return Err(Error::Config(
                "playback.active_decoder_slots must be at least 2 for gapless joins".to_string(),
            ));
        }

        let o = &self.output;
        if o.sample_rate == 0 || o.channels == 0 || o.period_frames == 0 {
            return Err(Error::Config(
                "output.sample_rate, output.channels and output.period_frames must be > 0"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Candidate config file locations, highest priority first
fn platform_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("segue").join("config.toml"));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/segue/config.toml"));
    }
    candidates
}
