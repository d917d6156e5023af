//! Player configuration.
//!
//! Loaded from a TOML file; every section and key is optional and falls back
//! to the defaults below. Command-line flags override file values.
//!
//! ```toml
//! [queues]
//! packet_capacity = 256
//! frame_capacity = 8
//!
//! [audio]
//! sample_rate = 44100
//! channels = 2
//! ring_buffer_bytes = 882000   # 5 s of stereo s16 at 44.1 kHz
//! chunk_bytes = 2048
//! block_on_full = true
//!
//! [clock]
//! tick_ms = 10
//! rate = 1.0
//!
//! [output]
//! video = "null"               # or "raw"
//! raw_path = "frames.rgba"
//! audio = "null"               # or "cpal"
//!
//! [logging]
//! filter = "avpipe=info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::format::{AudioFormat, SampleFormat};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub queues: QueueConfig,
    pub audio: AudioConfig,
    pub clock: ClockConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum coded packets buffered per stream
    pub packet_capacity: usize,
    /// Maximum decoded video frames buffered
    pub frame_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            packet_capacity: 256,
            frame_capacity: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub ring_buffer_bytes: usize,
    /// Bytes taken from the ring per sink write
    pub chunk_bytes: usize,
    /// Hold the audio decoder while the ring is full instead of truncating
    pub block_on_full: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let format = AudioFormat::STEREO_S16_44K;
        Self {
            sample_rate: format.sample_rate,
            channels: format.channels,
            ring_buffer_bytes: format.bytes_for(5.0),
            chunk_bytes: 2048,
            block_on_full: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub tick_ms: u64,
    /// Initial time speed
    pub rate: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VideoOutput {
    /// Validate and discard frames
    #[default]
    Null,
    /// Append raw RGBA frames to a file
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioOutput {
    /// Discard audio at real-time pace
    #[default]
    Null,
    /// Default output device (requires the `cpal` feature)
    Cpal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub video: VideoOutput,
    pub raw_path: PathBuf,
    pub audio: AudioOutput,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            video: VideoOutput::Null,
            raw_path: PathBuf::from("frames.rgba"),
            audio: AudioOutput::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "avpipe=info".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queues.packet_capacity == 0 || self.queues.frame_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be at least 1".into()));
        }
        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return Err(ConfigError::Invalid(
                "audio sample_rate and channels must be non-zero".into(),
            ));
        }
        let frame_bytes = self.audio_format().frame_bytes();
        if self.audio.chunk_bytes < frame_bytes {
            return Err(ConfigError::Invalid(format!(
                "audio chunk_bytes must hold at least one frame ({} bytes)",
                frame_bytes
            )));
        }
        if self.audio.ring_buffer_bytes < self.audio.chunk_bytes {
            return Err(ConfigError::Invalid(
                "audio ring_buffer_bytes must be at least chunk_bytes".into(),
            ));
        }
        if self.clock.tick_ms == 0 {
            return Err(ConfigError::Invalid("clock tick_ms must be at least 1".into()));
        }
        if !(self.clock.rate.is_finite() && self.clock.rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "clock rate {} must be finite and greater than zero",
                self.clock.rate
            )));
        }
        Ok(())
    }

    /// PCM layout decoders convert to (always signed 16-bit).
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::new(self.audio.sample_rate, self.audio.channels, SampleFormat::I16)
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock.tick_ms)
    }
}
