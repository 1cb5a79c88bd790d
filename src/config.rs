//! Configuration management for the MJPEG HTTP streamer

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::frame::{PixelFormat, RowAddressing};
use crate::streamer::{StreamConfig, StreamMode, DEFAULT_BOUNDARY};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete streamer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub source: SourceConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the MJPEG endpoint
    #[serde(default = "default_stream_uri")]
    pub stream_uri: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            stream_uri: default_stream_uri(),
        }
    }
}

/// Multipart stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSection {
    /// Framing of re-encoded frames
    #[serde(default)]
    pub mode: StreamMode,

    /// JPEG quality (1-100) for re-encoded frames
    #[serde(default = "default_quality")]
    pub quality: u32,

    /// Output buffer size for length-delimited mode (bytes)
    #[serde(default = "default_jpeg_buffer_size")]
    pub jpeg_buffer_size: usize,

    /// Multipart boundary token
    #[serde(default = "default_boundary")]
    pub boundary: String,

    /// Chunks buffered per connection before the encoder blocks
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            mode: StreamMode::default(),
            quality: default_quality(),
            jpeg_buffer_size: default_jpeg_buffer_size(),
            boundary: default_boundary(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl StreamSection {
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig {
            mode: self.mode,
            quality: self.quality,
            jpeg_buffer_size: self.jpeg_buffer_size,
            boundary: self.boundary.clone(),
        }
    }
}

/// Test-pattern frame source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pixel format of published frames
    #[serde(default = "default_format")]
    pub format: PixelFormat,

    /// Row buffers or one packed buffer
    #[serde(default = "default_addressing")]
    pub addressing: RowAddressing,

    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: usize,

    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: usize,

    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Quality of frames published as JPEG
    #[serde(default = "default_quality")]
    pub quality: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: default_format(),
            addressing: default_addressing(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            quality: default_quality(),
        }
    }
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_stream_uri() -> String {
    "/mjpeg/1".to_string()
}
fn default_quality() -> u32 {
    80
}
fn default_jpeg_buffer_size() -> usize {
    64 * 1024
}
fn default_boundary() -> String {
    DEFAULT_BOUNDARY.to_string()
}
fn default_channel_capacity() -> usize {
    8
}
fn default_true() -> bool {
    true
}
fn default_format() -> PixelFormat {
    PixelFormat::Rgb565
}
fn default_addressing() -> RowAddressing {
    RowAddressing::Rows
}
fn default_width() -> usize {
    320
}
fn default_height() -> usize {
    240
}
fn default_fps() -> u32 {
    10
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be > 0".to_string()));
        }
        if !server.stream_uri.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.stream_uri must start with '/', got {:?}",
                server.stream_uri
            )));
        }

        let stream = &self.stream;
        if stream.quality == 0 || stream.quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "stream.quality must be between 1 and 100, got {}",
                stream.quality
            )));
        }
        if stream.jpeg_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "stream.jpeg_buffer_size must be > 0".to_string(),
            ));
        }
        if stream.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stream.channel_capacity must be > 0".to_string(),
            ));
        }
        validate_boundary(&stream.boundary)?;

        if self.source.enabled {
            self.validate_source(&self.source)?;
        }

        Ok(())
    }

    fn validate_source(&self, source: &SourceConfig) -> Result<(), ConfigError> {
        // Validate dimensions
        if source.width == 0 || source.height == 0 {
            return Err(ConfigError::Invalid(
                "source: width and height must be > 0".to_string(),
            ));
        }
        if source.format == PixelFormat::Yuv422 && source.width % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "source: yuv422 width must be even, got {}",
                source.width
            )));
        }
        if source.format == PixelFormat::Jpeg && source.addressing == RowAddressing::Rows {
            return Err(ConfigError::Invalid(
                "source: jpeg frames must use flat addressing".to_string(),
            ));
        }

        // Validate FPS
        if source.fps == 0 || source.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "source: FPS must be between 1 and 120, got {}",
                source.fps
            )));
        }

        // Validate quality
        if source.quality == 0 || source.quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "source: quality must be between 1 and 100, got {}",
                source.quality
            )));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// RFC 2046 limits boundaries to 70 characters; ours also stay header-safe.
fn validate_boundary(boundary: &str) -> Result<(), ConfigError> {
    if boundary.is_empty() || boundary.len() > 70 {
        return Err(ConfigError::Invalid(format!(
            "stream.boundary must be 1 to 70 characters, got {}",
            boundary.len()
        )));
    }
    if boundary
        .chars()
        .any(|c| !c.is_ascii() || c.is_ascii_control() || c == ' ')
    {
        return Err(ConfigError::Invalid(format!(
            "stream.boundary contains invalid characters: {:?}",
            boundary
        )));
    }
    Ok(())
}
