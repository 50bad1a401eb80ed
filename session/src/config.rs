//! Session configuration.

use std::path::Path;
use std::time::Duration;

use concierge_audio::capture::{DEFAULT_BLOCK_SIZE, DEFAULT_QUEUE_CAPACITY};
use concierge_audio::{CaptureConfig, Format};
use concierge_live::{MODEL_GEMINI_FLASH_NATIVE_AUDIO, SetupConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest accepted capture queue capacity, in frames.
pub const MIN_QUEUE_CAPACITY: usize = 2;

/// Largest accepted capture queue capacity, in frames.
pub const MAX_QUEUE_CAPACITY: usize = 64;

/// Default wait for the endpoint to acknowledge a close.
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 2000;

/// Configuration for a voice session.
///
/// Fixed once the session is constructed.
///
/// ```yaml
/// model: gemini-2.5-flash-native-audio-preview-12-2025
/// system_instruction: |
///   You are the concierge for a home cleaning service.
/// block_size: 4096
/// queue_capacity: 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Model ID.
    pub model: String,

    /// Domain knowledge the assistant speaks to.
    pub system_instruction: String,

    /// Samples per captured block.
    pub block_size: usize,

    /// Captured blocks buffered ahead of the encoder.
    pub queue_capacity: usize,

    /// Milliseconds to wait for a close acknowledgment before giving up.
    pub close_grace_ms: u64,

    /// Microphone sample rate sent to the endpoint.
    pub input_sample_rate: u32,

    /// Sample rate of synthesized speech.
    pub output_sample_rate: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: MODEL_GEMINI_FLASH_NATIVE_AUDIO.to_string(),
            system_instruction: String::new(),
            block_size: DEFAULT_BLOCK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
            input_sample_rate: Format::MONO_16K.sample_rate(),
            output_sample_rate: Format::MONO_24K.sample_rate(),
        }
    }
}

impl SessionConfig {
    /// Creates the default configuration with a system instruction.
    pub fn with_instruction(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            ..Default::default()
        }
    }

    /// Parses a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&data)
    }

    /// Checks that every field is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model is required".to_string()));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".to_string()));
        }
        if !(MIN_QUEUE_CAPACITY..=MAX_QUEUE_CAPACITY).contains(&self.queue_capacity) {
            return Err(ConfigError::Invalid(format!(
                "queue_capacity must be in {}..={}, got {}",
                MIN_QUEUE_CAPACITY, MAX_QUEUE_CAPACITY, self.queue_capacity
            )));
        }
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(ConfigError::Invalid("sample rates must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the capture pipeline configuration.
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            format: self.input_format(),
            block_size: self.block_size,
            queue_capacity: self.queue_capacity,
        }
    }

    /// Returns the format captured and sent to the endpoint.
    pub fn input_format(&self) -> Format {
        Format::mono(self.input_sample_rate)
    }

    /// Returns the format synthesized speech is played in.
    pub fn output_format(&self) -> Format {
        Format::mono(self.output_sample_rate)
    }

    /// Returns the setup sent when the session opens.
    pub fn setup(&self) -> SetupConfig {
        SetupConfig::audio(self.model.clone(), self.system_instruction.clone())
    }

    /// Returns the close grace period.
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}
