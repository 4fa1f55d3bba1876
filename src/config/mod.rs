//! Configuration for the MIDI pedal
//!
//! Loaded from YAML. Every section has defaults, so an empty file (or no file
//! at all) gives a working pedal with no MIDI output.

use crate::button::BUTTON_COUNT;
use crate::midi::input::{default_bindings, InputBinding};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub midi: MidiConfig,
    /// Input bindings; entry `i` drives button `i + 1`
    pub buttons: Vec<InputBinding>,
    pub storage: StorageConfig,
    pub web: WebConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            midi: MidiConfig::default(),
            buttons: default_bindings(),
            storage: StorageConfig::default(),
            web: WebConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// MIDI port configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Output port name (case-insensitive substring)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// Raw device node instead of a port, e.g. `/dev/ttyAMA0`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<PathBuf>,
    /// Input port carrying the foot switches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    /// Send Program Change / Channel Pressure as two bytes
    pub compact_two_byte_messages: bool,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per entry under a directory
    #[default]
    Files,
    /// Embedded sled database
    Sled,
    /// Nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory (files) or database path (sled); app data dir when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Write coalescing window, 0 writes through
    pub debounce_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Files,
            path: None,
            debounce_ms: 0,
        }
    }
}

/// Configuration page server
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
    /// HTML template replacing the built-in page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    /// Files served for paths no route handles (CSS, JS, images used by the
    /// page); `www` in the data directory when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_string(),
            port: 80,
            template: None,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also write a daily log file into the logs directory
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty map
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.output_port.is_some() && self.midi.output_device.is_some() {
            anyhow::bail!("midi.output_port and midi.output_device are mutually exclusive");
        }
        if let Some(port) = &self.midi.output_port {
            if port.is_empty() {
                anyhow::bail!("midi.output_port cannot be empty");
            }
        }
        if let Some(port) = &self.midi.input_port {
            if port.is_empty() {
                anyhow::bail!("midi.input_port cannot be empty");
            }
        }

        if self.buttons.len() > BUTTON_COUNT {
            anyhow::bail!(
                "{} button bindings given, the pedal has {}",
                self.buttons.len(),
                BUTTON_COUNT
            );
        }
        for (idx, binding) in self.buttons.iter().enumerate() {
            validate_binding(binding).with_context(|| format!("Invalid binding for button {}", idx + 1))?;
        }

        if self.web.enabled && self.web.bind.is_empty() {
            anyhow::bail!("web.bind cannot be empty");
        }

        Ok(())
    }

    /// Coalescing window to use for storage writes
    pub fn storage_debounce_ms(&self) -> u64 {
        match self.storage.backend {
            StorageBackend::Memory => 0,
            _ => self.storage.debounce_ms,
        }
    }
}

fn validate_binding(binding: &InputBinding) -> Result<()> {
    match (binding.note, binding.cc) {
        (Some(_), Some(_)) => anyhow::bail!("'note' and 'cc' are mutually exclusive"),
        (None, None) => anyhow::bail!("one of 'note' or 'cc' is required"),
        (Some(n), None) | (None, Some(n)) if n > 127 => {
            anyhow::bail!("number {} out of range (must be 0-127)", n)
        }
        _ => {}
    }
    if let Some(channel) = binding.channel {
        if channel == 0 || channel > 16 {
            anyhow::bail!("invalid MIDI channel {} (must be 1-16)", channel);
        }
    }
    Ok(())
}
