//! Configuration management for Genesis Link
//!
//! Handles loading, parsing, and hot-reloading of the YAML configuration.
//! Every field has a default, so a missing file or a partial file is valid.

pub mod watcher;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::serial::{DetectRules, LineSettings, BAUD_RATE, READ_POLL_INTERVAL};
use crate::session::SessionConfig;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub midi: MidiConfig,
}

/// Serial link to the synth board
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Port to open at startup; auto-detect is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_true")]
    pub auto_detect: bool,
    #[serde(default = "default_auto_detect_interval_ms")]
    pub auto_detect_interval_ms: u64,
    /// Boards recognized by auto-detect
    #[serde(default)]
    pub detect: DetectRules,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            auto_detect: true,
            auto_detect_interval_ms: default_auto_detect_interval_ms(),
            detect: DetectRules::default(),
        }
    }
}

/// MIDI input side
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Client name shown to other MIDI applications, also the default
    /// virtual port name
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Input to open at startup (exact name or case-insensitive substring)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    /// Publish a virtual input port at startup
    #[serde(default)]
    pub virtual_port: bool,
    /// Forward incoming MIDI to the synth
    #[serde(default = "default_true")]
    pub forward: bool,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            input_port: None,
            virtual_port: false,
            forward: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }

    /// Load the file, or the defaults when it does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults config
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            anyhow::bail!("serial.baud_rate must be positive");
        }
        if self.serial.auto_detect_interval_ms < 100 {
            anyhow::bail!(
                "serial.auto_detect_interval_ms must be at least 100 (got {})",
                self.serial.auto_detect_interval_ms
            );
        }
        if self.serial.port.as_deref().is_some_and(|p| p.trim().is_empty()) {
            anyhow::bail!("serial.port cannot be empty");
        }
        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("midi.client_name cannot be empty");
        }
        for rule in &self.serial.detect.keywords {
            if rule.keyword.trim().is_empty() {
                anyhow::bail!("serial.detect keywords cannot be empty");
            }
        }
        Ok(())
    }

    /// Parameters for the session actor
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            line: LineSettings {
                baud_rate: self.serial.baud_rate,
                read_timeout: READ_POLL_INTERVAL,
            },
            auto_detect_interval: Duration::from_millis(self.serial.auto_detect_interval_ms),
            detect_rules: self.serial.detect.clone(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_baud_rate() -> u32 {
    BAUD_RATE
}
fn default_auto_detect_interval_ms() -> u64 {
    2000
}
fn default_client_name() -> String {
    "GenesisEngineSynth".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::BoardType;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert!(config.serial.auto_detect);
        assert_eq!(config.serial.auto_detect_interval_ms, 2000);
        assert_eq!(config.midi.client_name, "GenesisEngineSynth");
        assert!(config.midi.forward);
        assert!(!config.midi.virtual_port);
        assert!(!config.serial.detect.usb_ids.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::parse(
            r#"
serial:
  port: "/dev/ttyACM0 - Teensyduino"
midi:
  forward: false
"#,
        )
        .unwrap();

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0 - Teensyduino"));
        assert_eq!(config.serial.baud_rate, 115_200);
        assert!(!config.midi.forward);
        assert_eq!(config.midi.client_name, "GenesisEngineSynth");
        assert_eq!(config.serial.detect, DetectRules::default());
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(AppConfig::parse("  \n").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_custom_detect_rules() {
        let config = AppConfig::parse(
            r#"
serial:
  detect:
    usb_ids:
      - { vid: 0x2E8A, pid: 0x000A, label: "RP2040", board: arduino }
    keywords:
      - keyword: genesis
        board: teensy
"#,
        )
        .unwrap();

        let rules = &config.serial.detect;
        assert_eq!(rules.usb_ids.len(), 1);
        assert_eq!(rules.usb_ids[0].board, BoardType::Arduino);
        assert_eq!(rules.keywords[0].keyword, "genesis");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AppConfig::parse("serial:\n  auto_detect_interval_ms: 5\n").is_err());
        assert!(AppConfig::parse("serial:\n  baud_rate: 0\n").is_err());
        assert!(AppConfig::parse("midi:\n  client_name: \"\"\n").is_err());
        assert!(AppConfig::parse("serial:\n  detect:\n    keywords:\n      - keyword: \" \"\n").is_err());
    }

    #[test]
    fn test_session_config() {
        let mut config = AppConfig::default();
        config.serial.auto_detect_interval_ms = 500;
        let session = config.session_config();
        assert_eq!(session.auto_detect_interval, Duration::from_millis(500));
        assert_eq!(session.line.baud_rate, 115_200);
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.yaml"))
            .await
            .unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.serial.port = Some("COM5".to_string());
        config.midi.input_port = Some("Keystation".to_string());
        config.save(&path).await.unwrap();

        assert_eq!(AppConfig::load(&path).await.unwrap(), config);
    }
}
