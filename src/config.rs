//! Configuration management
//!
//! Loads the YAML configuration file. Every section is optional; a missing
//! file means "all defaults, ports chosen on the command line or prompted".

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::latch::{LatchOptions, DEFAULT_TOGGLE_PRESSES, MIN_TOGGLE_PRESSES};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub latch: LatchConfig,
}

/// MIDI port configuration
///
/// Ports are a numeric index or a case-insensitive name substring.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MidiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
}

/// Gesture detection settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LatchConfig {
    #[serde(default = "default_gesture_window_ms")]
    pub gesture_window_ms: u64,
    #[serde(default = "default_toggle_presses")]
    pub toggle_presses: u32,
    /// Pass non-CC messages (notes, clock, SysEx...) straight to the output
    #[serde(default = "default_true")]
    pub forward_other_messages: bool,
}

impl Default for LatchConfig {
    fn default() -> Self {
        Self {
            gesture_window_ms: default_gesture_window_ms(),
            toggle_presses: default_toggle_presses(),
            forward_other_messages: default_true(),
        }
    }
}

impl LatchConfig {
    pub fn options(&self) -> LatchOptions {
        LatchOptions {
            gesture_window: Duration::from_millis(self.gesture_window_ms),
            toggle_presses: self.toggle_presses,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Reject settings under which the latch can never toggle
    pub fn validate(&self) -> Result<()> {
        if self.latch.gesture_window_ms == 0 {
            bail!("latch.gesture_window_ms must be greater than 0");
        }
        if self.latch.toggle_presses < MIN_TOGGLE_PRESSES {
            bail!(
                "latch.toggle_presses must be at least {} (got {})",
                MIN_TOGGLE_PRESSES,
                self.latch.toggle_presses
            );
        }
        Ok(())
    }

    /// Command-line port patterns win over the file
    pub fn with_port_overrides(mut self, input: Option<String>, output: Option<String>) -> Self {
        if input.is_some() {
            self.midi.input_port = input;
        }
        if output.is_some() {
            self.midi.output_port = output;
        }
        self
    }
}

// Default value functions
fn default_gesture_window_ms() -> u64 { 250 }
fn default_toggle_presses() -> u32 { DEFAULT_TOGGLE_PRESSES }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_full_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("cc-latch.yaml");

        std::fs::write(
            &config_path,
            r#"
midi:
  input_port: "nanoKONTROL"
  output_port: "1"
latch:
  gesture_window_ms: 300
  toggle_presses: 4
  forward_other_messages: false
"#,
        )?;

        let config = AppConfig::load(&config_path).await?;
        assert_eq!(config.midi.input_port.as_deref(), Some("nanoKONTROL"));
        assert_eq!(config.midi.output_port.as_deref(), Some("1"));
        assert_eq!(config.latch.toggle_presses, 4);
        assert!(!config.latch.forward_other_messages);
        assert_eq!(
            config.latch.options().gesture_window,
            Duration::from_millis(300)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_partial_config_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("cc-latch.yaml");
        std::fs::write(&config_path, "midi:\n  input_port: \"loopMIDI\"\n")?;

        let config = AppConfig::load(&config_path).await?;
        assert_eq!(config.midi.output_port, None);
        assert_eq!(config.latch, LatchConfig::default());
        assert_eq!(config.latch.options(), LatchOptions::default());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = AppConfig::load_or_default(temp_dir.path().join("absent.yaml")).await?;
        assert_eq!(config, AppConfig::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("cc-latch.yaml");
        std::fs::write(&config_path, "latch:\n  toggle_presses: 1\n")?;

        let err = AppConfig::load(&config_path).await.unwrap_err();
        assert!(err.to_string().contains("toggle_presses"));

        std::fs::write(&config_path, "latch:\n  gesture_window_ms: 0\n")?;
        assert!(AppConfig::load(&config_path).await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_save_and_reload() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("cc-latch.yaml");

        let config = AppConfig::default()
            .with_port_overrides(Some("in".to_string()), Some("out".to_string()));
        config.save(&config_path).await?;

        assert_eq!(AppConfig::load(&config_path).await?, config);
        Ok(())
    }

    #[test]
    fn test_port_overrides_keep_file_values_when_absent() {
        let mut config = AppConfig::default();
        config.midi.input_port = Some("file-in".to_string());

        let config = config.with_port_overrides(None, Some("cli-out".to_string()));
        assert_eq!(config.midi.input_port.as_deref(), Some("file-in"));
        assert_eq!(config.midi.output_port.as_deref(), Some("cli-out"));
    }
}
