//! Configuration
//!
//! Component attributes arrive as JSON from the host; the driver binary reads
//! its own settings and component list from a TOML file.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{DEFAULT_DURATION_MS, DEFAULT_READING_INTERVAL_MS};
use crate::error::{Error, Result};
use crate::registry::Model;

/// Attributes of an audio-in component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioInConfig {
    /// Capture window in milliseconds; 0 selects the default
    pub duration: i64,
}

impl AudioInConfig {
    /// Parse component attributes; missing attributes mean all defaults
    pub fn from_attributes(attributes: &serde_json::Value) -> Result<Self> {
        if attributes.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(attributes.clone())?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration < 0 {
            return Err(Error::ConfigValidation(format!(
                "duration must not be negative, got {} ms",
                self.duration
            )));
        }
        Ok(())
    }

    /// Capture window to use by default
    pub fn resolved_duration(&self) -> Duration {
        if self.duration <= 0 {
            Duration::from_millis(DEFAULT_DURATION_MS)
        } else {
            Duration::from_millis(self.duration as u64)
        }
    }
}

/// A component as described by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    /// Model triplet, e.g. `viam:sensor:audio-in`
    pub model: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl ComponentConfig {
    pub fn new(name: impl Into<String>, model: &Model, attributes: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            model: model.to_string(),
            attributes,
        }
    }
}

/// Driver binary configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Use the simulated backend instead of audio hardware
    pub simulate: bool,
    /// cpal host name ("ALSA", "JACK", ...); the platform default when unset
    pub host: Option<String>,
    /// Time between readings
    pub interval_ms: u64,
    pub components: Vec<ComponentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            simulate: false,
            host: None,
            interval_ms: DEFAULT_READING_INTERVAL_MS,
            components: vec![ComponentConfig::new(
                "mic",
                &Model::audio_in(),
                serde_json::Value::Null,
            )],
        }
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::ConfigValidation(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load from `path`, else from the per-user config file if it exists,
    /// else fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/audioin/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "audioin").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duration_defaults() {
        assert_eq!(
            AudioInConfig::default().resolved_duration(),
            Duration::from_millis(2000)
        );
        assert_eq!(
            AudioInConfig { duration: 100 }.resolved_duration(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_from_attributes() {
        let config = AudioInConfig::from_attributes(&json!({ "duration": 500 })).unwrap();
        assert_eq!(config.duration, 500);

        let config = AudioInConfig::from_attributes(&json!({})).unwrap();
        assert_eq!(config.duration, 0);

        let config = AudioInConfig::from_attributes(&serde_json::Value::Null).unwrap();
        assert_eq!(config, AudioInConfig::default());

        assert!(matches!(
            AudioInConfig::from_attributes(&json!({ "duration": "long" })),
            Err(Error::Attributes(_))
        ));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let config = AudioInConfig { duration: -5 };
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
        assert!(AudioInConfig { duration: 0 }.validate().is_ok());
    }

    #[test]
    fn test_app_config_toml() {
        let config = AppConfig::from_toml(
            r#"
            log_level = "debug"
            simulate = true
            host = "jack"
            interval_ms = 250

            [[components]]
            name = "kitchen"
            model = "viam:sensor:audio-in"

            [components.attributes]
            duration = 750
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert!(config.simulate);
        assert_eq!(config.host.as_deref(), Some("jack"));
        assert_eq!(config.interval(), Duration::from_millis(250));
        assert_eq!(config.components.len(), 1);
        assert_eq!(config.components[0].attributes, json!({ "duration": 750 }));
    }

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.host.is_none());
        assert_eq!(config.components[0].model, "viam:sensor:audio-in");
    }
}
