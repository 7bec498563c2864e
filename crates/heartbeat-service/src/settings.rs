//! Process settings
//!
//! One file holds the monitor configuration plus the API and logging sections.
//! YAML, TOML and JSON are accepted, chosen by extension.

use heartbeat_core::config::load_file;
use heartbeat_core::{HealthError, MonitorConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Read API listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info` or `heartbeat_core=debug`
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub log: LogSettings,

    /// Answer every heartbeat in-process; local runs only
    #[serde(default)]
    pub loopback: bool,
}

impl Settings {
    /// Load and validate a settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HealthError> {
        let settings: Self = load_file(path)?;
        settings.monitor.validate()?;
        Ok(settings)
    }

    /// Apply command-line / environment overrides.
    pub fn with_overrides(mut self, port: Option<u16>, log_level: Option<String>) -> Self {
        if let Some(port) = port {
            self.api.port = port;
        }
        if let Some(level) = log_level {
            self.log.level = level;
        }
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_settings_with_defaults() {
        let file = write_file(
            ".yaml",
            r#"
monitor:
  services:
    - name: billing
      protocol: mqtt
      endpoint: billing/health
      interval: 10
"#,
        );
        let settings = Settings::from_file(file.path()).unwrap();

        assert_eq!(settings.api, ApiSettings::default());
        assert_eq!(settings.log.level, "info");
        assert!(!settings.loopback);
        assert_eq!(settings.monitor.services[0].interval_seconds, 10);
        assert_eq!(settings.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_toml_settings() {
        let file = write_file(
            ".toml",
            r#"
loopback = true

[api]
host = "127.0.0.1"
port = 9000

[log]
level = "debug"
json = true

[monitor]
reply_topic = "replies"

[[monitor.services]]
name = "billing"
transport = "bus"
endpoint = "billing/health"
interval_seconds = 5
"#,
        );
        let settings = Settings::from_file(file.path()).unwrap();

        assert!(settings.loopback);
        assert!(settings.log.json);
        assert_eq!(settings.monitor.reply_topic, "replies");
        assert_eq!(settings.bind_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_monitor_section_is_rejected() {
        let file = write_file(".json", r#"{"monitor": {"services": []}}"#);
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(HealthError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let file = write_file(
            ".json",
            r#"{"monitor": {"services": [{"name": "a", "transport": "bus", "endpoint": "a/ping"}]}}"#,
        );
        let settings = Settings::from_file(file.path())
            .unwrap()
            .with_overrides(Some(3000), Some("warn".to_string()));

        assert_eq!(settings.api.port, 3000);
        assert_eq!(settings.log.level, "warn");
    }
}
