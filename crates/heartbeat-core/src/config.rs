//! Monitored service definitions and monitor configuration
//!
//! Loaded once at startup, validated, then passed by reference into each
//! component. Nothing here is mutated at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{HealthError, Result};

/// Topic replies are subscribed on unless configured otherwise
pub const DEFAULT_REPLY_TOPIC: &str = "health/_callback";

/// Transport a service is reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Publish/subscribe message bus; the only probed transport
    #[serde(alias = "mqtt")]
    Bus,
    /// Anything else; listed but never probed
    #[serde(other)]
    Other,
}

/// Static description of one monitored service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Unique service name
    pub name: String,

    /// Transport the service is reached over
    #[serde(alias = "protocol")]
    pub transport: Transport,

    /// Topic heartbeat requests are published to
    #[serde(default)]
    pub endpoint: String,

    /// Seconds between two heartbeats; also the effective reply timeout
    #[serde(alias = "interval", default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_interval_seconds() -> u64 {
    60
}

impl ServiceDefinition {
    /// Bus-based service definition
    pub fn bus(name: impl Into<String>, endpoint: impl Into<String>, interval_seconds: u64) -> Self {
        Self {
            name: name.into(),
            transport: Transport::Bus,
            endpoint: endpoint.into(),
            interval_seconds,
        }
    }

    pub fn is_probed(&self) -> bool {
        self.transport == Transport::Bus
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Complete monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Topic replies arrive on; sent as `destination` in every request
    #[serde(default = "default_reply_topic")]
    pub reply_topic: String,

    /// Monitored services
    pub services: Vec<ServiceDefinition>,
}

fn default_reply_topic() -> String {
    DEFAULT_REPLY_TOPIC.to_string()
}

impl MonitorConfig {
    pub fn new(services: Vec<ServiceDefinition>) -> Self {
        Self {
            reply_topic: default_reply_topic(),
            services,
        }
    }

    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.reply_topic.trim().is_empty() {
            return Err(HealthError::invalid_config("reply_topic must not be empty"));
        }
        if self.services.is_empty() {
            return Err(HealthError::invalid_config("at least one service must be configured"));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(HealthError::invalid_config("service name must not be empty"));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(HealthError::invalid_config(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }
            if service.interval_seconds == 0 {
                return Err(HealthError::invalid_config(format!(
                    "service {}: interval_seconds must be positive",
                    service.name
                )));
            }
            if service.is_probed() && service.endpoint.trim().is_empty() {
                return Err(HealthError::invalid_config(format!(
                    "service {}: bus-based services need an endpoint",
                    service.name
                )));
            }
        }
        Ok(())
    }

    /// Services the pinger drives
    pub fn probed_services(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.iter().filter(|s| s.is_probed())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Deserialize `content` as YAML, TOML or JSON depending on the file extension.
/// Read a YAML, TOML or JSON file, picking the format by extension.
pub fn load_file<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        HealthError::invalid_config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_by_extension(path, &content)
}

fn parse_by_extension<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> Result<T> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(content)
            .map_err(|e| HealthError::invalid_config(format!("YAML error: {}", e))),
        Some("toml") => toml::from_str(content)
            .map_err(|e| HealthError::invalid_config(format!("TOML error: {}", e))),
        _ => serde_json::from_str(content)
            .map_err(|e| HealthError::invalid_config(format!("JSON error: {}", e))),
    }
}
