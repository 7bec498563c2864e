//! Error types for the heartbeat monitor

use thiserror::Error;

use crate::model::AttemptId;

/// Main error type for heartbeat operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthError {
    /// Operation on a service absent from configuration
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// A new attempt was started while the previous one is unresolved
    #[error("Service {service} already has outstanding attempt {attempt_id}")]
    AlreadyOutstanding {
        service: String,
        attempt_id: AttemptId,
    },

    /// Reply whose attempt is no longer the outstanding one
    #[error("Stale reply {attempt_id} for service {service}")]
    StaleReply {
        service: String,
        attempt_id: AttemptId,
    },

    /// Inbound payload that does not match the reply schema
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Rejected read request
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Status store or time-series sink failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Heartbeat request could not be published
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    /// Reply topic could not be subscribed
    #[error("Subscribe to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },

    /// Startup configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HealthError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        HealthError::InvalidParameter(msg.into())
    }

    /// Create a malformed message error
    pub fn malformed(msg: impl Into<String>) -> Self {
        HealthError::MalformedMessage(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        HealthError::InvalidConfig(msg.into())
    }

    /// Check if this error is the caller's fault (vs internal)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HealthError::InvalidParameter(_) | HealthError::UnknownService(_)
        )
    }
}

impl From<serde_json::Error> for HealthError {
    fn from(err: serde_json::Error) -> Self {
        HealthError::MalformedMessage(err.to_string())
    }
}

/// Result type alias for heartbeat operations
pub type Result<T> = std::result::Result<T, HealthError>;
