//! Liveness data model
//!
//! `ServiceStatus` is owned by the status tracker and mirrored into the status
//! store. `HealthCheckRecord` and `SendCheckRecord` are append-only time-series
//! points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Measurement holding one record per resolved attempt
pub const HEALTH_CHECK_MEASUREMENT: &str = "health_check";

/// Measurement holding one record per published heartbeat
pub const SEND_CHECK_MEASUREMENT: &str = "send_check";

/// Tag every time-series point is keyed by
pub const SERVICE_NAME_TAG: &str = "service_name";

/// Opaque attempt identifier, one per send
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AttemptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for AttemptId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One outbound probe awaiting resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatAttempt {
    pub attempt_id: AttemptId,
    pub service_name: String,
    pub sent_at: DateTime<Utc>,
}

/// Liveness state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LivenessState {
    Idle,
    AwaitingResponse,
}

/// Current heartbeat state of one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service_name: String,

    /// Present while `AWAITING_RESPONSE`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outstanding_attempt: Option<HeartbeatAttempt>,

    /// Status code of the last reply; cleared by a timeout
    pub last_result_code: Option<i64>,

    pub last_sent_at: Option<DateTime<Utc>>,

    pub last_received_at: Option<DateTime<Utc>>,

    pub success_count: u64,

    pub total_count: u64,

    /// Bumped on every transition; the status store ignores non-newer revisions
    pub revision: u64,
}

impl ServiceStatus {
    /// Fresh `IDLE` status with zeroed counters
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            outstanding_attempt: None,
            last_result_code: None,
            last_sent_at: None,
            last_received_at: None,
            success_count: 0,
            total_count: 0,
            revision: 0,
        }
    }

    pub fn state(&self) -> LivenessState {
        if self.outstanding_attempt.is_some() {
            LivenessState::AwaitingResponse
        } else {
            LivenessState::Idle
        }
    }
}

/// Outcome of one resolved attempt (measurement `health_check`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    pub attempt_id: AttemptId,
    pub service_name: String,
    pub sent_at: DateTime<Utc>,

    /// Absent if timed out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,

    /// Absent if timed out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_seconds: Option<f64>,

    pub running: bool,
}

impl HealthCheckRecord {
    /// Record for an attempt answered by a reply
    pub fn replied(attempt: &HeartbeatAttempt, received_at: DateTime<Utc>, running: bool) -> Self {
        let latency = (received_at - attempt.sent_at)
            .num_microseconds()
            .map(|us| us as f64 / 1_000_000.0);

        Self {
            attempt_id: attempt.attempt_id.clone(),
            service_name: attempt.service_name.clone(),
            sent_at: attempt.sent_at,
            received_at: Some(received_at),
            latency_seconds: latency,
            running,
        }
    }

    /// Record for an attempt still outstanding at the next tick
    pub fn timed_out(attempt: &HeartbeatAttempt) -> Self {
        Self {
            attempt_id: attempt.attempt_id.clone(),
            service_name: attempt.service_name.clone(),
            sent_at: attempt.sent_at,
            received_at: None,
            latency_seconds: None,
            running: false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.received_at.is_none()
    }
}

/// Audit record of one published heartbeat (measurement `send_check`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendCheckRecord {
    pub attempt_id: AttemptId,
    pub service_name: String,
    pub destination: String,
    pub sent_at: DateTime<Utc>,
}

/// One point of the availability series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityBucket {
    pub bucket_start: DateTime<Utc>,
    pub mean_running: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn attempt() -> HeartbeatAttempt {
        HeartbeatAttempt {
            attempt_id: AttemptId::generate(),
            service_name: "alpha".to_string(),
            sent_at: Utc::now(),
        }
    }

    #[test]
    fn test_replied_record_latency() {
        let attempt = attempt();
        let record =
            HealthCheckRecord::replied(&attempt, attempt.sent_at + Duration::milliseconds(2500), true);

        assert_eq!(record.latency_seconds, Some(2.5));
        assert!(record.running);
        assert!(!record.is_timeout());
    }

    #[test]
    fn test_timed_out_record() {
        let record = HealthCheckRecord::timed_out(&attempt());

        assert!(record.is_timeout());
        assert!(!record.running);
        assert!(record.latency_seconds.is_none());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("received_at").is_none());
    }

    #[test]
    fn test_status_state() {
        let mut status = ServiceStatus::new("alpha");
        assert_eq!(status.state(), LivenessState::Idle);

        status.outstanding_attempt = Some(attempt());
        assert_eq!(status.state(), LivenessState::AwaitingResponse);
    }

    #[test]
    fn test_attempt_ids_are_unique() {
        assert_ne!(AttemptId::generate(), AttemptId::generate());
    }
}
