//! Heartbeat wire messages
//!
//! Outbound: `{ "id", "destination", "timestamp" }`.
//! Inbound: `{ "id", "name", "status": {"code"}, "sended", "received" }`.
//! Any shape mismatch on the inbound side is a `MalformedMessage`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{HealthError, Result};
use crate::model::{AttemptId, HeartbeatAttempt};

/// Heartbeat request published to a service endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub id: AttemptId,
    /// Topic the reply must be published to
    pub destination: String,
    pub timestamp: DateTime<Utc>,
}

impl HeartbeatRequest {
    pub fn for_attempt(attempt: &HeartbeatAttempt, reply_topic: &str) -> Self {
        Self {
            id: attempt.attempt_id.clone(),
            destination: reply_topic.to_string(),
            timestamp: attempt.sent_at,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(HealthError::from)
    }
}

/// Status block of a reply; `code == 0` is healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyStatus {
    pub code: i64,
}

/// Heartbeat reply received on the reply topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub id: AttemptId,
    pub name: String,
    pub status: ReplyStatus,
    #[serde(deserialize_with = "iso8601")]
    pub sended: DateTime<Utc>,
    #[serde(deserialize_with = "iso8601")]
    pub received: DateTime<Utc>,
}

impl HeartbeatReply {
    /// Parse and validate a raw payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let reply: Self = serde_json::from_slice(payload)?;
        if reply.id.as_str().is_empty() {
            return Err(HealthError::malformed("empty attempt id"));
        }
        if reply.name.is_empty() {
            return Err(HealthError::malformed("empty service name"));
        }
        Ok(reply)
    }

    pub fn is_healthy(&self) -> bool {
        self.status.code == 0
    }
}

/// Accept RFC 3339, or a naive ISO-8601 timestamp read as UTC.
fn iso8601<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("unparsable timestamp {:?}: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_shape() {
        let attempt = HeartbeatAttempt {
            attempt_id: AttemptId::from("abc"),
            service_name: "alpha".to_string(),
            sent_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        };
        let request = HeartbeatRequest::for_attempt(&attempt, "health/_callback");
        let json: serde_json::Value = serde_json::from_slice(&request.to_bytes().unwrap()).unwrap();

        assert_eq!(json["id"], "abc");
        assert_eq!(json["destination"], "health/_callback");
        assert_eq!(json["timestamp"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn test_parse_reply() {
        let payload = br#"{"id":"abc","name":"alpha","status":{"code":0},
            "sended":"2024-03-01T12:00:00Z","received":"2024-03-01T12:00:02.5+00:00"}"#;
        let reply = HeartbeatReply::parse(payload).unwrap();

        assert_eq!(reply.id.as_str(), "abc");
        assert!(reply.is_healthy());
        assert_eq!((reply.received - reply.sended).num_milliseconds(), 2500);
    }

    #[test]
    fn test_parse_naive_timestamps() {
        let payload = br#"{"id":"abc","name":"alpha","status":{"code":3},
            "sended":"2024-03-01T12:00:00.123456","received":"2024-03-01T12:00:01"}"#;
        let reply = HeartbeatReply::parse(payload).unwrap();

        assert!(!reply.is_healthy());
        assert_eq!(reply.sended.timestamp_subsec_micros(), 123456);
    }

    #[test]
    fn test_missing_id_is_malformed() {
        let payload = br#"{"name":"alpha","status":{"code":0},
            "sended":"2024-03-01T12:00:00Z","received":"2024-03-01T12:00:01Z"}"#;
        assert!(matches!(
            HeartbeatReply::parse(payload),
            Err(HealthError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let payload = br#"{"id":"abc","name":"alpha","status":{"code":0},
            "sended":"yesterday","received":"2024-03-01T12:00:01Z"}"#;
        assert!(matches!(
            HeartbeatReply::parse(payload),
            Err(HealthError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_non_json_is_malformed() {
        assert!(matches!(
            HeartbeatReply::parse(b"\xff\x00"),
            Err(HealthError::MalformedMessage(_))
        ));
    }
}
