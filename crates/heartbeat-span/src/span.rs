//! Span type recorded by tracers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::context::SpanContext;

/// Status of an execution span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Completed,
    Failed,
}

/// A single timed operation.
///
/// Spans are JSON-serializable without loss and never mutated once finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSpan {
    pub span_id: Uuid,
    pub trace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
    pub name: String,
    pub status: SpanStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub tags: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionSpan {
    /// Create a running span, as a child of `parent` when given, else as a new trace root.
    pub fn new(name: &str, parent: Option<&SpanContext>) -> Self {
        let (trace_id, parent_span_id) = match parent {
            Some(ctx) => (ctx.trace_id, Some(ctx.span_id)),
            None => (Uuid::new_v4(), None),
        };

        Self {
            span_id: Uuid::new_v4(),
            trace_id,
            parent_span_id,
            name: name.to_string(),
            status: SpanStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            tags: HashMap::new(),
            error: None,
        }
    }

    /// Context pointing at this span, for starting children.
    pub fn context(&self) -> SpanContext {
        SpanContext {
            trace_id: self.trace_id,
            span_id: self.span_id,
        }
    }

    /// Attach a tag.
    pub fn set_tag(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.tags.insert(key.to_string(), value.into());
    }

    /// Mark the span as completed.
    pub fn complete(&mut self) {
        self.status = SpanStatus::Completed;
        self.close();
    }

    /// Mark the span as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = SpanStatus::Failed;
        self.error = Some(error.into());
        self.close();
    }

    fn close(&mut self) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_span_starts_new_trace() {
        let span = ExecutionSpan::new("get_logs", None);

        assert_eq!(span.status, SpanStatus::Running);
        assert_eq!(span.name, "get_logs");
        assert!(span.parent_span_id.is_none());
    }

    #[test]
    fn test_child_span_inherits_trace() {
        let parent = SpanContext::new_root();
        let span = ExecutionSpan::new("ping", Some(&parent));

        assert_eq!(span.trace_id, parent.trace_id);
        assert_eq!(span.parent_span_id, Some(parent.span_id));
        assert_ne!(span.span_id, parent.span_id);
    }

    #[test]
    fn test_complete_span() {
        let mut span = ExecutionSpan::new("ping", None);
        span.complete();

        assert_eq!(span.status, SpanStatus::Completed);
        assert!(span.ended_at.is_some());
        assert!(span.duration_ms.is_some());
        assert!(span.error.is_none());
    }

    #[test]
    fn test_fail_span() {
        let mut span = ExecutionSpan::new("ping", None);
        span.fail("publish failed");

        assert_eq!(span.status, SpanStatus::Failed);
        assert_eq!(span.error, Some("publish failed".to_string()));
    }

    #[test]
    fn test_tags_serialize() {
        let mut span = ExecutionSpan::new("get_logs", None);
        span.set_tag("page", 2);
        span.set_tag("q", "SELECT * FROM \"health_check\"");
        span.complete();

        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["tags"]["page"], 2);
        assert_eq!(json["status"], "completed");
        assert!(json.get("parent_span_id").is_none());
    }
}
