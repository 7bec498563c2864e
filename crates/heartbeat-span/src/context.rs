//! Span context propagated between callers and instrumented components.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifiers linking a span to its trace and parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    /// Identifier shared by every span of one trace.
    pub trace_id: Uuid,
    /// Identifier of the span this context points at.
    pub span_id: Uuid,
}

impl SpanContext {
    /// Start a brand new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
        }
    }
}
