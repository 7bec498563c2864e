//! Tracer capability and its two stock implementations.

use std::fmt;
use std::sync::Mutex;

use crate::context::SpanContext;
use crate::span::{ExecutionSpan, SpanStatus};

/// Capability accepted by components that support tracing.
pub trait Tracer: Send + Sync + fmt::Debug {
    /// Start a span. The default creates a running [`ExecutionSpan`].
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> ExecutionSpan {
        ExecutionSpan::new(name, parent)
    }

    /// Hand a finished span to the tracer.
    fn finish(&self, span: ExecutionSpan);
}

/// Emits finished spans as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn finish(&self, span: ExecutionSpan) {
        let tags = serde_json::to_string(&span.tags).unwrap_or_default();
        match span.status {
            SpanStatus::Failed => tracing::warn!(
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                span = %span.name,
                duration_ms = span.duration_ms.unwrap_or(0),
                error = span.error.as_deref().unwrap_or(""),
                tags = %tags,
                "span failed"
            ),
            _ => tracing::debug!(
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                span = %span.name,
                duration_ms = span.duration_ms.unwrap_or(0),
                tags = %tags,
                "span finished"
            ),
        }
    }
}

/// Keeps every finished span in memory.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    spans: Mutex<Vec<ExecutionSpan>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the finished spans, in finish order.
    pub fn spans(&self) -> Vec<ExecutionSpan> {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Finished spans with the given name.
    pub fn spans_named(&self, name: &str) -> Vec<ExecutionSpan> {
        self.spans()
            .into_iter()
            .filter(|s| s.name == name)
            .collect()
    }
}

impl Tracer for RecordingTracer {
    fn finish(&self, mut span: ExecutionSpan) {
        if span.status == SpanStatus::Running {
            span.complete();
        }
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(span);
    }
}
