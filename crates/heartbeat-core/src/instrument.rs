//! Optional span bookkeeping shared by the traced components.

use heartbeat_span::{ExecutionSpan, SpanContext, Tracer};
use std::sync::Arc;

/// A span that exists only when a tracer is configured.
pub(crate) struct OptionalSpan<'a> {
    tracer: Option<&'a dyn Tracer>,
    span: Option<ExecutionSpan>,
}

impl<'a> OptionalSpan<'a> {
    pub(crate) fn start(
        tracer: Option<&'a Arc<dyn Tracer>>,
        name: &str,
        parent: Option<&SpanContext>,
    ) -> Self {
        let tracer = tracer.map(|t| t.as_ref());
        let span = tracer.map(|t| t.start_span(name, parent));
        Self { tracer, span }
    }

    pub(crate) fn tag(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        if let Some(span) = self.span.as_mut() {
            span.set_tag(key, value);
        }
    }

    /// Close the span as completed or failed, depending on `result`.
    pub(crate) fn finish<T, E: std::fmt::Display>(self, result: &Result<T, E>) {
        if let (Some(tracer), Some(mut span)) = (self.tracer, self.span) {
            match result {
                Ok(_) => span.complete(),
                Err(e) => span.fail(e.to_string()),
            }
            tracer.finish(span);
        }
    }
}
