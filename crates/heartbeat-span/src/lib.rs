//! Span instrumentation for the heartbeat monitor.
//!
//! Components that support tracing (the pinger, the response listener and the
//! query engine) accept an optional [`Tracer`] collaborator. When none is
//! configured they do no span work at all.
//!
//! # Span Hierarchy
//!
//! ```text
//! caller (HTTP request, scheduler tick, bus delivery)
//!   └─ operation span (ping, handle_reply, get_logs, ...)
//! ```
//!
//! # Usage
//!
//! 1. Use `SpanContextExtractor` in Axum handlers to pick up an incoming parent context.
//! 2. Call `Tracer::start_span` with that parent, tag the span, then `Tracer::finish` it.
//! 3. Pick `LogTracer` to emit spans as `tracing` events, or `RecordingTracer` to keep them.

pub mod context;
pub mod extract;
pub mod span;
pub mod tracer;

pub use context::SpanContext;
pub use extract::SpanContextExtractor;
pub use span::{ExecutionSpan, SpanStatus};
pub use tracer::{LogTracer, RecordingTracer, Tracer};
