//! Response listener
//!
//! Consumes the reply topic and turns each well-formed reply into a tracker
//! transition. Nothing a payload contains can stop the consumer: malformed
//! payloads, unknown services and stale replies are logged and dropped.

use heartbeat_span::Tracer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::Subscription;
use crate::error::{HealthError, Result};
use crate::instrument::OptionalSpan;
use crate::messages::HeartbeatReply;
use crate::model::HealthCheckRecord;
use crate::telemetry::MonitorMetrics;
use crate::tracker::StatusTracker;

#[derive(Debug)]
pub struct ResponseListener {
    tracker: Arc<StatusTracker>,
    metrics: MonitorMetrics,
    tracer: Option<Arc<dyn Tracer>>,
}

impl ResponseListener {
    pub fn new(tracker: Arc<StatusTracker>, metrics: MonitorMetrics) -> Self {
        Self {
            tracker,
            metrics,
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Parse one raw payload and resolve the attempt it answers.
    pub fn handle_payload(&self, payload: &[u8]) -> Result<HealthCheckRecord> {
        let mut span = OptionalSpan::start(self.tracer.as_ref(), "reply", None);

        let result = HeartbeatReply::parse(payload).and_then(|reply| {
            span.tag("service", reply.name.as_str());
            span.tag("attempt_id", reply.id.as_str());
            span.tag("code", reply.status.code);
            self.tracker
                .resolve_success(&reply.name, &reply.id, reply.received, reply.status.code)
        });

        span.finish(&result);
        result
    }

    /// Consume `subscription` until it closes or `shutdown` fires.
    pub async fn run(self, mut subscription: Subscription, shutdown: CancellationToken) {
        info!(topic = subscription.topic(), "Response listener started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(message) => message,
                    None => {
                        warn!(topic = subscription.topic(), "Reply subscription closed");
                        break;
                    }
                },
            };

            match self.handle_payload(&message.payload) {
                Ok(record) => debug!(
                    service = %record.service_name,
                    attempt_id = %record.attempt_id,
                    running = record.running,
                    "Reply processed"
                ),
                Err(e @ HealthError::StaleReply { .. }) => {
                    debug!(error = %e, "Dropping stale reply");
                }
                Err(e @ HealthError::UnknownService(_)) => {
                    self.metrics.record_unknown_service();
                    warn!(topic = %message.topic, error = %e, "Dropping reply for unknown service");
                }
                Err(e) => {
                    self.metrics.record_malformed();
                    warn!(topic = %message.topic, error = %e, "Dropping reply");
                }
            }
        }

        info!("Response listener stopped");
    }
}
