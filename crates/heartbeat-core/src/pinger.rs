//! Per-service heartbeat prober
//!
//! One `Pinger` per bus-based service, each on its own timer. A tick first
//! resolves the previous attempt as a timeout if it is still outstanding, then
//! starts a new attempt, publishes the request and records the send.

use chrono::{DateTime, Utc};
use heartbeat_span::Tracer;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::config::ServiceDefinition;
use crate::error::{HealthError, Result};
use crate::gateway::PersistenceGateway;
use crate::instrument::OptionalSpan;
use crate::messages::HeartbeatRequest;
use crate::model::{HeartbeatAttempt, SendCheckRecord};
use crate::telemetry::MonitorMetrics;
use crate::tracker::StatusTracker;

#[derive(Debug)]
pub struct Pinger {
    service: ServiceDefinition,
    reply_topic: String,
    tracker: Arc<StatusTracker>,
    bus: Arc<dyn MessageBus>,
    gateway: Arc<PersistenceGateway>,
    metrics: MonitorMetrics,
    tracer: Option<Arc<dyn Tracer>>,
}

impl Pinger {
    pub fn new(
        service: ServiceDefinition,
        reply_topic: impl Into<String>,
        tracker: Arc<StatusTracker>,
        bus: Arc<dyn MessageBus>,
        gateway: Arc<PersistenceGateway>,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            service,
            reply_topic: reply_topic.into(),
            tracker,
            bus,
            gateway,
            metrics,
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn service(&self) -> &ServiceDefinition {
        &self.service
    }

    /// Run one tick now.
    pub async fn tick(&self) -> Result<Option<HeartbeatAttempt>> {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as if it fired at `now`.
    ///
    /// Returns `None` when the tick was skipped because an attempt is still
    /// outstanding after the timeout step. A publish failure is returned as
    /// `PublishFailed`; the attempt stays outstanding and times out on the next
    /// tick.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<Option<HeartbeatAttempt>> {
        let mut span = OptionalSpan::start(self.tracer.as_ref(), "ping", None);
        span.tag("service", self.service.name.as_str());

        let result = self.run_tick(now, &mut span).await;

        span.finish(&result);
        result
    }

    async fn run_tick(
        &self,
        now: DateTime<Utc>,
        span: &mut OptionalSpan<'_>,
    ) -> Result<Option<HeartbeatAttempt>> {
        let name = self.service.name.as_str();

        if let Some(timed_out) = self.tracker.resolve_timeout(name)? {
            span.tag("timed_out", timed_out.attempt_id.as_str());
        }

        let attempt = match self.tracker.begin_attempt(name, now) {
            Ok(attempt) => attempt,
            Err(e @ HealthError::AlreadyOutstanding { .. }) => {
                warn!(service = name, error = %e, "Anomaly: attempt still outstanding, skipping tick");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        span.tag("attempt_id", attempt.attempt_id.as_str());

        let payload = HeartbeatRequest::for_attempt(&attempt, &self.reply_topic).to_bytes()?;
        if let Err(e) = self.bus.publish(&self.service.endpoint, payload).await {
            self.metrics.record_publish_failure(name);
            warn!(
                service = name,
                topic = %self.service.endpoint,
                attempt_id = %attempt.attempt_id,
                error = %e,
                "Heartbeat publish failed"
            );
            return Err(HealthError::PublishFailed {
                topic: self.service.endpoint.clone(),
                reason: e.to_string(),
            });
        }

        self.metrics.record_ping(name);
        debug!(
            service = name,
            topic = %self.service.endpoint,
            attempt_id = %attempt.attempt_id,
            "Heartbeat sent"
        );

        self.gateway.record_send(SendCheckRecord {
            attempt_id: attempt.attempt_id.clone(),
            service_name: attempt.service_name.clone(),
            destination: self.reply_topic.clone(),
            sent_at: attempt.sent_at,
        });

        Ok(Some(attempt))
    }

    /// Tick immediately, then every `interval_seconds`, until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.service.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            service = %self.service.name,
            interval_seconds = self.service.interval_seconds,
            "Pinger started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.tick().await {
                    // Logged with the attempt id in the tick; the next tick is the retry
                    Err(HealthError::PublishFailed { .. }) | Ok(_) => {}
                    Err(e) => warn!(service = %self.service.name, error = %e, "Heartbeat tick failed"),
                },
            }
        }

        info!(service = %self.service.name, "Pinger stopped");
    }
}
