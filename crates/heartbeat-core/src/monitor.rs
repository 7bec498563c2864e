//! Heartbeat monitor
//!
//! Wires the tracker, gateway, pingers, listener and query engine together and
//! owns their concurrency units: one task per probed service plus the reply
//! consumer, all stopped by one shared cancellation token.

use heartbeat_span::{SpanContext, Tracer};
use prometheus::Registry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::bus::MessageBus;
use crate::config::MonitorConfig;
use crate::error::{HealthError, Result};
use crate::gateway::PersistenceGateway;
use crate::listener::ResponseListener;
use crate::model::AvailabilityBucket;
use crate::pinger::Pinger;
use crate::query::{AvailabilityParams, CurrentStatus, LogPage, LogParams, QueryEngine};
use crate::store::{StatusStore, TimeSeriesSink};
use crate::telemetry::MonitorMetrics;
use crate::tracker::StatusTracker;

#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: MonitorConfig,
    bus: Arc<dyn MessageBus>,
    status_store: Arc<dyn StatusStore>,
    metrics: MonitorMetrics,
    gateway: Arc<PersistenceGateway>,
    tracker: Arc<StatusTracker>,
    queries: QueryEngine,
    tracer: Option<Arc<dyn Tracer>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl HeartbeatMonitor {
    /// Validate `config` and build every component. Metrics are registered in
    /// `registry`.
    pub fn new(
        config: MonitorConfig,
        bus: Arc<dyn MessageBus>,
        status_store: Arc<dyn StatusStore>,
        sink: Arc<dyn TimeSeriesSink>,
        registry: &Registry,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = MonitorMetrics::new(registry)
            .map_err(|e| HealthError::invalid_config(format!("metrics registration: {}", e)))?;
        let gateway = Arc::new(PersistenceGateway::new(
            Arc::clone(&status_store),
            Arc::clone(&sink),
            metrics.clone(),
        ));
        let tracker = Arc::new(StatusTracker::new(
            &config,
            Arc::clone(&gateway),
            metrics.clone(),
        ));
        let queries = QueryEngine::new(Arc::clone(&status_store), sink);

        Ok(Self {
            config,
            bus,
            status_store,
            metrics,
            gateway,
            tracker,
            queries,
            tracer: None,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Trace pings, replies and queries through `tracer`.
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.queries = self.queries.with_tracer(Arc::clone(&tracer));
        self.tracer = Some(tracer);
        self
    }

    /// Reset the status store, subscribe to the reply topic and start one
    /// pinger per bus-based service. Calling it twice is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Heartbeat monitor already started");
            return Ok(());
        }

        if let Err(e) = self.status_store.clear().await {
            self.metrics.record_degraded_write(crate::telemetry::STATUS_SINK);
            warn!(error = %e, "Degraded write: could not reset status store");
        }
        self.tracker.mirror_all();

        let topic = self.config.reply_topic.as_str();
        let subscription = self.bus.subscribe(topic).await.map_err(|e| {
            self.started.store(false, Ordering::SeqCst);
            HealthError::SubscribeFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut listener = ResponseListener::new(Arc::clone(&self.tracker), self.metrics.clone());
        if let Some(tracer) = &self.tracer {
            listener = listener.with_tracer(Arc::clone(tracer));
        }
        self.tasks
            .spawn(listener.run(subscription, self.shutdown.child_token()));

        let mut pingers = 0;
        for service in self.config.probed_services() {
            let mut pinger = Pinger::new(
                service.clone(),
                self.config.reply_topic.clone(),
                Arc::clone(&self.tracker),
                Arc::clone(&self.bus),
                Arc::clone(&self.gateway),
                self.metrics.clone(),
            );
            if let Some(tracer) = &self.tracer {
                pinger = pinger.with_tracer(Arc::clone(tracer));
            }
            self.tasks.spawn(pinger.run(self.shutdown.child_token()));
            pingers += 1;
        }

        info!(
            services = self.config.services.len(),
            probed = pingers,
            reply_topic = topic,
            "Heartbeat monitor started"
        );
        Ok(())
    }

    /// Stop every pinger and the listener, then wait for in-flight writes.
    pub async fn shutdown(&self) {
        info!("Heartbeat monitor shutting down");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.gateway.drain().await;
        info!("Heartbeat monitor stopped");
    }

    /// Token cancelled by `shutdown`
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn gateway(&self) -> &Arc<PersistenceGateway> {
        &self.gateway
    }

    pub fn metrics(&self) -> &MonitorMetrics {
        &self.metrics
    }

    pub fn queries(&self) -> &QueryEngine {
        &self.queries
    }

    pub async fn get_current_status(&self, service_name: Option<&str>) -> Result<CurrentStatus> {
        self.get_current_status_in(service_name, None).await
    }

    /// A configured service whose document has not reached the store yet is
    /// answered from the tracker.
    pub async fn get_current_status_in(
        &self,
        service_name: Option<&str>,
        parent: Option<&SpanContext>,
    ) -> Result<CurrentStatus> {
        match service_name {
            Some(name) if !self.tracker.contains(name) => {
                Err(HealthError::UnknownService(name.to_string()))
            }
            Some(name) => match self.queries.get_current_status_in(Some(name), parent).await {
                Err(HealthError::UnknownService(_)) => {
                    self.tracker.status(name).map(CurrentStatus::One)
                }
                other => other,
            },
            None => self.queries.get_current_status_in(None, parent).await,
        }
    }

    pub async fn get_logs(&self, params: &LogParams) -> Result<LogPage> {
        self.queries.get_logs(params).await
    }

    pub async fn get_availability(
        &self,
        params: &AvailabilityParams,
    ) -> Result<Vec<AvailabilityBucket>> {
        self.queries.get_availability(params).await
    }
}
