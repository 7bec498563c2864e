//! Persistence gateway
//!
//! Mirrors status snapshots into the status store and appends points to the
//! time-series sink. Every write runs as its own task so the state machine
//! never waits on storage. Failures are logged and counted as degraded writes;
//! nothing is retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::model::{HealthCheckRecord, SendCheckRecord, ServiceStatus};
use crate::store::{Point, StatusStore, TimeSeriesSink};
use crate::telemetry::{MonitorMetrics, STATUS_SINK, TIME_SERIES_SINK};

/// Dual-sink writer shared by the tracker and the pinger
#[derive(Debug)]
pub struct PersistenceGateway {
    status_store: Arc<dyn StatusStore>,
    sink: Arc<dyn TimeSeriesSink>,
    metrics: MonitorMetrics,
    tasks: TaskTracker,
    degraded: Arc<AtomicU64>,
}

impl PersistenceGateway {
    pub fn new(
        status_store: Arc<dyn StatusStore>,
        sink: Arc<dyn TimeSeriesSink>,
        metrics: MonitorMetrics,
    ) -> Self {
        Self {
            status_store,
            sink,
            metrics,
            tasks: TaskTracker::new(),
            degraded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Mirror a status snapshot. Must be called inside a tokio runtime.
    pub fn mirror_status(&self, status: ServiceStatus) {
        let store = Arc::clone(&self.status_store);
        let metrics = self.metrics.clone();
        let degraded = Arc::clone(&self.degraded);

        self.tasks.spawn(async move {
            let service = status.service_name.clone();
            let revision = status.revision;
            match store.upsert(status).await {
                Ok(()) => debug!(service = %service, revision, "Status mirrored"),
                Err(e) => {
                    degraded.fetch_add(1, Ordering::Relaxed);
                    metrics.record_degraded_write(STATUS_SINK);
                    warn!(service = %service, revision, error = %e, "Degraded write: status store");
                }
            }
        });
    }

    /// Append the outcome of a resolved attempt and mirror the resulting status.
    pub fn record_outcome(&self, record: HealthCheckRecord, status: ServiceStatus) {
        self.write_point(Point::HealthCheck(record));
        self.mirror_status(status);
    }

    /// Append the audit record of a published heartbeat.
    pub fn record_send(&self, record: SendCheckRecord) {
        self.write_point(Point::SendCheck(record));
    }

    fn write_point(&self, point: Point) {
        let sink = Arc::clone(&self.sink);
        let metrics = self.metrics.clone();
        let degraded = Arc::clone(&self.degraded);

        self.tasks.spawn(async move {
            let measurement = point.measurement();
            let service = point.service_name().to_string();
            match sink.write(point).await {
                Ok(()) => debug!(service = %service, measurement, "Point written"),
                Err(e) => {
                    degraded.fetch_add(1, Ordering::Relaxed);
                    metrics.record_degraded_write(TIME_SERIES_SINK);
                    warn!(
                        service = %service,
                        measurement,
                        error = %e,
                        "Degraded write: time-series sink"
                    );
                }
            }
        });
    }

    /// Writes spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Writes that failed since start
    pub fn degraded_writes(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Wait for every write spawned so far; the gateway keeps accepting writes.
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Wait for in-flight writes before shutdown.
    pub async fn drain(&self) {
        debug!(in_flight = self.in_flight(), "Draining persistence gateway");
        self.tasks.close();
        self.tasks.wait().await;
        debug!("Persistence gateway drained");
    }
}
