//! Status tracker
//!
//! Owns one `ServiceStatus` per configured service and the IDLE /
//! AWAITING_RESPONSE state machine. Each entry sits behind its own mutex, so a
//! tick and a reply for the same service never interleave their
//! read-modify-write while different services proceed in parallel.
//!
//! Transitions are synchronous. Persistence is handed to the gateway, which
//! writes in the background.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::error::{HealthError, Result};
use crate::gateway::PersistenceGateway;
use crate::model::{AttemptId, HealthCheckRecord, HeartbeatAttempt, ServiceStatus};
use crate::telemetry::MonitorMetrics;

#[derive(Debug)]
pub struct StatusTracker {
    entries: HashMap<String, Mutex<ServiceStatus>>,
    gateway: Arc<PersistenceGateway>,
    metrics: MonitorMetrics,
}

impl StatusTracker {
    /// Fresh `IDLE` status for every configured service
    pub fn new(
        config: &MonitorConfig,
        gateway: Arc<PersistenceGateway>,
        metrics: MonitorMetrics,
    ) -> Self {
        let entries = config
            .services
            .iter()
            .map(|s| (s.name.clone(), Mutex::new(ServiceStatus::new(s.name.clone()))))
            .collect();

        Self {
            entries,
            gateway,
            metrics,
        }
    }

    fn entry(&self, service_name: &str) -> Result<MutexGuard<'_, ServiceStatus>> {
        self.entries
            .get(service_name)
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .ok_or_else(|| HealthError::UnknownService(service_name.to_string()))
    }

    /// IDLE -> AWAITING_RESPONSE
    pub fn begin_attempt(
        &self,
        service_name: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<HeartbeatAttempt> {
        let mut status = self.entry(service_name)?;
        if let Some(outstanding) = &status.outstanding_attempt {
            return Err(HealthError::AlreadyOutstanding {
                service: service_name.to_string(),
                attempt_id: outstanding.attempt_id.clone(),
            });
        }

        let attempt = HeartbeatAttempt {
            attempt_id: AttemptId::generate(),
            service_name: service_name.to_string(),
            sent_at,
        };
        status.outstanding_attempt = Some(attempt.clone());
        status.last_sent_at = Some(sent_at);
        status.revision += 1;

        self.metrics.inc_outstanding();
        debug!(service = service_name, attempt_id = %attempt.attempt_id, "Attempt started");
        self.gateway.mirror_status(status.clone());
        Ok(attempt)
    }

    /// AWAITING_RESPONSE -> IDLE on a reply for the outstanding attempt.
    ///
    /// `running` is `status_code == 0`. A reply for any other attempt is a
    /// `StaleReply` and leaves the status untouched.
    pub fn resolve_success(
        &self,
        service_name: &str,
        attempt_id: &AttemptId,
        received_at: DateTime<Utc>,
        status_code: i64,
    ) -> Result<HealthCheckRecord> {
        let mut status = self.entry(service_name)?;
        let attempt = match &status.outstanding_attempt {
            Some(outstanding) if &outstanding.attempt_id == attempt_id => outstanding.clone(),
            _ => {
                self.metrics.record_stale_reply();
                return Err(HealthError::StaleReply {
                    service: service_name.to_string(),
                    attempt_id: attempt_id.clone(),
                });
            }
        };

        let running = status_code == 0;
        let record = HealthCheckRecord::replied(&attempt, received_at, running);

        status.outstanding_attempt = None;
        status.last_result_code = Some(status_code);
        status.last_received_at = Some(received_at);
        status.total_count += 1;
        if running {
            status.success_count += 1;
        }
        status.revision += 1;

        self.metrics.dec_outstanding();
        self.metrics
            .record_reply(service_name, running, record.latency_seconds);
        debug!(
            service = service_name,
            attempt_id = %attempt_id,
            running,
            latency_seconds = record.latency_seconds,
            "Attempt resolved by reply"
        );
        self.gateway.record_outcome(record.clone(), status.clone());
        Ok(record)
    }

    /// AWAITING_RESPONSE -> IDLE when the attempt is still outstanding at the
    /// next tick. Returns `None` if the service is already `IDLE`.
    pub fn resolve_timeout(&self, service_name: &str) -> Result<Option<HealthCheckRecord>> {
        let mut status = self.entry(service_name)?;
        let attempt = match status.outstanding_attempt.take() {
            Some(attempt) => attempt,
            None => return Ok(None),
        };

        let record = HealthCheckRecord::timed_out(&attempt);
        status.last_result_code = None;
        status.total_count += 1;
        status.revision += 1;

        self.metrics.dec_outstanding();
        self.metrics.record_timeout(service_name);
        warn!(
            service = service_name,
            attempt_id = %attempt.attempt_id,
            "No reply before the next tick, attempt timed out"
        );
        self.gateway.record_outcome(record.clone(), status.clone());
        Ok(Some(record))
    }

    /// Copy of one service's current status
    pub fn status(&self, service_name: &str) -> Result<ServiceStatus> {
        self.entry(service_name).map(|status| status.clone())
    }

    /// Copies of every status, ordered by service name
    pub fn snapshot(&self) -> Vec<ServiceStatus> {
        let mut all: Vec<ServiceStatus> = self
            .entries
            .values()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone())
            .collect();
        all.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        all
    }

    /// Mirror every current status, e.g. after the status store was reset.
    pub fn mirror_all(&self) {
        for status in self.snapshot() {
            self.gateway.mirror_status(status);
        }
    }

    pub fn contains(&self, service_name: &str) -> bool {
        self.entries.contains_key(service_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceDefinition;
    use crate::model::LivenessState;
    use crate::store::{MemoryStatusStore, MemoryTimeSeries, StatusStore};
    use chrono::Duration;
    use proptest::prelude::*;

    struct Fixture {
        tracker: StatusTracker,
        gateway: Arc<PersistenceGateway>,
        sink: Arc<MemoryTimeSeries>,
        store: Arc<MemoryStatusStore>,
    }

    fn fixture() -> Fixture {
        let config = MonitorConfig::new(vec![
            ServiceDefinition::bus("alpha", "health/alpha", 5),
            ServiceDefinition::bus("beta", "health/beta", 5),
        ]);
        let store = Arc::new(MemoryStatusStore::new());
        let sink = Arc::new(MemoryTimeSeries::new());
        let metrics = MonitorMetrics::unregistered();
        let gateway = Arc::new(PersistenceGateway::new(
            store.clone(),
            sink.clone(),
            metrics.clone(),
        ));
        Fixture {
            tracker: StatusTracker::new(&config, gateway.clone(), metrics),
            gateway,
            sink,
            store,
        }
    }

    #[tokio::test]
    async fn test_begin_then_success() {
        let f = fixture();
        let t0 = Utc::now();

        let attempt = f.tracker.begin_attempt("alpha", t0).unwrap();
        assert_eq!(
            f.tracker.status("alpha").unwrap().state(),
            LivenessState::AwaitingResponse
        );

        let record = f
            .tracker
            .resolve_success("alpha", &attempt.attempt_id, t0 + Duration::seconds(2), 0)
            .unwrap();
        assert!(record.running);
        assert_eq!(record.latency_seconds, Some(2.0));

        let status = f.tracker.status("alpha").unwrap();
        assert_eq!(status.state(), LivenessState::Idle);
        assert_eq!((status.success_count, status.total_count), (1, 1));
        assert_eq!(status.last_result_code, Some(0));

        f.gateway.drain().await;
        assert_eq!(f.sink.health_checks(), vec![record]);
        assert_eq!(f.store.get("alpha").await.unwrap(), Some(status));
    }

    #[tokio::test]
    async fn test_failed_reply_counts_but_not_as_success() {
        let f = fixture();
        let attempt = f.tracker.begin_attempt("alpha", Utc::now()).unwrap();
        let record = f
            .tracker
            .resolve_success("alpha", &attempt.attempt_id, Utc::now(), 3)
            .unwrap();

        assert!(!record.running);
        let status = f.tracker.status("alpha").unwrap();
        assert_eq!((status.success_count, status.total_count), (0, 1));
        assert_eq!(status.last_result_code, Some(3));
    }

    #[tokio::test]
    async fn test_second_begin_is_already_outstanding() {
        let f = fixture();
        let first = f.tracker.begin_attempt("alpha", Utc::now()).unwrap();

        assert_eq!(
            f.tracker.begin_attempt("alpha", Utc::now()),
            Err(HealthError::AlreadyOutstanding {
                service: "alpha".to_string(),
                attempt_id: first.attempt_id,
            })
        );
        // Other services are unaffected
        assert!(f.tracker.begin_attempt("beta", Utc::now()).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_then_late_reply_is_stale() {
        let f = fixture();
        let x = f.tracker.begin_attempt("alpha", Utc::now()).unwrap();

        let timed_out = f.tracker.resolve_timeout("alpha").unwrap().unwrap();
        assert!(!timed_out.running);
        assert!(timed_out.is_timeout());

        let y = f.tracker.begin_attempt("alpha", Utc::now()).unwrap();
        let late = f
            .tracker
            .resolve_success("alpha", &x.attempt_id, Utc::now(), 0);
        assert!(matches!(late, Err(HealthError::StaleReply { .. })));

        let status = f.tracker.status("alpha").unwrap();
        assert_eq!((status.success_count, status.total_count), (0, 1));
        assert_eq!(
            status.outstanding_attempt.map(|a| a.attempt_id),
            Some(y.attempt_id)
        );
    }

    #[tokio::test]
    async fn test_timeout_when_idle_is_noop() {
        let f = fixture();
        assert_eq!(f.tracker.resolve_timeout("alpha").unwrap(), None);
        assert_eq!(f.tracker.status("alpha").unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let f = fixture();
        let unknown = HealthError::UnknownService("gamma".to_string());

        assert_eq!(f.tracker.begin_attempt("gamma", Utc::now()), Err(unknown.clone()));
        assert_eq!(f.tracker.resolve_timeout("gamma"), Err(unknown.clone()));
        assert_eq!(
            f.tracker
                .resolve_success("gamma", &AttemptId::generate(), Utc::now(), 0),
            Err(unknown)
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Begin,
        ReplyCurrent(i64),
        ReplyStale,
        Timeout,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Begin),
            (0i64..3).prop_map(Op::ReplyCurrent),
            Just(Op::ReplyStale),
            Just(Op::Timeout),
        ]
    }

    proptest! {
        #[test]
        fn prop_tracker_invariants(ops in proptest::collection::vec(op(), 1..60)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let guard = rt.enter();
            let f = fixture();

            let mut outstanding: Option<AttemptId> = None;
            let mut begun = 0u64;
            let mut resolved = 0u64;

            for op in ops {
                let before = f.tracker.status("alpha").unwrap();
                match op {
                    Op::Begin => match f.tracker.begin_attempt("alpha", Utc::now()) {
                        Ok(attempt) => {
                            prop_assert!(outstanding.is_none());
                            outstanding = Some(attempt.attempt_id);
                            begun += 1;
                        }
                        Err(HealthError::AlreadyOutstanding { .. }) => {
                            prop_assert!(outstanding.is_some());
                        }
                        Err(e) => prop_assert!(false, "unexpected error {}", e),
                    },
                    Op::ReplyCurrent(code) => {
                        let id = outstanding.clone().unwrap_or_else(AttemptId::generate);
                        let result = f.tracker.resolve_success("alpha", &id, Utc::now(), code);
                        if outstanding.take().is_some() {
                            prop_assert!(result.is_ok());
                            resolved += 1;
                        } else {
                            prop_assert!(
                                matches!(result, Err(HealthError::StaleReply { .. })),
                                "reply without an outstanding attempt must be stale"
                            );
                        }
                    }
                    Op::ReplyStale => {
                        let result = f.tracker.resolve_success(
                            "alpha",
                            &AttemptId::generate(),
                            Utc::now(),
                            0,
                        );
                        let is_stale = matches!(result, Err(HealthError::StaleReply { .. }));
                        prop_assert!(is_stale);
                        let after = f.tracker.status("alpha").unwrap();
                        prop_assert_eq!(after.success_count, before.success_count);
                        prop_assert_eq!(after.total_count, before.total_count);
                    }
                    Op::Timeout => {
                        let result = f.tracker.resolve_timeout("alpha").unwrap();
                        prop_assert_eq!(result.is_some(), outstanding.take().is_some());
                        if result.is_some() {
                            resolved += 1;
                        }
                    }
                }

                let status = f.tracker.status("alpha").unwrap();
                prop_assert!(status.success_count <= status.total_count);
                prop_assert_eq!(
                    status.outstanding_attempt.map(|a| a.attempt_id),
                    outstanding.clone()
                );
                prop_assert_eq!(status.total_count, resolved);
            }

            // Close the last attempt so every begun attempt has resolved
            if f.tracker.resolve_timeout("alpha").unwrap().is_some() {
                resolved += 1;
            }
            prop_assert_eq!(resolved, begun);

            drop(guard);
            rt.block_on(f.gateway.drain());
            let records = f.sink.health_checks();
            prop_assert_eq!(records.len() as u64, begun);
            let mut ids: Vec<_> = records.into_iter().map(|r| r.attempt_id).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len() as u64, begun);
        }
    }
}
