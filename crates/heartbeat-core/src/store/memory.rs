//! In-memory status store and time-series sink.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::{Point, StatusStore, StoreError, StoreResult, TimeSeriesSink};
use crate::model::{
    AttemptId, AvailabilityBucket, HealthCheckRecord, SendCheckRecord, ServiceStatus,
};
use crate::query::{bucket_start, AvailabilityQuery, LogQuery};

fn check_online(offline: &AtomicBool, name: &str) -> StoreResult<()> {
    if offline.load(Ordering::SeqCst) {
        Err(StoreError::Unavailable(format!("{} offline", name)))
    } else {
        Ok(())
    }
}

/// Status documents keyed by service name
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    documents: RwLock<HashMap<String, ServiceStatus>>,
    offline: AtomicBool,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn upsert(&self, status: ServiceStatus) -> StoreResult<()> {
        check_online(&self.offline, "status store")?;
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match documents.get(&status.service_name) {
            Some(existing) if existing.revision >= status.revision => {}
            _ => {
                documents.insert(status.service_name.clone(), status);
            }
        }
        Ok(())
    }

    async fn get(&self, service_name: &str) -> StoreResult<Option<ServiceStatus>> {
        check_online(&self.offline, "status store")?;
        Ok(self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(service_name)
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<ServiceStatus>> {
        check_online(&self.offline, "status store")?;
        let mut all: Vec<ServiceStatus> = self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        Ok(all)
    }

    async fn clear(&self) -> StoreResult<()> {
        check_online(&self.offline, "status store")?;
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Series {
    health_checks: Vec<HealthCheckRecord>,
    send_checks: Vec<SendCheckRecord>,
    health_check_ids: HashSet<AttemptId>,
    send_check_ids: HashSet<AttemptId>,
}

/// Both measurements held in insertion order
#[derive(Debug, Default)]
pub struct MemoryTimeSeries {
    series: RwLock<Series>,
    offline: AtomicBool,
}

impl MemoryTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `StoreError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every `health_check` record, in write order
    pub fn health_checks(&self) -> Vec<HealthCheckRecord> {
        self.series
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .health_checks
            .clone()
    }

    /// Every `send_check` record, in write order
    pub fn send_checks(&self) -> Vec<SendCheckRecord> {
        self.series
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send_checks
            .clone()
    }
}

#[async_trait]
impl TimeSeriesSink for MemoryTimeSeries {
    async fn write(&self, point: Point) -> StoreResult<()> {
        check_online(&self.offline, "time-series sink")?;
        let mut series = self
            .series
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match point {
            Point::HealthCheck(record) => {
                if series.health_check_ids.insert(record.attempt_id.clone()) {
                    series.health_checks.push(record);
                }
            }
            Point::SendCheck(record) => {
                if series.send_check_ids.insert(record.attempt_id.clone()) {
                    series.send_checks.push(record);
                }
            }
        }
        Ok(())
    }

    async fn query_logs(&self, query: &LogQuery) -> StoreResult<Vec<HealthCheckRecord>> {
        check_online(&self.offline, "time-series sink")?;
        let series = self
            .series
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut matching: Vec<&HealthCheckRecord> = series
            .health_checks
            .iter()
            .filter(|r| query.filter.matches(r))
            .collect();
        matching.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

        Ok(matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn aggregate_running(
        &self,
        query: &AvailabilityQuery,
    ) -> StoreResult<Vec<AvailabilityBucket>> {
        check_online(&self.offline, "time-series sink")?;
        let series = self
            .series
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // bucket start (epoch millis) -> (healthy, total)
        let mut buckets: BTreeMap<i64, (u64, u64)> = BTreeMap::new();
        for record in series.health_checks.iter().filter(|r| query.filter.matches(r)) {
            let start = bucket_start(record.sent_at, query.interval)
                .ok_or_else(|| StoreError::Serialization("timestamp out of range".to_string()))?;
            let entry = buckets.entry(start.timestamp_millis()).or_insert((0, 0));
            entry.0 += u64::from(record.running);
            entry.1 += 1;
        }

        buckets
            .into_iter()
            .map(|(millis, (healthy, total))| {
                let bucket_start = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| StoreError::Serialization("bucket out of range".to_string()))?;
                Ok::<_, StoreError>(AvailabilityBucket {
                    bucket_start,
                    mean_running: healthy as f64 / total as f64,
                })
            })
            .collect()
    }
}
