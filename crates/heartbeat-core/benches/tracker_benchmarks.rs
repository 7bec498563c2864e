use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use heartbeat_core::model::{AvailabilityBucket, HealthCheckRecord};
use heartbeat_core::query::{fill_buckets, AvailabilityQuery, LogQuery};
use heartbeat_core::store::{Point, StoreResult, TimeSeriesSink};
use heartbeat_core::{
    MemoryStatusStore, MonitorConfig, MonitorMetrics, PersistenceGateway, ServiceDefinition,
    StatusTracker,
};
use tokio::runtime::Runtime;

/// Sink that accepts and forgets every point
#[derive(Debug)]
struct DiscardSink;

#[async_trait]
impl TimeSeriesSink for DiscardSink {
    async fn write(&self, _point: Point) -> StoreResult<()> {
        Ok(())
    }

    async fn query_logs(&self, _query: &LogQuery) -> StoreResult<Vec<HealthCheckRecord>> {
        Ok(Vec::new())
    }

    async fn aggregate_running(
        &self,
        _query: &AvailabilityQuery,
    ) -> StoreResult<Vec<AvailabilityBucket>> {
        Ok(Vec::new())
    }
}

fn tracker_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let _guard = rt.enter();

    let config = MonitorConfig::new(vec![ServiceDefinition::bus("alpha", "health/alpha", 60)]);
    let metrics = MonitorMetrics::unregistered();
    let gateway = Arc::new(PersistenceGateway::new(
        Arc::new(MemoryStatusStore::new()),
        Arc::new(DiscardSink),
        metrics.clone(),
    ));
    let tracker = StatusTracker::new(&config, gateway, metrics);

    c.bench_function("begin_then_reply", |b| {
        b.iter(|| {
            let now = Utc::now();
            let attempt = tracker.begin_attempt("alpha", now).unwrap();
            tracker
                .resolve_success("alpha", &attempt.attempt_id, now, 0)
                .unwrap()
        });
    });

    c.bench_function("begin_then_timeout", |b| {
        b.iter(|| {
            tracker.begin_attempt("alpha", Utc::now()).unwrap();
            tracker.resolve_timeout("alpha").unwrap()
        });
    });
}

fn bucketing_benchmark(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let interval = Duration::from_secs(3600);

    for days in [1i64, 30, 365] {
        let end = start + chrono::Duration::days(days);
        let sparse: Vec<_> = (0..days * 24)
            .step_by(3)
            .map(|h| AvailabilityBucket {
                bucket_start: start + chrono::Duration::hours(h),
                mean_running: 0.5,
            })
            .collect();

        c.bench_with_input(BenchmarkId::new("fill_buckets", days), &sparse, |b, sparse| {
            b.iter(|| fill_buckets(sparse.clone(), start, end, interval).unwrap());
        });
    }
}

criterion_group!(benches, tracker_benchmark, bucketing_benchmark);
criterion_main!(benches);
