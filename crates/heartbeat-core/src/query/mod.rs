//! Query engine for the read API
//!
//! Validates read parameters, builds bounded queries and runs them against the
//! time-series sink directly on every call. Current status is read from the
//! status store.

mod builder;

pub use builder::{bucket_start, AvailabilityQuery, LogQuery, TimeFilter};

use chrono::{DateTime, Utc};
use heartbeat_span::{SpanContext, Tracer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{HealthError, Result};
use crate::instrument::OptionalSpan;
use crate::model::{AvailabilityBucket, HealthCheckRecord, ServiceStatus};
use crate::store::{StatusStore, TimeSeriesSink};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_INTERVAL: &str = "1h";

/// Upper bound on the number of buckets one availability query may return
pub const MAX_BUCKETS: i64 = 10_000;

/// Parameters of the filtered log listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogParams {
    pub service_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: i64,
    pub page_size: i64,
}

impl Default for LogParams {
    fn default() -> Self {
        Self {
            service_name: None,
            from: None,
            to: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl LogParams {
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
            ..Default::default()
        }
    }

    /// Validate and build the sink query.
    pub fn to_query(&self) -> Result<LogQuery> {
        check_window(self.from, self.to)?;
        if self.page < 0 {
            return Err(HealthError::invalid_parameter("page must be >= 0"));
        }
        if self.page_size <= 0 {
            return Err(HealthError::invalid_parameter("page_size must be > 0"));
        }
        let offset = self
            .page
            .checked_mul(self.page_size)
            .ok_or_else(|| HealthError::invalid_parameter("page * page_size overflows"))?;

        Ok(LogQuery {
            filter: TimeFilter {
                service_name: self.service_name.clone(),
                from: self.from,
                to: self.to,
            },
            limit: self.page_size as u64,
            offset: offset as u64,
        })
    }
}

/// Parameters of the bucketed availability aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityParams {
    pub service_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub interval: String,
}

impl Default for AvailabilityParams {
    fn default() -> Self {
        Self {
            service_name: None,
            from: None,
            to: None,
            interval: DEFAULT_INTERVAL.to_string(),
        }
    }
}

impl AvailabilityParams {
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
            ..Default::default()
        }
    }

    /// Validate and build the sink query.
    pub fn to_query(&self) -> Result<AvailabilityQuery> {
        check_window(self.from, self.to)?;
        let interval = parse_interval(&self.interval)?;

        Ok(AvailabilityQuery::new(
            TimeFilter {
                service_name: self.service_name.clone(),
                from: self.from,
                to: self.to,
            },
            interval,
            self.interval.trim(),
        ))
    }
}

/// Parse a positive duration such as `1h`, `15m` or `30s`.
pub fn parse_interval(raw: &str) -> Result<Duration> {
    let interval = humantime::parse_duration(raw.trim())
        .map_err(|e| HealthError::invalid_parameter(format!("interval {:?}: {}", raw, e)))?;
    if interval.as_millis() == 0 {
        return Err(HealthError::invalid_parameter(format!(
            "interval {:?} must be a positive duration of at least 1ms",
            raw
        )));
    }
    Ok(interval)
}

fn check_window(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(HealthError::invalid_parameter(
            "from must not be later than to",
        )),
        _ => Ok(()),
    }
}

/// One page of the log listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
    pub page: i64,
    /// Number of items returned
    pub size: usize,
    pub items: Vec<HealthCheckRecord>,
}

/// Result of the current-status lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CurrentStatus {
    One(ServiceStatus),
    All(Vec<ServiceStatus>),
}

/// Read-side query engine
#[derive(Debug, Clone)]
pub struct QueryEngine {
    status_store: Arc<dyn StatusStore>,
    sink: Arc<dyn TimeSeriesSink>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl QueryEngine {
    pub fn new(status_store: Arc<dyn StatusStore>, sink: Arc<dyn TimeSeriesSink>) -> Self {
        Self {
            status_store,
            sink,
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Status of one service, or of every service when `service_name` is `None`.
    pub async fn get_current_status(&self, service_name: Option<&str>) -> Result<CurrentStatus> {
        self.get_current_status_in(service_name, None).await
    }

    pub async fn get_current_status_in(
        &self,
        service_name: Option<&str>,
        parent: Option<&SpanContext>,
    ) -> Result<CurrentStatus> {
        let mut span = OptionalSpan::start(self.tracer.as_ref(), "get_current_status", parent);
        if let Some(name) = service_name {
            span.tag("name", name);
        }

        let result = match service_name {
            Some(name) => self
                .status_store
                .get(name)
                .await
                .map_err(HealthError::from)
                .and_then(|found| {
                    found
                        .map(CurrentStatus::One)
                        .ok_or_else(|| HealthError::UnknownService(name.to_string()))
                }),
            None => self
                .status_store
                .list()
                .await
                .map(CurrentStatus::All)
                .map_err(HealthError::from),
        };

        span.finish(&result);
        result
    }

    /// Filtered, newest-first page of health-check records.
    pub async fn get_logs(&self, params: &LogParams) -> Result<LogPage> {
        self.get_logs_in(params, None).await
    }

    pub async fn get_logs_in(
        &self,
        params: &LogParams,
        parent: Option<&SpanContext>,
    ) -> Result<LogPage> {
        let mut span = OptionalSpan::start(self.tracer.as_ref(), "get_logs", parent);
        span.tag("page", params.page);
        span.tag("page_size", params.page_size);

        let result = match params.to_query() {
            Ok(query) => {
                let q = query.to_influxql();
                tracing::debug!(q = %q, "Filter by");
                span.tag("q", q);

                self.sink
                    .query_logs(&query)
                    .await
                    .map(|items| LogPage {
                        page: params.page,
                        size: items.len(),
                        items,
                    })
                    .map_err(HealthError::from)
            }
            Err(e) => Err(e),
        };

        span.finish(&result);
        result
    }

    /// Availability series over the window, one point per bucket, gaps filled with 0.
    pub async fn get_availability(
        &self,
        params: &AvailabilityParams,
    ) -> Result<Vec<AvailabilityBucket>> {
        self.get_availability_in(params, None).await
    }

    pub async fn get_availability_in(
        &self,
        params: &AvailabilityParams,
        parent: Option<&SpanContext>,
    ) -> Result<Vec<AvailabilityBucket>> {
        let mut span = OptionalSpan::start(self.tracer.as_ref(), "get_availability", parent);
        span.tag("interval", params.interval.as_str());

        let result = self.availability(params, &mut span).await;

        span.finish(&result);
        result
    }

    async fn availability(
        &self,
        params: &AvailabilityParams,
        span: &mut OptionalSpan<'_>,
    ) -> Result<Vec<AvailabilityBucket>> {
        let mut query = params.to_query()?;
        let end = query.filter.to.unwrap_or_else(Utc::now);
        let requested_from = query.filter.from;
        match requested_from {
            Some(from) => {
                bucket_count(from, end, query.interval)?;
            }
            // Open-ended windows keep the most recent buckets only
            None => query.filter.from = earliest_bucket(end, query.interval),
        }

        let q = query.to_influxql();
        tracing::debug!(q = %q, "Group by");
        span.tag("q", q);

        let sparse = self.sink.aggregate_running(&query).await?;

        let start = match requested_from.or_else(|| sparse.first().map(|b| b.bucket_start)) {
            Some(start) => start,
            None => return Ok(Vec::new()),
        };
        fill_buckets(sparse, start, end, query.interval)
    }
}

fn bucket_count(start: DateTime<Utc>, end: DateTime<Utc>, interval: Duration) -> Result<i64> {
    let (first, last) = bucket_range(start, end, interval)?;
    if last < first {
        return Ok(0);
    }
    let width = interval.as_millis() as i64;
    let count = (last.timestamp_millis() - first.timestamp_millis()) / width + 1;
    if count > MAX_BUCKETS {
        return Err(HealthError::invalid_parameter(format!(
            "window spans {} buckets, at most {} allowed",
            count, MAX_BUCKETS
        )));
    }
    Ok(count)
}

/// Start of the oldest of the `MAX_BUCKETS` buckets ending at `end`
fn earliest_bucket(end: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    let last = bucket_start(end, interval)?;
    let span_ms = i64::try_from(interval.as_millis())
        .ok()?
        .checked_mul(MAX_BUCKETS - 1)?;
    last.checked_sub_signed(chrono::Duration::milliseconds(span_ms))
}

fn bucket_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Duration,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let first = bucket_start(start, interval)
        .ok_or_else(|| HealthError::invalid_parameter("window start out of range"))?;
    let last = bucket_start(end, interval)
        .ok_or_else(|| HealthError::invalid_parameter("window end out of range"))?;
    Ok((first, last))
}

/// Expand a sparse series to one bucket per interval over `[start, end]`.
pub fn fill_buckets(
    sparse: Vec<AvailabilityBucket>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Duration,
) -> Result<Vec<AvailabilityBucket>> {
    let count = bucket_count(start, end, interval)?;
    let (first, _) = bucket_range(start, end, interval)?;
    let width = chrono::Duration::milliseconds(interval.as_millis() as i64);

    let known: HashMap<i64, f64> = sparse
        .into_iter()
        .map(|b| (b.bucket_start.timestamp_millis(), b.mean_running))
        .collect();

    let mut series = Vec::with_capacity(count as usize);
    let mut bucket = first;
    for _ in 0..count {
        series.push(AvailabilityBucket {
            bucket_start: bucket,
            mean_running: known
                .get(&bucket.timestamp_millis())
                .copied()
                .unwrap_or(0.0),
        });
        bucket += width;
    }
    Ok(series)
}
