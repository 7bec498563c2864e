//! Storage capabilities: the current-status document store and the
//! append-only time-series sink.
//!
//! Both are consumed through traits so the monitor runs unchanged against the
//! in-memory implementations here or a client for a real document store and
//! time-series database.

mod memory;

pub use memory::{MemoryStatusStore, MemoryTimeSeries};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::error::HealthError;
use crate::model::{
    AvailabilityBucket, HealthCheckRecord, SendCheckRecord, ServiceStatus,
    HEALTH_CHECK_MEASUREMENT, SEND_CHECK_MEASUREMENT,
};
use crate::query::{AvailabilityQuery, LogQuery};

/// Errors from a status store or time-series sink
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or could not decode a record
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for HealthError {
    fn from(err: StoreError) -> Self {
        HealthError::StoreUnavailable(err.to_string())
    }
}

/// A time-series point, tagged by service name
#[derive(Debug, Clone, PartialEq)]
pub enum Point {
    HealthCheck(HealthCheckRecord),
    SendCheck(SendCheckRecord),
}

impl Point {
    pub fn measurement(&self) -> &'static str {
        match self {
            Point::HealthCheck(_) => HEALTH_CHECK_MEASUREMENT,
            Point::SendCheck(_) => SEND_CHECK_MEASUREMENT,
        }
    }

    pub fn service_name(&self) -> &str {
        match self {
            Point::HealthCheck(r) => &r.service_name,
            Point::SendCheck(r) => &r.service_name,
        }
    }
}

/// Document store holding one current-status record per service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusStore: Send + Sync + fmt::Debug {
    /// Insert or replace; a revision not newer than the stored one is a no-op
    async fn upsert(&self, status: ServiceStatus) -> StoreResult<()>;

    async fn get(&self, service_name: &str) -> StoreResult<Option<ServiceStatus>>;

    /// All documents, ordered by service name
    async fn list(&self) -> StoreResult<Vec<ServiceStatus>>;

    /// Drop every document
    async fn clear(&self) -> StoreResult<()>;
}

/// Append-only time-series sink
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeSeriesSink: Send + Sync + fmt::Debug {
    /// Append a point; rewriting the same (measurement, attempt) is a no-op
    async fn write(&self, point: Point) -> StoreResult<()>;

    /// `health_check` records matching the query, newest first, paginated
    async fn query_logs(&self, query: &LogQuery) -> StoreResult<Vec<HealthCheckRecord>>;

    /// Mean of `running` per non-empty bucket, oldest first
    async fn aggregate_running(
        &self,
        query: &AvailabilityQuery,
    ) -> StoreResult<Vec<AvailabilityBucket>>;
}
