//! Heartbeat liveness monitoring
//!
//! Probes a fleet of services over a publish/subscribe bus and keeps an
//! authoritative, queryable liveness signal for each:
//!
//! - [`tracker::StatusTracker`] owns the per-service IDLE / AWAITING_RESPONSE
//!   state machine
//! - [`pinger::Pinger`] drives one timer per bus-based service
//! - [`listener::ResponseListener`] correlates replies with outstanding attempts
//! - [`gateway::PersistenceGateway`] mirrors status and appends time-series points
//! - [`query::QueryEngine`] answers log and availability queries
//!
//! [`monitor::HeartbeatMonitor`] wires them together and owns the tasks.
//!
//! # Example
//!
//! ```rust,no_run
//! use heartbeat_core::{
//!     HeartbeatMonitor, LogParams, MemoryBus, MemoryStatusStore, MemoryTimeSeries,
//!     MonitorConfig, ServiceDefinition,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> heartbeat_core::Result<()> {
//! let config = MonitorConfig::new(vec![ServiceDefinition::bus("billing", "health/billing", 30)]);
//! let monitor = HeartbeatMonitor::new(
//!     config,
//!     Arc::new(MemoryBus::new()),
//!     Arc::new(MemoryStatusStore::new()),
//!     Arc::new(MemoryTimeSeries::new()),
//!     &prometheus::Registry::new(),
//! )?;
//!
//! monitor.start().await?;
//! let page = monitor.get_logs(&LogParams::for_service("billing")).await?;
//! println!("{} records", page.size);
//! monitor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
mod instrument;
pub mod listener;
pub mod messages;
pub mod model;
pub mod monitor;
pub mod pinger;
pub mod query;
pub mod store;
pub mod telemetry;
pub mod tracker;

pub use bus::{BusError, BusMessage, MemoryBus, MessageBus, Subscription};
pub use config::{MonitorConfig, ServiceDefinition, Transport, DEFAULT_REPLY_TOPIC};
pub use error::{HealthError, Result};
pub use gateway::PersistenceGateway;
pub use listener::ResponseListener;
pub use messages::{HeartbeatReply, HeartbeatRequest, ReplyStatus};
pub use model::{
    AttemptId, AvailabilityBucket, HealthCheckRecord, HeartbeatAttempt, LivenessState,
    SendCheckRecord, ServiceStatus,
};
pub use monitor::HeartbeatMonitor;
pub use pinger::Pinger;
pub use query::{AvailabilityParams, CurrentStatus, LogPage, LogParams, QueryEngine};
pub use store::{
    MemoryStatusStore, MemoryTimeSeries, Point, StatusStore, StoreError, TimeSeriesSink,
};
pub use telemetry::MonitorMetrics;
pub use tracker::StatusTracker;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
