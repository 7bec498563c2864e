//! Query shapes sent to the time-series sink
//!
//! Each shape carries its structured predicate (what the sink executes) and can
//! render itself as InfluxQL for logs and span tags.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::time::Duration;

use crate::model::{HealthCheckRecord, HEALTH_CHECK_MEASUREMENT, SERVICE_NAME_TAG};

/// Conjunction of the optional service and inclusive time bounds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeFilter {
    pub service_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeFilter {
    pub fn matches(&self, record: &HealthCheckRecord) -> bool {
        self.service_name
            .as_deref()
            .map_or(true, |name| record.service_name == name)
            && self.from.map_or(true, |from| record.sent_at >= from)
            && self.to.map_or(true, |to| record.sent_at <= to)
    }

    fn where_clause(&self) -> String {
        let mut clauses = Vec::new();
        if let Some(name) = &self.service_name {
            clauses.push(format!("\"{}\"={}", SERVICE_NAME_TAG, quote(name)));
        }
        if let Some(from) = self.from {
            clauses.push(format!("time >= {}", quote(&rfc3339(from))));
        }
        if let Some(to) = self.to {
            clauses.push(format!("time <= {}", quote(&rfc3339(to))));
        }

        if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        }
    }
}

/// Filtered, newest-first, paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub filter: TimeFilter,
    pub limit: u64,
    pub offset: u64,
}

impl LogQuery {
    pub fn to_influxql(&self) -> String {
        format!(
            "SELECT * FROM \"{}\"{} ORDER BY time DESC LIMIT {} OFFSET {}",
            HEALTH_CHECK_MEASUREMENT,
            self.filter.where_clause(),
            self.limit,
            self.offset
        )
    }
}

/// Mean of `running` grouped into fixed-width buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub filter: TimeFilter,
    pub interval: Duration,
    /// Interval as the caller wrote it, e.g. `1h`
    pub interval_text: String,
}

impl AvailabilityQuery {
    pub fn new(filter: TimeFilter, interval: Duration, interval_text: impl Into<String>) -> Self {
        Self {
            filter,
            interval,
            interval_text: interval_text.into(),
        }
    }

    pub fn to_influxql(&self) -> String {
        format!(
            "SELECT mean(\"running\") FROM \"{}\"{} GROUP BY time({}) fill(0)",
            HEALTH_CHECK_MEASUREMENT,
            self.filter.where_clause(),
            self.interval_text
        )
    }
}

/// Start of the epoch-aligned bucket of width `interval` containing `ts`.
pub fn bucket_start(ts: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    let width = i64::try_from(interval.as_millis()).ok().filter(|w| *w > 0)?;
    let millis = ts.timestamp_millis().div_euclid(width) * width;
    Utc.timestamp_millis_opt(millis).single()
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
