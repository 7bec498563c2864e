//! Prometheus metrics for the heartbeat monitor
//!
//! - `heartbeat_pings_sent_total` (counter) - published heartbeat requests by service
//! - `heartbeat_publish_failures_total` (counter) - failed publishes by service
//! - `heartbeat_replies_total` (counter) - correlated replies by service and result
//! - `heartbeat_timeouts_total` (counter) - attempts resolved as timeouts by service
//! - `heartbeat_stale_replies_total` (counter) - replies for superseded attempts
//! - `heartbeat_malformed_messages_total` (counter) - dropped unparsable payloads
//! - `heartbeat_unknown_service_replies_total` (counter) - replies naming no configured service
//! - `heartbeat_degraded_writes_total` (counter) - failed persistence writes by sink
//! - `heartbeat_round_trip_seconds` (histogram) - reply latency by service
//! - `heartbeat_outstanding_attempts` (gauge) - attempts awaiting a reply

use prometheus::{Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "heartbeat";

/// Sink label for status store writes
pub const STATUS_SINK: &str = "status_store";

/// Sink label for time-series writes
pub const TIME_SERIES_SINK: &str = "time_series";

/// Monitor metrics, registered in a caller-provided registry
#[derive(Clone)]
pub struct MonitorMetrics {
    pings_sent_total: CounterVec,
    publish_failures_total: CounterVec,
    replies_total: CounterVec,
    timeouts_total: CounterVec,
    stale_replies_total: Counter,
    malformed_messages_total: Counter,
    unknown_service_replies_total: Counter,
    degraded_writes_total: CounterVec,
    round_trip_seconds: HistogramVec,
    outstanding_attempts: Gauge,
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorMetrics").finish_non_exhaustive()
    }
}

impl MonitorMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let pings_sent_total = CounterVec::new(
            Opts::new("pings_sent_total", "Heartbeat requests published").namespace(NAMESPACE),
            &["service"],
        )?;

        let publish_failures_total = CounterVec::new(
            Opts::new(
                "publish_failures_total",
                "Heartbeat requests that could not be published",
            )
            .namespace(NAMESPACE),
            &["service"],
        )?;

        let replies_total = CounterVec::new(
            Opts::new("replies_total", "Replies correlated to an outstanding attempt")
                .namespace(NAMESPACE),
            &["service", "result"],
        )?;

        let timeouts_total = CounterVec::new(
            Opts::new(
                "timeouts_total",
                "Attempts still outstanding at the next tick",
            )
            .namespace(NAMESPACE),
            &["service"],
        )?;

        let stale_replies_total = Counter::with_opts(
            Opts::new("stale_replies_total", "Replies for an attempt no longer outstanding")
                .namespace(NAMESPACE),
        )?;

        let malformed_messages_total = Counter::with_opts(
            Opts::new(
                "malformed_messages_total",
                "Inbound payloads dropped as malformed",
            )
            .namespace(NAMESPACE),
        )?;

        // Unlabelled: the name comes from the payload
        let unknown_service_replies_total = Counter::with_opts(
            Opts::new(
                "unknown_service_replies_total",
                "Replies naming a service that is not configured",
            )
            .namespace(NAMESPACE),
        )?;

        let degraded_writes_total = CounterVec::new(
            Opts::new("degraded_writes_total", "Persistence writes that failed")
                .namespace(NAMESPACE),
            &["sink"],
        )?;

        let round_trip_seconds = HistogramVec::new(
            HistogramOpts::new("round_trip_seconds", "Heartbeat round trip in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["service"],
        )?;

        let outstanding_attempts = Gauge::with_opts(
            Opts::new("outstanding_attempts", "Attempts awaiting a reply").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(pings_sent_total.clone()))?;
        registry.register(Box::new(publish_failures_total.clone()))?;
        registry.register(Box::new(replies_total.clone()))?;
        registry.register(Box::new(timeouts_total.clone()))?;
        registry.register(Box::new(stale_replies_total.clone()))?;
        registry.register(Box::new(malformed_messages_total.clone()))?;
        registry.register(Box::new(unknown_service_replies_total.clone()))?;
        registry.register(Box::new(degraded_writes_total.clone()))?;
        registry.register(Box::new(round_trip_seconds.clone()))?;
        registry.register(Box::new(outstanding_attempts.clone()))?;

        Ok(Self {
            pings_sent_total,
            publish_failures_total,
            replies_total,
            timeouts_total,
            stale_replies_total,
            malformed_messages_total,
            unknown_service_replies_total,
            degraded_writes_total,
            round_trip_seconds,
            outstanding_attempts,
        })
    }

    /// Metrics bound to a private registry, for components built in isolation
    pub fn unregistered() -> Self {
        Self::new(&Registry::new()).unwrap_or_else(|_| unreachable!("fresh registry"))
    }

    pub fn record_ping(&self, service: &str) {
        self.pings_sent_total.with_label_values(&[service]).inc();
    }

    pub fn record_publish_failure(&self, service: &str) {
        self.publish_failures_total.with_label_values(&[service]).inc();
    }

    /// Record a correlated reply and its round trip
    pub fn record_reply(&self, service: &str, running: bool, latency_secs: Option<f64>) {
        let result = if running { "healthy" } else { "unhealthy" };
        self.replies_total
            .with_label_values(&[service, result])
            .inc();
        if let Some(latency) = latency_secs {
            self.round_trip_seconds
                .with_label_values(&[service])
                .observe(latency.max(0.0));
        }
    }

    pub fn record_timeout(&self, service: &str) {
        self.timeouts_total.with_label_values(&[service]).inc();
    }

    pub fn record_stale_reply(&self) {
        self.stale_replies_total.inc();
    }

    pub fn record_malformed(&self) {
        self.malformed_messages_total.inc();
    }

    pub fn record_unknown_service(&self) {
        self.unknown_service_replies_total.inc();
    }

    pub fn record_degraded_write(&self, sink: &str) {
        self.degraded_writes_total.with_label_values(&[sink]).inc();
    }

    pub fn inc_outstanding(&self) {
        self.outstanding_attempts.inc();
    }

    pub fn dec_outstanding(&self) {
        self.outstanding_attempts.dec();
    }

    pub fn outstanding(&self) -> f64 {
        self.outstanding_attempts.get()
    }

    pub fn degraded_writes(&self, sink: &str) -> f64 {
        self.degraded_writes_total.with_label_values(&[sink]).get()
    }

    pub fn timeouts(&self, service: &str) -> f64 {
        self.timeouts_total.with_label_values(&[service]).get()
    }

    pub fn malformed_messages(&self) -> f64 {
        self.malformed_messages_total.get()
    }

    pub fn unknown_service_replies(&self) -> f64 {
        self.unknown_service_replies_total.get()
    }
}

/// Encode every metric in `registry` in the Prometheus text format
pub fn encode_text(registry: &Registry) -> prometheus::Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reply() {
        let metrics = MonitorMetrics::unregistered();
        metrics.record_reply("alpha", true, Some(0.2));
        metrics.record_reply("alpha", false, Some(0.4));

        assert_eq!(
            metrics
                .replies_total
                .with_label_values(&["alpha", "healthy"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics
                .round_trip_seconds
                .with_label_values(&["alpha"])
                .get_sample_count(),
            2
        );
    }

    #[test]
    fn test_outstanding_gauge() {
        let metrics = MonitorMetrics::unregistered();
        metrics.inc_outstanding();
        metrics.inc_outstanding();
        metrics.dec_outstanding();
        assert_eq!(metrics.outstanding(), 1.0);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        MonitorMetrics::new(&registry).unwrap();
        assert!(MonitorMetrics::new(&registry).is_err());
    }

    #[test]
    fn test_encode_text() {
        let registry = Registry::new();
        let metrics = MonitorMetrics::new(&registry).unwrap();
        metrics.record_ping("alpha");
        metrics.record_degraded_write(TIME_SERIES_SINK);

        let text = encode_text(&registry).unwrap();
        assert!(text.contains("heartbeat_pings_sent_total{service=\"alpha\"} 1"));
        assert!(text.contains("heartbeat_degraded_writes_total{sink=\"time_series\"} 1"));
    }
}
