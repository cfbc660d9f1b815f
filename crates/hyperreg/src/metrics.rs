//! Prometheus metrics for the registry process.
//!
//! # Metric Groups
//!
//! - **Registry**: entries registered/active, query counts and latency
//! - **Bus**: events published, deliveries, subscriber count
//! - **Propagation**: sessions started, by mode and outcome
//! - **Hot-swap**: transitions and rollbacks
//! - **Resilience**: circuit breaker trips
//! - **Cache**: hit/miss counts
//!
//! # Usage
//!
//! ```rust,ignore
//! use hyperreg::metrics::RegistryMetrics;
//!
//! let metrics = RegistryMetrics::new()?;
//! metrics.record_query(0.004);
//! metrics.record_cache_hit();
//! ```

#[cfg(feature = "metrics")]
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Query duration buckets (in seconds)
#[cfg(feature = "metrics")]
const QUERY_LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Propagation session duration buckets (in seconds)
#[cfg(feature = "metrics")]
const PROPAGATION_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct RegistryMetrics {
    pub registry: Registry,

    // ============ Registry Metrics ============
    /// Entries registered (by category)
    pub entries_registered_total: IntCounterVec,
    /// Entries currently active
    pub entries_active: IntGauge,
    /// Queries served (get/search/list)
    pub queries_total: IntCounterVec,
    /// Query duration in seconds
    pub query_duration_seconds: Histogram,

    // ============ Bus Metrics ============
    /// Events published to the bus, by category
    pub bus_events_published_total: IntCounterVec,
    /// Events delivered to subscribers
    pub bus_deliveries_total: IntCounter,
    /// Deliveries dropped because a subscriber's inbox was full
    pub bus_deliveries_dropped_total: IntCounter,
    /// Currently connected subscribers (includes stream connections)
    pub bus_subscribers: IntGauge,

    // ============ Propagation Metrics ============
    /// Propagation sessions started, by mode
    pub propagation_sessions_total: IntCounterVec,
    /// Propagation sessions by terminal status
    pub propagation_outcomes_total: IntCounterVec,
    /// Propagation session duration in seconds
    pub propagation_duration_seconds: Histogram,

    // ============ Hot-swap Metrics ============
    /// Hot-swap transitions attempted
    pub hotswap_transitions_total: IntCounter,
    /// Hot-swap transitions rolled back
    pub hotswap_rollbacks_total: IntCounter,

    // ============ Resilience Metrics ============
    /// Circuit breaker trips, by target
    pub circuit_breaker_trips_total: IntCounterVec,

    // ============ Cache Metrics ============
    /// Cache hits
    pub cache_hits_total: IntCounter,
    /// Cache misses
    pub cache_misses_total: IntCounter,

    // ============ Streaming Metrics ============
    /// Active encrypted stream connections
    pub stream_connections: IntGauge,
    /// Stream frames encrypted and sent
    pub stream_frames_total: IntCounter,
}

#[cfg(feature = "metrics")]
impl RegistryMetrics {
    /// Create a new `RegistryMetrics` with a fresh Prometheus registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let entries_registered_total = IntCounterVec::new(
            Opts::new("entries_registered_total", "Entries registered, by category")
                .namespace("hyperreg"),
            &["category"],
        )?;

        let entries_active = IntGauge::new(
            "hyperreg_entries_active",
            "Entries currently in Active status",
        )?;

        let queries_total = IntCounterVec::new(
            Opts::new("queries_total", "Queries served, by kind").namespace("hyperreg"),
            &["kind"],
        )?;

        let query_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("query_duration_seconds", "Query duration in seconds")
                .namespace("hyperreg")
                .buckets(QUERY_LATENCY_BUCKETS.to_vec()),
        )?;

        let bus_events_published_total = IntCounterVec::new(
            Opts::new("bus_events_published_total", "Events published to the bus")
                .namespace("hyperreg"),
            &["category"],
        )?;

        let bus_deliveries_total = IntCounter::new(
            "hyperreg_bus_deliveries_total",
            "Events delivered to subscribers",
        )?;

        let bus_deliveries_dropped_total = IntCounter::new(
            "hyperreg_bus_deliveries_dropped_total",
            "Deliveries dropped due to a full subscriber inbox",
        )?;

        let bus_subscribers = IntGauge::new(
            "hyperreg_bus_subscribers",
            "Currently connected bus subscribers",
        )?;

        let propagation_sessions_total = IntCounterVec::new(
            Opts::new("propagation_sessions_total", "Propagation sessions started, by mode")
                .namespace("hyperreg"),
            &["mode"],
        )?;

        let propagation_outcomes_total = IntCounterVec::new(
            Opts::new(
                "propagation_outcomes_total",
                "Propagation sessions by terminal status",
            )
            .namespace("hyperreg"),
            &["status"],
        )?;

        let propagation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "propagation_duration_seconds",
                "Propagation session duration in seconds",
            )
            .namespace("hyperreg")
            .buckets(PROPAGATION_LATENCY_BUCKETS.to_vec()),
        )?;

        let hotswap_transitions_total = IntCounter::new(
            "hyperreg_hotswap_transitions_total",
            "Hot-swap transitions attempted",
        )?;

        let hotswap_rollbacks_total = IntCounter::new(
            "hyperreg_hotswap_rollbacks_total",
            "Hot-swap transitions rolled back",
        )?;

        let circuit_breaker_trips_total = IntCounterVec::new(
            Opts::new("circuit_breaker_trips_total", "Circuit breaker trips, by target")
                .namespace("hyperreg"),
            &["target"],
        )?;

        let cache_hits_total =
            IntCounter::new("hyperreg_cache_hits_total", "Registry cache hits")?;
        let cache_misses_total =
            IntCounter::new("hyperreg_cache_misses_total", "Registry cache misses")?;

        let stream_connections = IntGauge::new(
            "hyperreg_stream_connections",
            "Active encrypted stream connections",
        )?;

        let stream_frames_total = IntCounter::new(
            "hyperreg_stream_frames_total",
            "Stream frames encrypted and sent",
        )?;

        registry.register(Box::new(entries_registered_total.clone()))?;
        registry.register(Box::new(entries_active.clone()))?;
        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(query_duration_seconds.clone()))?;

        registry.register(Box::new(bus_events_published_total.clone()))?;
        registry.register(Box::new(bus_deliveries_total.clone()))?;
        registry.register(Box::new(bus_deliveries_dropped_total.clone()))?;
        registry.register(Box::new(bus_subscribers.clone()))?;

        registry.register(Box::new(propagation_sessions_total.clone()))?;
        registry.register(Box::new(propagation_outcomes_total.clone()))?;
        registry.register(Box::new(propagation_duration_seconds.clone()))?;

        registry.register(Box::new(hotswap_transitions_total.clone()))?;
        registry.register(Box::new(hotswap_rollbacks_total.clone()))?;

        registry.register(Box::new(circuit_breaker_trips_total.clone()))?;

        registry.register(Box::new(cache_hits_total.clone()))?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        registry.register(Box::new(stream_connections.clone()))?;
        registry.register(Box::new(stream_frames_total.clone()))?;

        Ok(Self {
            registry,
            entries_registered_total,
            entries_active,
            queries_total,
            query_duration_seconds,
            bus_events_published_total,
            bus_deliveries_total,
            bus_deliveries_dropped_total,
            bus_subscribers,
            propagation_sessions_total,
            propagation_outcomes_total,
            propagation_duration_seconds,
            hotswap_transitions_total,
            hotswap_rollbacks_total,
            circuit_breaker_trips_total,
            cache_hits_total,
            cache_misses_total,
            stream_connections,
            stream_frames_total,
        })
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families)
    }

    pub fn record_entry_registered(&self, category: &str) {
        self.entries_registered_total
            .with_label_values(&[category])
            .inc();
    }

    pub fn record_query(&self, kind: &str, duration_secs: f64) {
        self.queries_total.with_label_values(&[kind]).inc();
        self.query_duration_seconds.observe(duration_secs);
    }

    pub fn record_bus_publish(&self, category: &str) {
        self.bus_events_published_total
            .with_label_values(&[category])
            .inc();
    }

    pub fn record_bus_delivery(&self, dropped: bool) {
        if dropped {
            self.bus_deliveries_dropped_total.inc();
        } else {
            self.bus_deliveries_total.inc();
        }
    }

    pub fn record_propagation_session(&self, mode: &str) {
        self.propagation_sessions_total.with_label_values(&[mode]).inc();
    }

    pub fn record_propagation_outcome(&self, status: &str, duration_secs: f64) {
        self.propagation_outcomes_total
            .with_label_values(&[status])
            .inc();
        self.propagation_duration_seconds.observe(duration_secs);
    }

    pub fn record_hotswap_attempt(&self) {
        self.hotswap_transitions_total.inc();
    }

    pub fn record_hotswap_rollback(&self) {
        self.hotswap_rollbacks_total.inc();
    }

    pub fn record_circuit_trip(&self, target: &str) {
        self.circuit_breaker_trips_total
            .with_label_values(&[target])
            .inc();
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses_total.inc();
    }

    pub fn set_stream_connections(&self, count: i64) {
        self.stream_connections.set(count);
    }

    pub fn record_stream_frame(&self) {
        self.stream_frames_total.inc();
    }

    pub fn set_bus_subscribers(&self, count: i64) {
        self.bus_subscribers.set(count);
    }

    pub fn set_entries_active(&self, count: i64) {
        self.entries_active.set(count);
    }
}

/// Timer guard that records elapsed time into a histogram on drop or `stop()`.
#[cfg(feature = "metrics")]
pub struct MetricTimer {
    start: std::time::Instant,
    histogram: Histogram,
}

#[cfg(feature = "metrics")]
impl MetricTimer {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            start: std::time::Instant::now(),
            histogram,
        }
    }

    /// Stop the timer and record the duration, returning the elapsed seconds.
    pub fn stop(self) -> f64 {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
        duration
    }
}

#[cfg(test)]
#[cfg(feature = "metrics")]
mod tests {
    use super::*;

    #[test]
    fn metrics_creation_and_encode() {
        let metrics = RegistryMetrics::new().expect("metrics should construct");

        metrics.record_entry_registered("service");
        metrics.record_query("search", 0.003);
        metrics.record_bus_publish("service");
        metrics.record_bus_delivery(false);
        metrics.record_propagation_session("cascade");
        metrics.record_propagation_outcome("committed", 0.2);
        metrics.record_hotswap_attempt();
        metrics.record_cache_hit();
        metrics.record_cache_miss();

        let output = metrics.encode().expect("encode should succeed");
        assert!(output.contains("hyperreg_entries_registered_total"));
        assert!(output.contains("hyperreg_queries_total"));
        assert!(output.contains("hyperreg_bus_deliveries_total"));
        assert!(output.contains("hyperreg_propagation_sessions_total"));
    }

    #[test]
    fn hotswap_rollback_increments_independently_of_attempts() {
        let metrics = RegistryMetrics::new().unwrap();
        metrics.record_hotswap_attempt();
        metrics.record_hotswap_attempt();
        metrics.record_hotswap_rollback();

        assert_eq!(metrics.hotswap_transitions_total.get(), 2);
        assert_eq!(metrics.hotswap_rollbacks_total.get(), 1);
    }

    #[test]
    fn circuit_trip_labels_by_target() {
        let metrics = RegistryMetrics::new().unwrap();
        metrics.record_circuit_trip("storage");
        metrics.record_circuit_trip("storage");
        metrics.record_circuit_trip("bridge");

        let output = metrics.encode().unwrap();
        assert!(output.contains("target=\"storage\""));
        assert!(output.contains("target=\"bridge\""));
    }

    #[test]
    fn gauges_reflect_last_set_value() {
        let metrics = RegistryMetrics::new().unwrap();
        metrics.set_stream_connections(5);
        metrics.set_bus_subscribers(3);
        metrics.set_entries_active(42);

        assert_eq!(metrics.stream_connections.get(), 5);
        assert_eq!(metrics.bus_subscribers.get(), 3);
        assert_eq!(metrics.entries_active.get(), 42);
    }
}
