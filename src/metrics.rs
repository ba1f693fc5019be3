//! Prometheus metrics exposed alongside the HTTP ingress.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

pub struct BrokerMetrics {
    registry: Registry,
    pub submissions_total: IntCounter,
    pub sets_inflight: IntGauge,
    pub dispatch_duration_seconds: Histogram,
    pub collect_duration_seconds: Histogram,
    pub janitor_reaped_total: IntCounter,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let submissions_total = IntCounter::with_opts(Opts::new(
            "broker_submissions_total",
            "Total number of submissions accepted",
        ))
        .expect("valid metric opts");

        let sets_inflight = IntGauge::with_opts(Opts::new(
            "broker_sets_inflight",
            "Number of set submits currently dispatched to the cluster",
        ))
        .expect("valid metric opts");

        let dispatch_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "broker_dispatch_duration_seconds",
            "Time spent dispatching a set submit to the cluster",
        ))
        .expect("valid metric opts");

        let collect_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "broker_collect_duration_seconds",
            "Time spent collecting results for a set submit",
        ))
        .expect("valid metric opts");

        let janitor_reaped_total = IntCounter::with_opts(Opts::new(
            "broker_janitor_reaped_total",
            "Total number of task submits trashed by the janitor",
        ))
        .expect("valid metric opts");

        registry
            .register(Box::new(submissions_total.clone()))
            .expect("register submissions_total");
        registry
            .register(Box::new(sets_inflight.clone()))
            .expect("register sets_inflight");
        registry
            .register(Box::new(dispatch_duration_seconds.clone()))
            .expect("register dispatch_duration_seconds");
        registry
            .register(Box::new(collect_duration_seconds.clone()))
            .expect("register collect_duration_seconds");
        registry
            .register(Box::new(janitor_reaped_total.clone()))
            .expect("register janitor_reaped_total");

        Self {
            registry,
            submissions_total,
            sets_inflight,
            dispatch_duration_seconds,
            collect_duration_seconds,
            janitor_reaped_total,
        }
    }

    /// Render the current metric state in the Prometheus text exposition
    /// format.
    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buf)
            .expect("metrics encode to valid utf8");
        String::from_utf8(buf).expect("prometheus text encoder emits utf8")
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
