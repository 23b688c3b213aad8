//! Prometheus metrics for mqtt2http
//!
//! Counts authentication and forward attempts per endpoint and status,
//! topics nobody routes, live sessions and per-topic client activity.
//! Exposed at /metrics by [`MetricsServer`].

use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

mod server;


pub use server::MetricsServer;

/// Status label used when a request never produced an HTTP response
pub const TRANSPORT_FAILURE: &str = "error";

/// All mqtt2http metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Outbound HTTP
    pub authenticate_total: IntCounterVec,
    pub forward_total: IntCounterVec,
    pub no_route_total: IntCounterVec,

    // Sessions
    pub sessions_current: IntGauge,
    pub subscribe_total: IntCounterVec,
    pub publish_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let authenticate_total = IntCounterVec::new(
            Opts::new(
                "mqtt2http_authenticate_total",
                "Credential checks by authorize URL and response code",
            ),
            &["url", "code"],
        )
        .unwrap();

        let forward_total = IntCounterVec::new(
            Opts::new(
                "mqtt2http_forward_total",
                "Forwarded publishes by destination URL and response code",
            ),
            &["url", "code"],
        )
        .unwrap();

        let no_route_total = IntCounterVec::new(
            Opts::new(
                "mqtt2http_no_route_total",
                "Publishes whose topic matched no route",
            ),
            &["topic"],
        )
        .unwrap();

        let sessions_current = IntGauge::with_opts(Opts::new(
            "mqtt2http_sessions_current",
            "Current number of authenticated client sessions",
        ))
        .unwrap();

        let subscribe_total = IntCounterVec::new(
            Opts::new(
                "mqtt2http_subscribe_total",
                "Subscribe requests by topic filter",
            ),
            &["topic"],
        )
        .unwrap();

        let publish_total = IntCounterVec::new(
            Opts::new("mqtt2http_publish_total", "Client publishes by topic"),
            &["topic"],
        )
        .unwrap();

        // Register all metrics
        registry
            .register(Box::new(authenticate_total.clone()))
            .unwrap();
        registry.register(Box::new(forward_total.clone())).unwrap();
        registry.register(Box::new(no_route_total.clone())).unwrap();
        registry
            .register(Box::new(sessions_current.clone()))
            .unwrap();
        registry
            .register(Box::new(subscribe_total.clone()))
            .unwrap();
        registry.register(Box::new(publish_total.clone())).unwrap();

        Metrics {
            registry,
            authenticate_total,
            forward_total,
            no_route_total,
            sessions_current,
            subscribe_total,
            publish_total,
        }
    }

    // Outbound HTTP helpers

    pub fn authenticate_attempt(&self, url: &str, code: &str) {
        self.authenticate_total
            .with_label_values(&[url, code])
            .inc();
    }

    pub fn forward_attempt(&self, url: &str, code: &str) {
        self.forward_total.with_label_values(&[url, code]).inc();
    }

    pub fn no_route(&self, topic: &str) {
        self.no_route_total.with_label_values(&[topic]).inc();
    }

    // Session helpers

    pub fn session_opened(&self) {
        self.sessions_current.inc();
    }

    pub fn session_closed(&self) {
        self.sessions_current.dec();
    }

    pub fn topic_subscribed(&self, topic: &str) {
        self.subscribe_total.with_label_values(&[topic]).inc();
    }

    pub fn topic_published(&self, topic: &str) {
        self.publish_total.with_label_values(&[topic]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>), prometheus::Error> {
        use prometheus::{Encoder, TextEncoder};

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
