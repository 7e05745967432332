use anyhow::Result;
use log::info;
use ::metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, time::Duration};

// Metric names
pub const METRIC_REQUESTS: &str = "bot_requests_total";
pub const METRIC_REJECTED: &str = "bot_requests_rejected_total";
pub const METRIC_FETCHES: &str = "bot_fetches_total";
pub const METRIC_DEADLINE_EXCEEDED: &str = "bot_request_deadline_exceeded_total";
pub const METRIC_SEND_FAILURES: &str = "bot_send_failures_total";
pub const METRIC_REQUEST_DURATION: &str = "bot_request_duration_seconds";

/// Which upstream a fetch outcome belongs to.
#[derive(Debug, Clone, Copy)]
pub enum Source {
    Holders,
    Market,
    Visual,
}

impl Source {
    fn as_str(&self) -> &'static str {
        match self {
            Source::Holders => "holders",
            Source::Market => "market",
            Source::Visual => "visual",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Found,
    Absent,
    Failed,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Found => "found",
            Outcome::Absent => "absent",
            Outcome::Failed => "failed",
        }
    }
}

pub fn record_fetch(source: Source, outcome: Outcome) {
    counter!(METRIC_FETCHES, 1, "source" => source.as_str(), "outcome" => outcome.as_str());
}

pub fn record_request() {
    counter!(METRIC_REQUESTS, 1);
}

pub fn record_rejected() {
    counter!(METRIC_REJECTED, 1);
}

pub fn record_deadline_exceeded() {
    counter!(METRIC_DEADLINE_EXCEEDED, 1);
}

pub fn record_send_failure() {
    counter!(METRIC_SEND_FAILURES, 1);
}

pub fn record_request_duration(elapsed: Duration) {
    histogram!(METRIC_REQUEST_DURATION, elapsed.as_secs_f64());
}

/// Serves `/metrics` on `0.0.0.0:{port}`. Needs a running Tokio runtime.
pub fn install_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}
