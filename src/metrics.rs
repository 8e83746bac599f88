use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::ingest::ensure_metrics_described;

/// Provider fetch latency buckets, in milliseconds. HTTP sources time out
/// at 30s, so the top bucket sits just above that.
const FETCH_MS_BUCKETS: &[f64] = &[
    5.0, 25.0, 100.0, 250.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 31_000.0,
];

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder and register the
    /// aggregation series so they render before the first run.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("aggregate_fetch_ms".to_string()),
                FETCH_MS_BUCKETS,
            )
            .context("prometheus: fetch_ms buckets")?
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
