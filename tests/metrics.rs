// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use cricket_aggregator::ingest::aggregator::Aggregator;
use cricket_aggregator::ingest::providers::sample_matches::SampleMatchProvider;
use cricket_aggregator::ingest::types::MatchProvider;
use cricket_aggregator::metrics::Metrics;
use cricket_aggregator::store::MemoryStore;

// One recorder per process, so everything lives in a single test.
#[tokio::test]
async fn metrics_endpoint_exposes_aggregation_series() {
    let metrics = Metrics::init().expect("install recorder");
    assert!(Metrics::init().is_err(), "recorder is process-global");

    let providers: Vec<MatchProvider> = vec![Box::new(SampleMatchProvider::new())];
    let agg = Aggregator::new(providers, Arc::new(MemoryStore::new()));
    agg.run().await;

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "aggregate_runs_total",
        "aggregate_fetched_total",
        "aggregate_upserted_total",
        "aggregate_fetch_ms_bucket",
        "aggregate_last_run_ts",
    ] {
        assert!(text.contains(needle), "missing series {needle} in:\n{text}");
    }
    assert!(text.contains(r#"job="matches""#));
}
