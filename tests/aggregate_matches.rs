// tests/aggregate_matches.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use cricket_aggregator::ingest::aggregator::Aggregator;
use cricket_aggregator::ingest::providers::sample_matches::{SampleMatchProvider, SAMPLE_SOURCE};
use cricket_aggregator::ingest::types::{
    CanonicalMatch, FetchWindow, MatchProvider, NormalizeError, Provider,
};
use cricket_aggregator::store::{DocumentStore, Filter, MemoryStore, MATCHES_COLLECTION};

fn now() -> DateTime<Utc> {
    "2024-11-20T08:00:00Z".parse().unwrap()
}

/// Wraps the sample provider and appends records that cannot be normalized.
struct SampleWithJunk;

#[async_trait]
impl Provider for SampleWithJunk {
    type Raw = Value;
    type Output = CanonicalMatch;

    fn name(&self) -> &str {
        SAMPLE_SOURCE
    }

    async fn fetch(&self, window: Option<&FetchWindow>) -> Result<Vec<Value>> {
        let mut v = SampleMatchProvider::new().fetch(window).await?;
        v.push(json!({ "id": "match_999", "title": "No format" }));
        v.push(json!({
            "id": "match_998",
            "title": "Bad clock",
            "team1": "A",
            "team2": "B",
            "format": "ODI",
            "series": "Tri-series",
            "start_time": "whenever",
            "venue": "Somewhere",
            "country": "Nowhere",
            "status": "upcoming",
            "link": "https://example.test"
        }));
        Ok(v)
    }

    fn normalize(&self, raw: Value, now: DateTime<Utc>) -> Result<CanonicalMatch, NormalizeError> {
        SampleMatchProvider::new().normalize(raw, now)
    }
}

#[tokio::test]
async fn sample_provider_run_persists_both_fixtures() {
    let store = Arc::new(MemoryStore::new());
    let providers: Vec<MatchProvider> = vec![Box::new(SampleMatchProvider::new())];
    let agg = Aggregator::new(providers, store.clone());

    let report = agg.run_at(now()).await;
    assert_eq!(report.job, "matches");
    assert_eq!(report.fetched, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(report.upserted, 2);
    assert_eq!(report.purged, 0);

    let key = Filter::new()
        .eq("source", SAMPLE_SOURCE)
        .eq("source_match_id", "match_002");
    let live = store
        .find_one(MATCHES_COLLECTION, &key)
        .await
        .unwrap()
        .expect("match_002 stored");
    assert_eq!(live["id"], "sample_provider_match_002");
    assert_eq!(live["status"], "live");
    assert_eq!(live["format"], "T20I");
    assert_eq!(live["level"], "International");
    assert_eq!(live["score_summary"], "England 165/4 (15.2 overs)");
    assert_eq!(live["teams"]["team2"], "New Zealand");
    let start: DateTime<Utc> = live["start_time_utc"].as_str().unwrap().parse().unwrap();
    assert_eq!(start, now() + Duration::hours(6));
}

#[tokio::test]
async fn rerun_updates_in_place() {
    let store = Arc::new(MemoryStore::new());
    let providers: Vec<MatchProvider> = vec![Box::new(SampleMatchProvider::new())];
    let agg = Aggregator::new(providers, store.clone());

    agg.run_at(now()).await;
    let later = now() + Duration::hours(2);
    let report = agg.run_at(later).await;
    assert_eq!(report.upserted, 2);
    assert_eq!(store.len(MATCHES_COLLECTION), 2);

    for doc in store.documents(MATCHES_COLLECTION) {
        let updated: DateTime<Utc> = doc["last_updated"].as_str().unwrap().parse().unwrap();
        assert_eq!(updated, later);
    }
}

#[tokio::test]
async fn malformed_records_are_excluded() {
    let store = Arc::new(MemoryStore::new());
    let providers: Vec<MatchProvider> = vec![Box::new(SampleWithJunk)];
    let agg = Aggregator::new(providers, store.clone());

    let report = agg.run_at(now()).await;
    assert_eq!(report.fetched, 4);
    assert_eq!(report.normalize_failures, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(store.len(MATCHES_COLLECTION), 2);
}

#[tokio::test]
async fn empty_registry_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    let agg = Aggregator::new(Vec::<MatchProvider>::new(), store.clone());
    let report = agg.run_at(now()).await;
    assert_eq!(report.processed, 0);
    assert!(store.is_empty(MATCHES_COLLECTION));
    assert!(agg.provider_names().is_empty());
}
