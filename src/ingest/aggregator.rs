// src/ingest/aggregator.rs
//! Provider fan-out, dedup and idempotent persistence for one entity kind.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use serde_json::Value;

use crate::ingest::ensure_metrics_described;
use crate::ingest::types::{CanonicalMatch, CanonicalNewsItem, FetchWindow, Provider};
use crate::store::{DocumentStore, Filter, MATCHES_COLLECTION, NEWS_COLLECTION};

/// Forward-looking horizon for match fetches.
pub const MATCH_HORIZON_DAYS: i64 = 7;
/// News older than this (by `published_at`) is purged after every run.
pub const NEWS_RETENTION_DAYS: i64 = 7;

/// Persistence policy of a canonical entity kind.
pub trait Entity: Serialize + Send + Sync + Sized + 'static {
    type Raw: Send + 'static;

    const COLLECTION: &'static str;
    /// Short label used in logs, metrics and reports.
    const KIND: &'static str;
    /// Look up the stored copy before writing and pass it to
    /// [`Entity::carry_forward`].
    const CARRIES_FORWARD: bool = false;

    fn fetch_window(_now: DateTime<Utc>) -> Option<FetchWindow> {
        None
    }

    /// Equality filter on the natural key.
    fn key_filter(&self) -> Filter;

    /// In-batch dedup key; `None` keeps every entity.
    fn dedup_key(&self) -> Option<&str> {
        None
    }

    fn retention_filter(_now: DateTime<Utc>) -> Option<Filter> {
        None
    }

    fn carry_forward(&mut self, _existing: &Value) {}
}

impl Entity for CanonicalMatch {
    type Raw = Value;

    const COLLECTION: &'static str = MATCHES_COLLECTION;
    const KIND: &'static str = "matches";

    fn fetch_window(now: DateTime<Utc>) -> Option<FetchWindow> {
        Some(FetchWindow::forward(now, Duration::days(MATCH_HORIZON_DAYS)))
    }

    fn key_filter(&self) -> Filter {
        Filter::new()
            .eq("source", self.source.as_str())
            .eq("source_match_id", self.source_match_id.as_str())
    }

    // No retention rule for matches: stale fixtures stay until overwritten.
}

impl Entity for CanonicalNewsItem {
    type Raw = crate::ingest::types::FeedEntry;

    const COLLECTION: &'static str = NEWS_COLLECTION;
    const KIND: &'static str = "news";
    const CARRIES_FORWARD: bool = true;

    fn key_filter(&self) -> Filter {
        Filter::new().eq("id", self.id.as_str())
    }

    fn dedup_key(&self) -> Option<&str> {
        Some(&self.url)
    }

    fn retention_filter(now: DateTime<Utc>) -> Option<Filter> {
        Some(Filter::new().before("published_at", now - Duration::days(NEWS_RETENTION_DAYS)))
    }

    /// Keep the first-sighting timestamp across refreshes.
    fn carry_forward(&mut self, existing: &Value) {
        if let Some(created) = existing
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            self.created_at = created.with_timezone(&Utc);
        }
    }
}

/// Outcome of one aggregation run. Failures are counted, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub job: &'static str,
    /// Raw records returned by all providers.
    pub fetched: usize,
    pub provider_failures: usize,
    pub normalize_failures: usize,
    pub duplicates_dropped: usize,
    /// Entities handed to storage after dedup.
    pub processed: usize,
    pub upserted: usize,
    pub upsert_failures: usize,
    pub purged: u64,
}

/// Keep the first entity per dedup key, preserving batch order.
pub fn dedup_first_wins<E: Entity>(batch: Vec<E>) -> (Vec<E>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(batch.len());
    let mut dropped = 0usize;
    for e in batch {
        if let Some(key) = e.dedup_key() {
            if !seen.insert(key.to_string()) {
                dropped += 1;
                continue;
            }
        }
        keep.push(e);
    }
    (keep, dropped)
}

pub struct Aggregator<E: Entity> {
    providers: Vec<Box<dyn Provider<Raw = E::Raw, Output = E>>>,
    store: Arc<dyn DocumentStore>,
}

impl<E: Entity> Aggregator<E> {
    pub fn new(
        providers: Vec<Box<dyn Provider<Raw = E::Raw, Output = E>>>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self { providers, store }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// One full pass with an explicit clock.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunReport {
        ensure_metrics_described();
        let mut report = RunReport {
            job: E::KIND,
            ..RunReport::default()
        };
        let window = E::fetch_window(now);

        // Providers run sequentially, in registry order.
        let mut batch: Vec<E> = Vec::new();
        for p in &self.providers {
            tracing::info!(target: "aggregate", job = E::KIND, provider = p.name(), "fetching");
            let t0 = std::time::Instant::now();
            let raws = match p.fetch(window.as_ref()).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(target: "aggregate", error = ?e, provider = p.name(), "provider error");
                    counter!("aggregate_provider_errors_total", "job" => E::KIND).increment(1);
                    report.provider_failures += 1;
                    continue;
                }
            };
            histogram!("aggregate_fetch_ms", "job" => E::KIND)
                .record(t0.elapsed().as_secs_f64() * 1_000.0);
            report.fetched += raws.len();

            for raw in raws {
                match p.normalize(raw, now) {
                    Ok(entity) => batch.push(entity),
                    Err(e) => {
                        tracing::warn!(target: "aggregate", error = %e, provider = p.name(), "dropping record");
                        report.normalize_failures += 1;
                    }
                }
            }
        }

        let (batch, dropped) = dedup_first_wins(batch);
        report.duplicates_dropped = dropped;
        report.processed = batch.len();

        tracing::info!(target: "aggregate", job = E::KIND, count = batch.len(), "upserting");
        for mut entity in batch {
            let key = entity.key_filter();
            if E::CARRIES_FORWARD {
                match self.store.find_one(E::COLLECTION, &key).await {
                    Ok(Some(existing)) => entity.carry_forward(&existing),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(target: "aggregate", error = ?e, key = ?key, "lookup failed");
                    }
                }
            }
            let doc = match serde_json::to_value(&entity) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(target: "aggregate", error = %e, key = ?key, "encode failed");
                    report.upsert_failures += 1;
                    continue;
                }
            };
            match self.store.upsert(E::COLLECTION, &key, doc).await {
                Ok(()) => report.upserted += 1,
                Err(e) => {
                    tracing::warn!(target: "aggregate", error = ?e, key = ?key, "upsert failed");
                    report.upsert_failures += 1;
                }
            }
        }

        if let Some(filter) = E::retention_filter(now) {
            match self.store.delete_many(E::COLLECTION, &filter).await {
                Ok(n) => report.purged = n,
                Err(e) => {
                    tracing::warn!(target: "aggregate", error = ?e, job = E::KIND, "retention cleanup failed");
                }
            }
        }

        // Telemetry
        counter!("aggregate_runs_total", "job" => E::KIND).increment(1);
        counter!("aggregate_fetched_total", "job" => E::KIND).increment(report.fetched as u64);
        counter!("aggregate_normalize_errors_total", "job" => E::KIND)
            .increment(report.normalize_failures as u64);
        counter!("aggregate_dedup_total", "job" => E::KIND)
            .increment(report.duplicates_dropped as u64);
        counter!("aggregate_upserted_total", "job" => E::KIND).increment(report.upserted as u64);
        counter!("aggregate_upsert_errors_total", "job" => E::KIND)
            .increment(report.upsert_failures as u64);
        counter!("aggregate_purged_total", "job" => E::KIND).increment(report.purged);
        gauge!("aggregate_last_run_ts", "job" => E::KIND).set(now.timestamp() as f64);

        tracing::info!(
            target: "aggregate",
            job = E::KIND,
            fetched = report.fetched,
            processed = report.processed,
            upserted = report.upserted,
            failed = report.upsert_failures,
            purged = report.purged,
            "aggregation completed"
        );
        report
    }
}

/// Object-safe view of an aggregator, as driven by the scheduler.
#[async_trait::async_trait]
pub trait AggregationJob: Send + Sync {
    fn kind(&self) -> &'static str;
    async fn run(&self) -> RunReport;
}

#[async_trait::async_trait]
impl<E: Entity> AggregationJob for Aggregator<E> {
    fn kind(&self) -> &'static str {
        E::KIND
    }

    async fn run(&self) -> RunReport {
        Aggregator::run(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn news(url: &str, title: &str) -> CanonicalNewsItem {
        let now = Utc::now();
        CanonicalNewsItem {
            id: crate::ingest::content_hash(url),
            title: title.into(),
            summary: String::new(),
            source: "t".into(),
            url: url.into(),
            tags: vec![],
            is_record_breaking: false,
            region: "global".into(),
            published_at: now,
            score: 50.0,
            image_url: None,
            created_at: now,
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let batch = vec![
            news("https://x/1", "first"),
            news("https://x/2", "other"),
            news("https://x/1", "second"),
        ];
        let (kept, dropped) = dedup_first_wins(batch);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].title, "first");
    }

    #[test]
    fn carry_forward_restores_created_at() {
        let mut item = news("https://x/1", "t");
        let earlier = item.created_at - Duration::days(2);
        let existing = serde_json::json!({ "created_at": earlier.to_rfc3339() });
        item.carry_forward(&existing);
        assert_eq!(item.created_at, earlier);
    }

    #[test]
    fn match_window_spans_seven_days() {
        let now = Utc::now();
        let w = <CanonicalMatch as Entity>::fetch_window(now).unwrap();
        assert_eq!(w.end - w.start, Duration::days(7));
        assert!(<CanonicalNewsItem as Entity>::fetch_window(now).is_none());
    }
}
