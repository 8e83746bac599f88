// src/ingest/mod.rs
pub mod aggregator;
pub mod classify;
pub mod config;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::ingest::aggregator::Aggregator;
use crate::ingest::config::AggregatorConfig;
use crate::ingest::scheduler::Scheduler;
use crate::store::DocumentStore;

/// Summaries are capped at this many characters after cleaning.
pub const SUMMARY_MAX_CHARS: usize = 500;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregate_runs_total", "Completed aggregation runs.");
        describe_counter!(
            "aggregate_fetched_total",
            "Raw records returned by providers."
        );
        describe_counter!(
            "aggregate_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_counter!(
            "aggregate_http_errors_total",
            "Provider HTTP request failures."
        );
        describe_counter!(
            "aggregate_normalize_errors_total",
            "Raw records dropped by normalization."
        );
        describe_counter!(
            "aggregate_dedup_total",
            "Entities dropped as in-batch duplicates."
        );
        describe_counter!("aggregate_upserted_total", "Entities written to storage.");
        describe_counter!(
            "aggregate_upsert_errors_total",
            "Entities that failed to persist."
        );
        describe_counter!(
            "aggregate_purged_total",
            "Entities removed by the retention policy."
        );
        describe_counter!(
            "aggregate_skipped_overlap_total",
            "Scheduled firings skipped because the previous run was still active."
        );
        describe_counter!(
            "aggregate_run_panics_total",
            "Scheduled runs that panicked instead of returning a report."
        );
        describe_histogram!("aggregate_fetch_ms", "Provider fetch time in milliseconds.");
        describe_gauge!(
            "aggregate_last_run_ts",
            "Unix ts when an aggregation run last finished."
        );
    });
}

/// Clean feed text: decode entities, strip tags, fold quotes and whitespace,
/// then cap the length at `max_chars` characters.
pub fn clean_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize curly quotes and guillemets to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

/// Permissive timestamp parser for upstream payloads. Accepts RFC 2822,
/// RFC 3339 and a few offset-less layouts (read as UTC).
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Hex SHA-256 of `text`; stable identity for URL-keyed records.
pub fn content_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;

    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Build both aggregators from config and wire them into a stopped scheduler.
pub fn build_scheduler(
    cfg: &AggregatorConfig,
    store: Arc<dyn DocumentStore>,
) -> Result<Arc<Scheduler>> {
    let matches = Aggregator::new(providers::match_providers(cfg)?, Arc::clone(&store));
    let news = Aggregator::new(providers::news_providers(cfg)?, store);
    let scheduler = Scheduler::new(
        Arc::new(matches),
        Arc::new(news),
        cfg.schedule.match_slots()?,
        cfg.schedule.news_slots()?,
    );
    Ok(Arc::new(scheduler))
}
