// src/ingest/providers/mod.rs
pub mod cricket_data;
pub mod rss_news;
pub mod sample_matches;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::ingest::config::AggregatorConfig;
use crate::ingest::types::{MatchProvider, NewsProvider, NormalizeError};

use cricket_data::CricketDataProvider;
use rss_news::RssNewsProvider;
use sample_matches::SampleMatchProvider;

/// Match provider registry, in the order results are persisted.
pub fn match_providers(cfg: &AggregatorConfig) -> Result<Vec<MatchProvider>> {
    let mut out: Vec<MatchProvider> = Vec::new();
    if cfg.sample_matches {
        out.push(Box::new(SampleMatchProvider::new()));
    }
    if let Some(cd) = &cfg.cricket_data {
        let p = CricketDataProvider::from_url(&cd.base_url, cd.timeout_secs)
            .context("building cricketdata provider")?;
        out.push(Box::new(p));
    }
    Ok(out)
}

/// One RSS/Atom provider per configured feed.
pub fn news_providers(cfg: &AggregatorConfig) -> Result<Vec<NewsProvider>> {
    cfg.news_feeds
        .iter()
        .map(|f| {
            let p = RssNewsProvider::from_url(&f.name, &f.url, cfg.news_timeout_secs)
                .with_context(|| format!("building feed provider {}", f.name))?;
            Ok(Box::new(p) as NewsProvider)
        })
        .collect()
}

// --- helpers for JSON-shaped raw match records ---

pub(crate) fn req_str<'a>(raw: &'a Value, field: &'static str) -> Result<&'a str, NormalizeError> {
    raw.get(field)
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingField(field))
}

pub(crate) fn opt_str(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn opt_f64(raw: &Value, field: &str) -> Option<f64> {
    raw.get(field).and_then(Value::as_f64)
}

/// Upstream ids arrive as strings or numbers.
pub(crate) fn id_str(raw: &Value, field: &'static str) -> Result<String, NormalizeError> {
    match raw.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) if !other.is_null() => Err(NormalizeError::InvalidField {
            field,
            value: other.to_string(),
        }),
        _ => Err(NormalizeError::MissingField(field)),
    }
}
