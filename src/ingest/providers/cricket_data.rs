// src/ingest/providers/cricket_data.rs
//! HTTP JSON match source (`GET {base}/matches?from=..&to=..`).
//!
//! Upstream payloads are loose, so normalization fills gaps with defaults
//! and only rejects records without an id or a usable start time.

use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;

use super::{id_str, opt_f64, opt_str, req_str};
use crate::ingest::classify::determine_level;
use crate::ingest::parse_instant;
use crate::ingest::types::{
    CanonicalMatch, FetchWindow, MatchFormat, MatchStatus, NormalizeError, Provider, Teams, Venue,
};

pub const CRICKET_DATA_SOURCE: &str = "cricketdata.org";

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<Value>,
}

pub struct CricketDataProvider {
    base_url: String,
    client: reqwest::Client,
}

impl CricketDataProvider {
    pub fn from_url(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Parse a `{"matches": [...]}` body.
    pub fn parse_body(body: &str) -> Result<Vec<Value>> {
        let resp: MatchesResponse =
            serde_json::from_str(body).context("parsing cricketdata response")?;
        Ok(resp.matches)
    }
}

#[async_trait]
impl Provider for CricketDataProvider {
    type Raw = Value;
    type Output = CanonicalMatch;

    fn name(&self) -> &str {
        CRICKET_DATA_SOURCE
    }

    async fn fetch(&self, window: Option<&FetchWindow>) -> Result<Vec<Value>> {
        let w = window
            .copied()
            .unwrap_or_else(|| FetchWindow::forward(Utc::now(), Duration::days(7)));
        let url = format!("{}/matches", self.base_url);
        let from = w.start.format("%Y-%m-%d").to_string();
        let to = w.end.format("%Y-%m-%d").to_string();

        let resp = match self
            .client
            .get(&url)
            .query(&[("from", from.as_str()), ("to", to.as_str())])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                counter!("aggregate_http_errors_total", "provider" => CRICKET_DATA_SOURCE)
                    .increment(1);
                return Err(e).context("cricketdata http get()");
            }
        };
        let body = resp
            .error_for_status()
            .context("cricketdata http status")?
            .text()
            .await
            .context("cricketdata http .text()")?;
        Self::parse_body(&body)
    }

    fn normalize(&self, raw: Value, now: DateTime<Utc>) -> Result<CanonicalMatch, NormalizeError> {
        let source_match_id = id_str(&raw, "id")?;
        let format_raw = opt_str(&raw, "format").unwrap_or_else(|| "T20".to_string());
        let format = MatchFormat::parse(&format_raw).ok_or(NormalizeError::InvalidField {
            field: "format",
            value: format_raw,
        })?;
        let competition = opt_str(&raw, "series").unwrap_or_else(|| "Unknown".to_string());
        let start_raw = req_str(&raw, "start_time")?;
        let start_time_utc =
            parse_instant(start_raw).ok_or_else(|| NormalizeError::InvalidTimestamp {
                field: "start_time",
                value: start_raw.to_string(),
            })?;
        let status = match opt_str(&raw, "status") {
            None => MatchStatus::Upcoming,
            Some(s) => MatchStatus::parse(&s).ok_or(NormalizeError::InvalidField {
                field: "status",
                value: s,
            })?,
        };

        Ok(CanonicalMatch {
            id: format!("{CRICKET_DATA_SOURCE}_{source_match_id}"),
            source: CRICKET_DATA_SOURCE.to_string(),
            title: opt_str(&raw, "title").unwrap_or_default(),
            teams: Teams {
                team1: opt_str(&raw, "team1").unwrap_or_default(),
                team2: opt_str(&raw, "team2").unwrap_or_default(),
            },
            format,
            level: determine_level(format, &competition),
            competition,
            start_time_utc,
            end_time_utc: opt_str(&raw, "end_time").and_then(|s| parse_instant(&s)),
            venue: Venue {
                name: opt_str(&raw, "venue").unwrap_or_else(|| "TBD".to_string()),
                city: opt_str(&raw, "city"),
                country: opt_str(&raw, "country").unwrap_or_else(|| "Unknown".to_string()),
                latitude: opt_f64(&raw, "latitude"),
                longitude: opt_f64(&raw, "longitude"),
            },
            status,
            score_summary: opt_str(&raw, "score_summary"),
            info_link: opt_str(&raw, "link").unwrap_or_default(),
            stream_link: opt_str(&raw, "stream_link"),
            source_match_id,
            last_updated: now,
        })
    }
}
