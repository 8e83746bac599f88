// src/ingest/providers/sample_matches.rs
//! Demo provider with fixed fixtures; exercises the whole match pipeline
//! without network access.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use super::{id_str, opt_f64, opt_str, req_str};
use crate::ingest::classify::determine_level;
use crate::ingest::parse_instant;
use crate::ingest::types::{
    CanonicalMatch, FetchWindow, MatchFormat, MatchStatus, NormalizeError, Provider, Teams, Venue,
};

pub const SAMPLE_SOURCE: &str = "sample_provider";

#[derive(Debug, Default)]
pub struct SampleMatchProvider;

impl SampleMatchProvider {
    pub fn new() -> Self {
        Self
    }

    /// Fixtures scheduled relative to `anchor`.
    pub fn fixtures(anchor: DateTime<Utc>) -> Vec<Value> {
        vec![
            json!({
                "id": "match_001",
                "title": "India vs Australia - 1st Test",
                "team1": "India",
                "team2": "Australia",
                "format": "Test",
                "series": "Border-Gavaskar Trophy",
                "start_time": (anchor + Duration::days(1)).to_rfc3339(),
                "venue": "Melbourne Cricket Ground",
                "city": "Melbourne",
                "country": "Australia",
                "latitude": -37.8200,
                "longitude": 144.9834,
                "status": "upcoming",
                "link": "https://www.espncricinfo.com"
            }),
            json!({
                "id": "match_002",
                "title": "England vs New Zealand - T20I",
                "team1": "England",
                "team2": "New Zealand",
                "format": "T20I",
                "series": "T20I Series",
                "start_time": (anchor + Duration::hours(6)).to_rfc3339(),
                "venue": "Lord's Cricket Ground",
                "city": "London",
                "country": "England",
                "latitude": 51.5294,
                "longitude": -0.1726,
                "status": "live",
                "score_summary": "England 165/4 (15.2 overs)",
                "link": "https://www.espncricinfo.com"
            }),
        ]
    }
}

#[async_trait]
impl Provider for SampleMatchProvider {
    type Raw = Value;
    type Output = CanonicalMatch;

    fn name(&self) -> &str {
        SAMPLE_SOURCE
    }

    async fn fetch(&self, window: Option<&FetchWindow>) -> Result<Vec<Value>> {
        let anchor = window.map_or_else(Utc::now, |w| w.start);
        let all = Self::fixtures(anchor);
        let Some(w) = window else {
            return Ok(all);
        };
        Ok(all
            .into_iter()
            .filter(|m| {
                m.get("start_time")
                    .and_then(Value::as_str)
                    .and_then(parse_instant)
                    .is_some_and(|t| w.contains(t))
            })
            .collect())
    }

    /// Strict: every fixture field except coordinates and score is required.
    fn normalize(&self, raw: Value, now: DateTime<Utc>) -> Result<CanonicalMatch, NormalizeError> {
        let source_match_id = id_str(&raw, "id")?;
        let format_raw = req_str(&raw, "format")?;
        let format = MatchFormat::parse(format_raw).ok_or_else(|| NormalizeError::InvalidField {
            field: "format",
            value: format_raw.to_string(),
        })?;
        let competition = req_str(&raw, "series")?.to_string();
        let start_raw = req_str(&raw, "start_time")?;
        let start_time_utc =
            parse_instant(start_raw).ok_or_else(|| NormalizeError::InvalidTimestamp {
                field: "start_time",
                value: start_raw.to_string(),
            })?;
        let status_raw = req_str(&raw, "status")?;
        let status = MatchStatus::parse(status_raw).ok_or_else(|| NormalizeError::InvalidField {
            field: "status",
            value: status_raw.to_string(),
        })?;

        Ok(CanonicalMatch {
            id: format!("{SAMPLE_SOURCE}_{source_match_id}"),
            source: SAMPLE_SOURCE.to_string(),
            title: req_str(&raw, "title")?.to_string(),
            teams: Teams {
                team1: req_str(&raw, "team1")?.to_string(),
                team2: req_str(&raw, "team2")?.to_string(),
            },
            format,
            level: determine_level(format, &competition),
            competition,
            start_time_utc,
            end_time_utc: opt_str(&raw, "end_time").and_then(|s| parse_instant(&s)),
            venue: Venue {
                name: req_str(&raw, "venue")?.to_string(),
                city: opt_str(&raw, "city"),
                country: req_str(&raw, "country")?.to_string(),
                latitude: opt_f64(&raw, "latitude"),
                longitude: opt_f64(&raw, "longitude"),
            },
            status,
            score_summary: opt_str(&raw, "score_summary"),
            info_link: req_str(&raw, "link")?.to_string(),
            stream_link: opt_str(&raw, "stream_link"),
            source_match_id,
            last_updated: now,
        })
    }
}
