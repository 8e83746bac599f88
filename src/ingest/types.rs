// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFormat {
    Test,
    #[serde(rename = "ODI")]
    Odi,
    #[serde(rename = "T20I")]
    T20i,
    T20,
    #[serde(rename = "List A")]
    ListA,
}

impl MatchFormat {
    /// Case-insensitive parse of the labels upstream feeds use.
    pub fn parse(s: &str) -> Option<Self> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "test" => Some(Self::Test),
            "odi" => Some(Self::Odi),
            "t20i" => Some(Self::T20i),
            "t20" => Some(Self::T20),
            "lista" => Some(Self::ListA),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "Test",
            Self::Odi => "ODI",
            Self::T20i => "T20I",
            Self::T20 => "T20",
            Self::ListA => "List A",
        }
    }

    pub fn is_international(&self) -> bool {
        matches!(self, Self::Test | Self::Odi | Self::T20i)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchLevel {
    International,
    Franchise,
    Domestic,
    Associate,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Completed,
    Abandoned,
}

impl MatchStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" | "scheduled" => Some(Self::Upcoming),
            "live" | "in progress" => Some(Self::Live),
            "completed" | "finished" | "result" => Some(Self::Completed),
            "abandoned" | "cancelled" | "no result" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// Ordered team pairing (home/first-named team first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teams {
    pub team1: String,
    pub team2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub city: Option<String>,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Source-independent match record; natural key is `(source, source_match_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMatch {
    pub id: String,
    pub source: String,
    pub source_match_id: String,
    pub title: String,
    pub teams: Teams,
    pub format: MatchFormat,
    pub competition: String,
    pub level: MatchLevel,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: Option<DateTime<Utc>>,
    pub venue: Venue,
    pub status: MatchStatus,
    pub score_summary: Option<String>,
    pub info_link: String,
    pub stream_link: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// Source-independent news record; natural key is `id` (digest of `url`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalNewsItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub url: String,
    pub tags: Vec<String>,
    pub is_record_breaking: bool,
    pub region: String,
    pub published_at: DateTime<Utc>,
    pub score: f64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One entry pulled from a news feed, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub source: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published: DateTime<Utc>,
    pub image_url: Option<String>,
}

/// Inclusive time range a provider is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    pub fn forward(start: DateTime<Utc>, horizon: Duration) -> Self {
        Self {
            start,
            end: start + horizon,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Why a single raw record could not become a canonical entity.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("unparseable timestamp in `{field}`: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// A data source feeding one aggregator.
///
/// `fetch` errors (network, status, parse) are logged by the aggregator and
/// count as zero records from this provider. `normalize` must be
/// deterministic for a given `now`.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    type Raw: Send + 'static;
    type Output: Send + 'static;

    fn name(&self) -> &str;

    async fn fetch(&self, window: Option<&FetchWindow>) -> Result<Vec<Self::Raw>>;

    fn normalize(
        &self,
        raw: Self::Raw,
        now: DateTime<Utc>,
    ) -> std::result::Result<Self::Output, NormalizeError>;
}

pub type MatchProvider = Box<dyn Provider<Raw = serde_json::Value, Output = CanonicalMatch>>;
pub type NewsProvider = Box<dyn Provider<Raw = FeedEntry, Output = CanonicalNewsItem>>;
