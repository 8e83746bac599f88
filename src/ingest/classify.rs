//! Keyword heuristics shared by the news and match normalizers.
//!
//! All text matching is plain substring search over lowercased input, so
//! `"latest"` counts as a `test` mention. Keep that in mind when adding
//! keywords.

use chrono::{DateTime, Utc};

use crate::ingest::types::{MatchFormat, MatchLevel};

pub const BASE_SCORE: f64 = 50.0;
pub const RECORD_BOOST: f64 = 30.0;
pub const HIGH_PROFILE_BOOST: f64 = 15.0;
pub const FRESH_BOOST: f64 = 20.0;
pub const RECENT_BOOST: f64 = 10.0;
pub const MAX_SCORE: f64 = 100.0;

pub const DEFAULT_REGION: &str = "global";

const FORMAT_TAGS: &[&str] = &["test", "odi", "t20"];
const COMPETITION_TAGS: &[&str] = &["ipl", "world cup", "bbl", "psl", "cpl", "hundred"];
const MILESTONE_WORDS: &[&str] = &["century", "hundred", "wickets", "record"];
const INJURY_WORDS: &[&str] = &["injury", "injured"];
const TRANSFER_WORDS: &[&str] = &["transfer", "signed", "deal"];

const RECORD_KEYWORDS: &[&str] = &[
    "record",
    "fastest",
    "highest",
    "lowest",
    "most",
    "first ever",
    "historic",
    "milestone",
    "breakthrough",
];

const HIGH_PROFILE_TAGS: &[&str] = &["world_cup", "ipl", "test"];

const FRANCHISE_LEAGUES: &[&str] = &["ipl", "bbl", "psl", "cpl"];

// Checked top to bottom; the first region with any keyword hit wins.
const REGIONS: &[(&str, &[&str])] = &[
    ("India", &["india", "indian", "ipl", "mumbai", "delhi", "chennai"]),
    (
        "Australia",
        &["australia", "australian", "bbl", "sydney", "melbourne"],
    ),
    (
        "England",
        &["england", "english", "county", "lords", "the hundred"],
    ),
    ("USA", &["usa", "america", "major league cricket"]),
    ("Pakistan", &["pakistan", "pakistani", "psl"]),
    ("West Indies", &["west indies", "caribbean", "cpl"]),
];

/// Lowercased `title + " " + summary`, the input to every news heuristic.
pub fn classification_text(title: &str, summary: &str) -> String {
    format!("{} {}", title.to_lowercase(), summary.to_lowercase())
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Format, competition and event tags, in a stable order. Case-insensitive.
pub fn extract_tags(text: &str) -> Vec<String> {
    let text = text.to_lowercase();
    let text = text.as_str();
    let mut tags: Vec<String> = Vec::new();
    for t in FORMAT_TAGS {
        if text.contains(t) {
            tags.push((*t).to_string());
        }
    }
    for comp in COMPETITION_TAGS {
        if text.contains(comp) {
            tags.push(comp.replace(' ', "_"));
        }
    }
    if contains_any(text, MILESTONE_WORDS) {
        tags.push("milestone".to_string());
    }
    if contains_any(text, INJURY_WORDS) {
        tags.push("injury".to_string());
    }
    if contains_any(text, TRANSFER_WORDS) {
        tags.push("transfer".to_string());
    }
    tags
}

pub fn is_record_breaking(text: &str) -> bool {
    contains_any(&text.to_lowercase(), RECORD_KEYWORDS)
}

pub fn determine_region(text: &str) -> &'static str {
    let text = text.to_lowercase();
    REGIONS
        .iter()
        .find(|(_, keywords)| contains_any(&text, keywords))
        .map_or(DEFAULT_REGION, |(region, _)| region)
}

/// Ranking score in `[50, 100]`. Every term is non-negative, so only the
/// upper bound needs clamping.
pub fn score(
    is_record: bool,
    tags: &[String],
    published_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let mut s = BASE_SCORE;
    if is_record {
        s += RECORD_BOOST;
    }
    s += tags
        .iter()
        .filter(|t| HIGH_PROFILE_TAGS.contains(&t.as_str()))
        .count() as f64
        * HIGH_PROFILE_BOOST;

    let age_hours = (now - published_at).num_seconds() as f64 / 3600.0;
    if age_hours < 6.0 {
        s += FRESH_BOOST;
    } else if age_hours < 24.0 {
        s += RECENT_BOOST;
    }

    s.min(MAX_SCORE)
}

/// International formats win outright; otherwise a franchise league name in
/// the competition marks it Franchise, and everything else is Domestic.
pub fn determine_level(format: MatchFormat, competition: &str) -> MatchLevel {
    if format.is_international() {
        return MatchLevel::International;
    }
    let comp = competition.to_lowercase();
    if contains_any(&comp, FRANCHISE_LEAGUES) {
        MatchLevel::Franchise
    } else {
        MatchLevel::Domestic
    }
}
