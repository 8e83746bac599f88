// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "AGGREGATOR_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "AGGREGATOR_DB_PATH";
pub const ENV_SCHEDULER: &str = "AGGREGATOR_SCHEDULER";

pub const DEFAULT_DB_PATH: &str = "data/aggregator.db";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Matches fire on the hour; news 15 minutes later so the two jobs do not
/// compete for the same slot.
pub const DEFAULT_MATCH_SLOTS: [&str; 3] = ["06:00", "14:00", "22:00"];
pub const DEFAULT_NEWS_SLOTS: [&str; 3] = ["06:15", "14:15", "22:15"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CricketDataConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// UTC times of day, `HH:MM`.
    pub matches: Vec<String>,
    pub news: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            matches: DEFAULT_MATCH_SLOTS.iter().map(|s| s.to_string()).collect(),
            news: DEFAULT_NEWS_SLOTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScheduleConfig {
    pub fn match_slots(&self) -> Result<Vec<NaiveTime>> {
        parse_slots(&self.matches).context("schedule.matches")
    }

    pub fn news_slots(&self) -> Result<Vec<NaiveTime>> {
        parse_slots(&self.news).context("schedule.news")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub db_path: String,
    pub scheduler_enabled: bool,
    /// Register the built-in demo match fixtures.
    pub sample_matches: bool,
    pub cricket_data: Option<CricketDataConfig>,
    pub news_feeds: Vec<FeedConfig>,
    pub news_timeout_secs: u64,
    pub schedule: ScheduleConfig,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            scheduler_enabled: true,
            sample_matches: true,
            cricket_data: None,
            news_feeds: vec![
                FeedConfig {
                    name: "ESPNCricinfo".into(),
                    url: "https://www.espncricinfo.com/rss/content/story/feeds/0.xml".into(),
                },
                FeedConfig {
                    name: "CricBuzz".into(),
                    url: "https://www.cricbuzz.com/rss-feed/cricket-news.xml".into(),
                },
            ],
            news_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            schedule: ScheduleConfig::default(),
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn parse_slots(raw: &[String]) -> Result<Vec<NaiveTime>> {
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        let t = NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .with_context(|| format!("invalid time of day {s:?}, expected HH:MM"))?;
        out.push(t);
    }
    out.sort();
    out.dedup();
    Ok(out)
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<AggregatorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing config from {}", path.display()))
}

/// Load config using env var + fallbacks, then apply env overrides:
/// 1) $AGGREGATOR_CONFIG_PATH
/// 2) config/aggregator.toml
/// 3) config/aggregator.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<AggregatorConfig> {
    let mut cfg = load_config_file()?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn load_config_file() -> Result<AggregatorConfig> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/aggregator.toml");
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/aggregator.json");
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(AggregatorConfig::default())
}

fn apply_env_overrides(cfg: &mut AggregatorConfig) {
    if let Ok(p) = std::env::var(ENV_DB_PATH) {
        if !p.trim().is_empty() {
            cfg.db_path = p.trim().to_string();
        }
    }
    if let Ok(v) = std::env::var(ENV_SCHEDULER) {
        cfg.scheduler_enabled = !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "off" | "no"
        );
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AggregatorConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("invalid JSON config");
    }
    if hint_ext == "toml" {
        return toml::from_str(s).context("invalid TOML config");
    }
    // Unknown extension: sniff.
    if s.trim_start().starts_with('{') {
        serde_json::from_str(s).context("invalid JSON config")
    } else {
        toml::from_str(s).context("invalid TOML config")
    }
}
