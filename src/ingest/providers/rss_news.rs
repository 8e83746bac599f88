// src/ingest/providers/rss_news.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::classify::{
    classification_text, determine_region, extract_tags, is_record_breaking, score,
};
use crate::ingest::types::{CanonicalNewsItem, FeedEntry, FetchWindow, NormalizeError, Provider};
use crate::ingest::{clean_text, content_hash, parse_instant, SUMMARY_MAX_CHARS};

/// Only the newest entries of a feed are considered per run.
pub const MAX_ENTRIES_PER_FEED: usize = 20;

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
}

impl AtomEntry {
    fn alternate_href(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
            .and_then(|l| l.href.clone())
    }

    fn image_href(&self) -> Option<String> {
        self.links
            .iter()
            .find(|l| {
                l.rel.as_deref() == Some("enclosure")
                    && l.kind.as_deref().is_some_and(|k| k.starts_with("image/"))
            })
            .and_then(|l| l.href.clone())
    }
}

pub struct RssNewsProvider {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssNewsProvider {
    /// Serve a fixed feed document; used by tests and offline runs.
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self {
            name: name.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        })
    }

    /// Parse an RSS 2.0 or Atom document into at most
    /// [`MAX_ENTRIES_PER_FEED`] entries. Unparseable dates fall back to `now`.
    pub fn parse_feed(&self, xml: &str, now: DateTime<Utc>) -> Result<Vec<FeedEntry>> {
        let xml_clean = scrub_html_entities_for_xml(xml);

        let rss_err = match from_str::<Rss>(&xml_clean) {
            Ok(rss) => {
                let out = rss
                    .channel
                    .item
                    .into_iter()
                    .take(MAX_ENTRIES_PER_FEED)
                    .map(|it| FeedEntry {
                        source: self.name.clone(),
                        title: it.title.unwrap_or_default(),
                        summary: it.description.unwrap_or_default(),
                        url: it.link.map(|l| l.trim().to_string()).unwrap_or_default(),
                        published: published_or_now(it.pub_date.as_deref(), now),
                        image_url: it
                            .enclosure
                            .filter(|e| e.kind.as_deref().is_some_and(|k| k.starts_with("image/")))
                            .and_then(|e| e.url),
                    })
                    .collect();
                return Ok(out);
            }
            Err(e) => e,
        };
        if !xml_clean.contains("<feed") {
            return Err(anyhow!(rss_err)).with_context(|| format!("parsing {} feed as rss", self.name));
        }

        let atom: AtomFeed = from_str(&xml_clean)
            .with_context(|| format!("parsing {} feed as atom", self.name))?;
        let out = atom
            .entry
            .into_iter()
            .take(MAX_ENTRIES_PER_FEED)
            .map(|en| {
                let url = en.alternate_href().unwrap_or_default();
                let image_url = en.image_href();
                let date = en.published.as_deref().or(en.updated.as_deref());
                FeedEntry {
                    source: self.name.clone(),
                    title: en.title.map(|t| t.value).unwrap_or_default(),
                    summary: en
                        .summary
                        .or(en.content)
                        .map(|t| t.value)
                        .unwrap_or_default(),
                    url: url.trim().to_string(),
                    published: published_or_now(date, now),
                    image_url,
                }
            })
            .collect();
        Ok(out)
    }
}

fn published_or_now(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(parse_instant).unwrap_or(now)
}

#[async_trait]
impl Provider for RssNewsProvider {
    type Raw = FeedEntry;
    type Output = CanonicalNewsItem;

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _window: Option<&FetchWindow>) -> Result<Vec<FeedEntry>> {
        let now = Utc::now();
        match &self.mode {
            Mode::Fixture(s) => self.parse_feed(s, now),
            Mode::Http { url, client } => {
                let resp = match client.get(url.as_str()).send().await {
                    Ok(resp) => resp,
                    Err(e) => {
                        counter!("aggregate_http_errors_total", "provider" => self.name.clone())
                            .increment(1);
                        return Err(e).with_context(|| format!("{} http get()", self.name));
                    }
                };
                let body = resp
                    .error_for_status()
                    .with_context(|| format!("{} http status", self.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} http .text()", self.name))?;
                self.parse_feed(&body, now)
            }
        }
    }

    fn normalize(
        &self,
        raw: FeedEntry,
        now: DateTime<Utc>,
    ) -> Result<CanonicalNewsItem, NormalizeError> {
        if raw.url.is_empty() {
            return Err(NormalizeError::MissingField("link"));
        }
        let title = clean_text(&raw.title, usize::MAX);
        if title.is_empty() {
            return Err(NormalizeError::MissingField("title"));
        }
        let summary = clean_text(&raw.summary, SUMMARY_MAX_CHARS);

        let text = classification_text(&title, &summary);
        let tags = extract_tags(&text);
        let is_record = is_record_breaking(&text);
        let region = determine_region(&text).to_string();
        let score = score(is_record, &tags, raw.published, now);

        Ok(CanonicalNewsItem {
            id: content_hash(&raw.url),
            title,
            summary,
            source: raw.source,
            url: raw.url,
            tags,
            is_record_breaking: is_record,
            region,
            published_at: raw.published,
            score,
            image_url: raw.image_url,
            created_at: now,
        })
    }
}

/// quick-xml only knows the five XML entities; feeds routinely embed HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Test feed</title>
  <item>
    <title>Record chase &ndash; IPL thriller</title>
    <link>https://example.test/a</link>
    <description><![CDATA[<p>Fastest fifty ever.</p>]]></description>
    <pubDate>Tue, 05 Mar 2024 14:30:00 +0000</pubDate>
    <enclosure url="https://example.test/a.jpg" type="image/jpeg" length="1"/>
  </item>
  <item>
    <title>No date here</title>
    <link>https://example.test/b</link>
    <description>plain</description>
    <pubDate>sometime</pubDate>
  </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom feed</title>
  <entry>
    <title type="html">Pakistan name squad</title>
    <link rel="alternate" href="https://example.test/atom/1"/>
    <link rel="enclosure" type="image/png" href="https://example.test/1.png"/>
    <summary>PSL stars included</summary>
    <updated>2024-03-05T10:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items() {
        let now = Utc::now();
        let p = RssNewsProvider::from_fixture("Feed", RSS);
        let entries = p.parse_feed(RSS, now).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Record chase - IPL thriller");
        assert_eq!(entries[0].image_url.as_deref(), Some("https://example.test/a.jpg"));
        assert_eq!(
            entries[0].published,
            "2024-03-05T14:30:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        // Unparseable date falls back to the fetch time.
        assert_eq!(entries[1].published, now);
    }

    #[test]
    fn parses_atom_entries() {
        let now = Utc::now();
        let p = RssNewsProvider::from_fixture("Atom", ATOM);
        let entries = p.parse_feed(ATOM, now).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.test/atom/1");
        assert_eq!(entries[0].title, "Pakistan name squad");
        assert_eq!(entries[0].summary, "PSL stars included");
        assert_eq!(entries[0].image_url.as_deref(), Some("https://example.test/1.png"));
    }

    #[test]
    fn rejects_non_feed_documents() {
        let p = RssNewsProvider::from_fixture("Bad", "");
        assert!(p.parse_feed("not xml at all", Utc::now()).is_err());
    }

    #[test]
    fn caps_entries_per_feed() {
        let items: String = (0..30)
            .map(|i| format!("<item><title>t{i}</title><link>https://x/{i}</link></item>"))
            .collect();
        let xml = format!("<rss><channel>{items}</channel></rss>");
        let p = RssNewsProvider::from_fixture("Many", &xml);
        let entries = p.parse_feed(&xml, Utc::now()).unwrap();
        assert_eq!(entries.len(), MAX_ENTRIES_PER_FEED);
        assert_eq!(entries[0].title, "t0");
    }

    #[test]
    fn normalize_classifies_and_scores() {
        let now = Utc::now();
        let p = RssNewsProvider::from_fixture("Feed", RSS);
        let entry = FeedEntry {
            source: "Feed".into(),
            title: "IPL: fastest fifty".into(),
            summary: "<b>Mumbai</b> opener smashes it".into(),
            url: "https://example.test/ipl".into(),
            published: now - Duration::hours(1),
            image_url: None,
        };
        let item = p.normalize(entry, now).unwrap();
        assert_eq!(item.summary, "Mumbai opener smashes it");
        assert!(item.is_record_breaking);
        assert_eq!(item.region, "India");
        assert!(item.tags.contains(&"ipl".to_string()));
        assert_eq!(item.score, 100.0);
        assert_eq!(item.id, content_hash("https://example.test/ipl"));
        assert_eq!(item.created_at, now);
    }

    #[test]
    fn normalize_truncates_summary() {
        let now = Utc::now();
        let p = RssNewsProvider::from_fixture("Feed", RSS);
        let entry = FeedEntry {
            source: "Feed".into(),
            title: "Long read".into(),
            summary: "word ".repeat(400),
            url: "https://example.test/long".into(),
            published: now,
            image_url: None,
        };
        let item = p.normalize(entry, now).unwrap();
        assert!(item.summary.chars().count() <= SUMMARY_MAX_CHARS);
    }

    #[test]
    fn normalize_requires_link_and_title() {
        let now = Utc::now();
        let p = RssNewsProvider::from_fixture("Feed", RSS);
        let mut entry = FeedEntry {
            source: "Feed".into(),
            title: "x".into(),
            summary: String::new(),
            url: String::new(),
            published: now,
            image_url: None,
        };
        assert_eq!(
            p.normalize(entry.clone(), now).unwrap_err(),
            NormalizeError::MissingField("link")
        );
        entry.url = "https://example.test/x".into();
        entry.title = "<br/>".into();
        assert_eq!(
            p.normalize(entry, now).unwrap_err(),
            NormalizeError::MissingField("title")
        );
    }

    #[test]
    fn normalize_classifies_mixed_case_headlines() {
        let now = Utc::now();
        let p = RssNewsProvider::from_fixture("Feed", RSS);
        let entry = FeedEntry {
            source: "Feed".into(),
            title: "India tour of Australia".into(),
            summary: String::new(),
            url: "https://example.test/tour".into(),
            published: now - Duration::hours(48),
            image_url: None,
        };
        let item = p.normalize(entry, now).unwrap();
        assert_eq!(item.region, "India");
        assert!(item.tags.is_empty());
        assert_eq!(item.score, 50.0);
    }

    #[test]
    fn normalize_keeps_long_titles_whole() {
        let now = Utc::now();
        let p = RssNewsProvider::from_fixture("Feed", RSS);
        let title = "Headline ".repeat(60).trim_end().to_string();
        let entry = FeedEntry {
            source: "Feed".into(),
            title: title.clone(),
            summary: String::new(),
            url: "https://example.test/headline".into(),
            published: now,
            image_url: None,
        };
        let item = p.normalize(entry, now).unwrap();
        assert_eq!(item.title, title);
    }
}
