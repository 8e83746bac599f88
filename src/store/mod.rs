// src/store/mod.rs
//! Document storage collaborator used by the aggregators.
//!
//! The aggregators only need three idempotent operations (`find_one`,
//! `upsert`, `delete_many`) plus equality / less-than filtering on top-level
//! fields. Backends implement [`DocumentStore`]; the process entry point owns
//! their lifecycle and injects them as `Arc<dyn DocumentStore>`.

pub mod memory;
pub mod schema;
pub mod sqlite;

use std::cmp::Ordering;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const MATCHES_COLLECTION: &str = "matches";
pub const NEWS_COLLECTION: &str = "news";

/// A single predicate over a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Lt(String, Value),
}

/// Conjunction of [`Condition`]s. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.into(), value.into()));
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Lt(field.into(), value.into()));
        self
    }

    /// Convenience for range filters on timestamp fields.
    pub fn before(self, field: impl Into<String>, instant: DateTime<Utc>) -> Self {
        self.lt(field, Value::String(instant.to_rfc3339()))
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::Eq(field, want) => doc.get(field) == Some(want),
            Condition::Lt(field, bound) => doc
                .get(field)
                .and_then(|have| compare_values(have, bound))
                .is_some_and(|ord| ord == Ordering::Less),
        })
    }

    /// Stable key for filters made only of equality conditions.
    ///
    /// Field order does not matter: `eq(a).eq(b)` and `eq(b).eq(a)` produce the
    /// same key. Returns `None` for empty filters or filters with ranges.
    pub fn natural_key(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }
        let mut parts = Vec::with_capacity(self.conditions.len());
        for c in &self.conditions {
            match c {
                Condition::Eq(field, value) => parts.push(format!("{field}={value}")),
                Condition::Lt(..) => return None,
            }
        }
        parts.sort();
        Some(parts.join("\u{1f}"))
    }
}

/// Orders two JSON scalars. Strings that both parse as RFC 3339 instants are
/// compared chronologically, so differing fractional-second precision does
/// not break range filters.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Idempotent document store consumed by the aggregation pipeline.
///
/// Each call is expected to be atomic on its own; callers hold no locks
/// across calls.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document in `collection` matching `filter`.
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>>;

    /// Replace the document matching `filter` with `doc`, inserting it when
    /// absent. `filter` must consist of equality conditions only.
    async fn upsert(&self, collection: &str, filter: &Filter, doc: Value) -> Result<()>;

    /// Delete every document matching `filter`; returns how many were removed.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;
}
