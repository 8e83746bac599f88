// src/store/memory.rs
use std::collections::HashMap;

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde_json::Value;

use super::{DocumentStore, Filter};

/// In-process store for tests and local runs. Documents keep insertion order
/// per collection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every document in `collection`.
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.inner
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.inner.read().get(collection).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let guard = self.inner.read();
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn upsert(&self, collection: &str, filter: &Filter, doc: Value) -> Result<()> {
        if filter.natural_key().is_none() {
            return Err(anyhow!("upsert into {collection} requires an equality filter"));
        }
        let mut guard = self.inner.write();
        let docs = guard.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| filter.matches(d)) {
            Some(slot) => *slot = doc,
            None => docs.push(doc),
        }
        Ok(())
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut guard = self.inner.write();
        let Some(docs) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !filter.matches(d));
        Ok((before - docs.len()) as u64)
    }
}
