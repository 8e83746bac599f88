//! [`SqliteStore`]: the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::OptionalExtension as _;
use serde_json::Value;

use super::{schema::SCHEMA, Condition, DocumentStore, Filter};

/// A document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted and all
/// access runs on the `tokio_rusqlite` background thread.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .with_context(|| format!("opening sqlite store at {}", path.display()))?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store; useful for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .context("opening in-memory sqlite store")?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Flush and close the underlying connection.
    pub async fn close(self) -> Result<()> {
        self.conn.close().await.context("closing sqlite store")
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .context("initialising sqlite schema")
    }

    /// Number of documents stored in `collection`.
    pub async fn count(&self, collection: &str) -> Result<u64> {
        let collection = collection.to_string();
        let n: i64 = self
            .conn
            .call(move |conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                    rusqlite::params![collection],
                    |r| r.get(0),
                )?;
                Ok(n)
            })
            .await
            .context("counting documents")?;
        Ok(n.max(0) as u64)
    }

    /// `(doc_key, body)` rows of a collection matching `filter`, in insertion
    /// order. Scalar equality conditions are evaluated by SQLite through
    /// `json_extract`, so only candidate rows are decoded; every returned row
    /// is re-checked against the full filter.
    async fn scan(&self, collection: &str, filter: &Filter) -> Result<Vec<(String, Value)>> {
        let pushed = pushdown(filter);
        let mut sql =
            String::from("SELECT doc_key, body FROM documents WHERE collection = ?1");
        let mut args = vec![SqlValue::Text(collection.to_string())];
        for (path, value) in pushed {
            sql.push_str(&format!(
                " AND json_extract(body, ?{}) = ?{}",
                args.len() + 1,
                args.len() + 2
            ));
            args.push(SqlValue::Text(path));
            args.push(value);
        }
        sql.push_str(" ORDER BY rowid");

        let rows: Vec<(String, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args), |r| {
                        Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .context("scanning documents")?;

        let mut out = Vec::with_capacity(rows.len());
        for (key, body) in rows {
            let doc: Value = serde_json::from_str(&body)
                .with_context(|| format!("decoding stored document {key}"))?;
            if filter.matches(&doc) {
                out.push((key, doc));
            }
        }
        Ok(out)
    }

    async fn get_by_key(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let collection = collection.to_string();
        let key = key.to_string();
        let body: Option<String> = self
            .conn
            .call(move |conn| {
                let body = conn
                    .query_row(
                        "SELECT body FROM documents WHERE collection = ?1 AND doc_key = ?2",
                        rusqlite::params![collection, key],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok(body)
            })
            .await
            .context("loading document by key")?;

        body.map(|b| serde_json::from_str(&b).context("decoding stored document"))
            .transpose()
    }
}

/// Equality conditions SQLite can compare directly, as `(json path, value)`.
/// Other values, and fields containing quotes, are left to `Filter::matches`.
fn pushdown(filter: &Filter) -> Vec<(String, SqlValue)> {
    filter
        .conditions()
        .iter()
        .filter_map(|c| match c {
            Condition::Eq(field, value) if !field.contains('"') => {
                let value = match value {
                    Value::String(s) => SqlValue::Text(s.clone()),
                    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => SqlValue::Integer(i),
                        None => SqlValue::Real(n.as_f64()?),
                    },
                    _ => return None,
                };
                Some((format!("$.\"{field}\""), value))
            }
            _ => None,
        })
        .collect()
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        if let Some(key) = filter.natural_key() {
            if let Some(doc) = self.get_by_key(collection, &key).await? {
                if filter.matches(&doc) {
                    return Ok(Some(doc));
                }
            }
        }
        Ok(self
            .scan(collection, filter)
            .await?
            .into_iter()
            .next()
            .map(|(_, doc)| doc))
    }

    async fn upsert(&self, collection: &str, filter: &Filter, doc: Value) -> Result<()> {
        let key = filter
            .natural_key()
            .ok_or_else(|| anyhow!("upsert into {collection} requires an equality filter"))?;
        let collection = collection.to_string();
        let body = serde_json::to_string(&doc).context("encoding document")?;
        let updated_at = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO documents (collection, doc_key, body, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (collection, doc_key)
                     DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                    rusqlite::params![collection, key, body, updated_at],
                )?;
                Ok(())
            })
            .await
            .context("upserting document")
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let doomed: Vec<String> = self
            .scan(collection, filter)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let collection = collection.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0u64;
                for key in &doomed {
                    removed += tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND doc_key = ?2",
                        rusqlite::params![collection, key],
                    )? as u64;
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .context("deleting documents")?;
        Ok(removed)
    }
}
