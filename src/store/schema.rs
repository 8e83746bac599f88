//! SQL schema for the SQLite document store.

/// Idempotent DDL run on every open.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per document. `doc_key` is the natural key derived from the
-- equality filter used to upsert the document.
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT NOT NULL,
    doc_key     TEXT NOT NULL,
    body        TEXT NOT NULL,   -- JSON document
    updated_at  TEXT NOT NULL,   -- ISO 8601 UTC
    PRIMARY KEY (collection, doc_key)
);

CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents(collection);

PRAGMA user_version = 1;
";
