//! Database schema definitions.

/// Main schema SQL for the persistent chunk store.
pub const SCHEMA: &str = r#"
-- Chunks with their document embedding
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    position INTEGER NOT NULL,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document, position);

-- Store-wide settings, such as the embedder the vectors came from
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Schema of the in-memory lexical index. Rowid `n` is chunk `n - 1` of the
/// set the index was built from.
pub const LEXICAL_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE lexical USING fts5(
    content,
    tokenize = 'unicode61 remove_diacritics 2'
);
"#;
