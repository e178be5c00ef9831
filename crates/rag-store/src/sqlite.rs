//! SQLite-based chunk store and dense vector index.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};
use ulid::Ulid;

use rag_core::{
    Chunk, ChunkStore, NearestOptions, RagError, Result, ScoredChunk, SearchMode, SourceRef,
    Stats, VectorIndex,
};

use crate::schema::SCHEMA;
use crate::similarity::{cosine_similarity, maximal_marginal_relevance};

/// `store_meta` key holding the embedder identity.
const EMBEDDER_KEY: &str = "embedder";

/// SQLite-based store implementation.
///
/// Chunks are stored with their embedding as a little-endian f32 blob.
/// Dense search is an exact cosine scan over the stored embeddings, which is
/// adequate for a corpus that fits in one process.
pub struct SqliteStore {
    /// Connection wrapped in blocking Mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    /// Initialize the store with a connection.
    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| RagError::database(format!("Failed to initialize schema: {}", e)))?;

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Configure SQLite connection for optimal performance.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| RagError::database(e.to_string()))?;
        f(&conn)
    }

    /// Identity of the embedder the stored vectors were produced with.
    pub fn embedder_id(&self) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![EMBEDDER_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RagError::database(e.to_string()))
        })
    }

    /// Fail if the stored vectors came from a different embedder than `id`.
    pub fn check_embedder(&self, id: &str) -> Result<()> {
        match self.embedder_id()? {
            Some(stored) if stored != id => Err(RagError::config(format!(
                "store was embedded with '{}' but the current embedder is '{}'; \
                 re-ingest into a fresh database or restore the original model",
                stored, id
            ))),
            _ => Ok(()),
        }
    }

    /// Record `id` as the store's embedder.
    ///
    /// A store holding chunks keeps its recorded embedder; an empty store
    /// takes the new one.
    pub fn claim_embedder(&self, id: &str) -> Result<()> {
        let chunks: i64 = self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(|e| RagError::database(e.to_string()))
        })?;
        if chunks > 0 {
            self.check_embedder(id)?;
        }

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![EMBEDDER_KEY, id],
            )
            .map_err(|e| RagError::database(e.to_string()))?;
            Ok(())
        })?;

        debug!("Store embedder is {}", id);
        Ok(())
    }

    /// Every stored chunk that passes the filter, with its embedding.
    fn load_candidates(&self, options: &NearestOptions) -> Result<Vec<(Chunk, Vec<f32>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, document, position, content, metadata, embedding FROM chunks",
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let chunk = Self::row_to_chunk(row)?;
                    let bytes: Vec<u8> = row.get(5)?;
                    Ok((chunk, Self::bytes_to_vec(&bytes)))
                })
                .map_err(|e| RagError::database(e.to_string()))?;

            let mut candidates = Vec::new();
            for row in rows {
                let (chunk, embedding) = row.map_err(|e| RagError::database(e.to_string()))?;
                if options.filter.as_ref().map_or(true, |f| f.matches(&chunk)) {
                    candidates.push((chunk, embedding));
                }
            }
            Ok(candidates)
        })
    }

    /// Convert a row to a Chunk.
    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
        let id_str: String = row.get(0)?;
        let metadata_json: String = row.get(4)?;

        let id = Ulid::from_string(&id_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        let metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(Chunk {
            id,
            source: SourceRef::new(row.get::<_, String>(1)?, row.get(2)?),
            content: row.get(3)?,
            metadata,
        })
    }

    /// Convert f32 vector to bytes (little-endian).
    fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Convert little-endian bytes back to an f32 vector.
    fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::invalid_argument(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO chunks (id, document, position, content, metadata,
                                            embedding, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .map_err(|e| RagError::database(e.to_string()))?;

                for (chunk, embedding) in chunks.iter().zip(embeddings) {
                    let metadata = serde_json::to_string(&chunk.metadata)?;
                    stmt.execute(params![
                        chunk.id.to_string(),
                        chunk.source.document,
                        chunk.source.position,
                        chunk.content,
                        metadata,
                        Self::vec_to_bytes(embedding),
                        now,
                    ])
                    .map_err(|e| RagError::database(format!("Failed to insert chunk: {}", e)))?;
                }
            }

            tx.commit().map_err(|e| RagError::database(e.to_string()))?;

            debug!("Inserted {} chunks", chunks.len());
            Ok(())
        })
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, document, position, content, metadata
                    FROM chunks
                    ORDER BY document, position
                    "#,
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            let rows = stmt
                .query_map([], Self::row_to_chunk)
                .map_err(|e| RagError::database(e.to_string()))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))
        })
    }

    async fn delete_source(&self, document: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn
                .execute("DELETE FROM chunks WHERE document = ?1", params![document])
                .map_err(|e| RagError::database(format!("Failed to delete chunks: {}", e)))?;

            debug!("Deleted {} chunks of {}", removed, document);
            Ok(removed)
        })
    }

    async fn stats(&self) -> Result<Stats> {
        self.with_conn(|conn| {
            let (documents, chunks): (u64, u64) = conn
                .query_row(
                    "SELECT COUNT(DISTINCT document), COUNT(*) FROM chunks",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            // Get page count and page size to estimate storage
            let page_count: u64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get(0))
                .unwrap_or(0);
            let page_size: u64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get(0))
                .unwrap_or(4096);

            Ok(Stats {
                documents,
                chunks,
                storage_bytes: page_count * page_size,
            })
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
        options: &NearestOptions,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(Chunk, Vec<f32>, f32)> = Vec::new();
        for (chunk, stored) in self.load_candidates(options)? {
            if stored.len() != embedding.len() {
                return Err(RagError::embedding(format!(
                    "query has {} dimensions but chunk {} has {}",
                    embedding.len(),
                    chunk.id,
                    stored.len()
                )));
            }
            let similarity = cosine_similarity(embedding, &stored);
            scored.push((chunk, stored, similarity));
        }

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        let results: Vec<ScoredChunk> = match options.mode {
            SearchMode::Plain => scored
                .into_iter()
                .take(k)
                .map(|(chunk, _, sim)| ScoredChunk::new(chunk, sim))
                .collect(),
            SearchMode::Threshold { score_threshold } => scored
                .into_iter()
                .take_while(|(_, _, sim)| *sim >= score_threshold)
                .take(k)
                .map(|(chunk, _, sim)| ScoredChunk::new(chunk, sim))
                .collect(),
            SearchMode::Diversity {
                fetch_k,
                lambda_mult,
            } => {
                scored.truncate(fetch_k.max(k));
                let vectors: Vec<&[f32]> = scored.iter().map(|(_, v, _)| v.as_slice()).collect();
                let picked = maximal_marginal_relevance(embedding, &vectors, k, lambda_mult);

                let mut slots: Vec<Option<(Chunk, Vec<f32>, f32)>> =
                    scored.into_iter().map(Some).collect();
                picked
                    .into_iter()
                    .filter_map(|i| slots[i].take())
                    .map(|(chunk, _, sim)| ScoredChunk::new(chunk, sim))
                    .collect()
            }
        };

        debug!("Dense search ({:?}) returned {} results", options.mode, results.len());
        Ok(results)
    }
}
