//! In-memory FTS5 lexical index.

use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use rag_core::{Chunk, LexicalIndex, RagError, Result, ScoredChunk};

use crate::schema::LEXICAL_SCHEMA;

/// BM25 index over a fixed chunk set.
///
/// Built once from the full chunk set and never updated; reflecting new or
/// removed chunks means building a new index.
pub struct FtsLexicalIndex {
    conn: Mutex<Connection>,

    /// Chunk `i` is stored under FTS rowid `i + 1`.
    chunks: Vec<Chunk>,
}

impl FtsLexicalIndex {
    /// Build the index. Fails with `EmptyCorpus` when `chunks` is empty.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RagError::empty_corpus(
                "cannot build a lexical index without chunks",
            ));
        }

        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::database(format!("Failed to open lexical index: {}", e)))?;
        conn.execute_batch(LEXICAL_SCHEMA)
            .map_err(|e| RagError::database(format!("Failed to create lexical index: {}", e)))?;

        {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;
            {
                let mut stmt = tx
                    .prepare("INSERT INTO lexical (rowid, content) VALUES (?1, ?2)")
                    .map_err(|e| RagError::database(e.to_string()))?;
                for (i, chunk) in chunks.iter().enumerate() {
                    stmt.execute(params![i as i64 + 1, chunk.content])
                        .map_err(|e| RagError::database(format!("Failed to index chunk: {}", e)))?;
                }
            }
            tx.commit().map_err(|e| RagError::database(e.to_string()))?;
        }

        info!("Lexical index built over {} chunks", chunks.len());

        Ok(Self {
            conn: Mutex::new(conn),
            chunks,
        })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Turn free text into an FTS5 query matching any of its terms.
    ///
    /// Each term is quoted so FTS5 operators and column filters in user text
    /// are taken literally.
    fn match_expression(text: &str) -> Option<String> {
        let terms: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"", t.to_lowercase()))
            .collect();

        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" OR "))
        }
    }
}

#[async_trait]
impl LexicalIndex for FtsLexicalIndex {
    async fn search(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let Some(expression) = Self::match_expression(text) else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().map_err(|e| RagError::database(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT rowid, bm25(lexical) AS score
                FROM lexical
                WHERE lexical MATCH ?1
                ORDER BY score
                LIMIT ?2
                "#,
            )
            .map_err(|e| RagError::database(e.to_string()))?;

        let rows = stmt
            .query_map(params![expression, k as i64], |row| {
                let rowid: i64 = row.get(0)?;
                let score: f64 = row.get(1)?;
                Ok((rowid, score))
            })
            .map_err(|e| RagError::database(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            let (rowid, score) = row.map_err(|e| RagError::database(e.to_string()))?;
            // bm25() is lower-is-better; flip it so higher is better.
            if let Some(chunk) = self.chunks.get((rowid - 1) as usize) {
                results.push(ScoredChunk::new(chunk.clone(), (-score) as f32));
            }
        }

        debug!("Lexical search returned {} results", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new("scrum.md", 0, "Daily Scrum 15 dakika surer."),
            Chunk::new("scrum.md", 1, "Sprint Review sprint sonunda yapilir."),
            Chunk::new("scrum.md", 2, "Sprint Planning sprint basinda yapilir ve sprint hedefi belirlenir."),
        ]
    }

    #[test]
    fn test_build_rejects_empty_corpus() {
        let err = FtsLexicalIndex::build(Vec::new()).err().unwrap();
        assert_eq!(err.error_code(), "EMPTY_CORPUS");
    }

    #[tokio::test]
    async fn test_search_ranks_matching_chunks() {
        let index = FtsLexicalIndex::build(corpus()).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search("Daily Scrum ne kadar surer?", 5).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.source.position, 0);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_respects_k_per_call() {
        let index = FtsLexicalIndex::build(corpus()).unwrap();

        assert_eq!(index.search("sprint yapilir", 1).await.unwrap().len(), 1);
        assert_eq!(index.search("sprint yapilir", 10).await.unwrap().len(), 2);
        assert!(index.search("sprint", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_treats_operators_literally() {
        let index = FtsLexicalIndex::build(corpus()).unwrap();

        assert!(index.search("\"*) OR (", 5).await.unwrap().is_empty());
        assert!(index.search("content: NEAR(review", 5).await.unwrap().len() >= 1);
    }
}
