//! Core traits defining the interfaces between components.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, ContentType, MetadataFilter, ScoredChunk, Stats};

/// Persistent chunk storage used by ingestion.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert chunks together with their document embeddings.
    async fn insert_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Load every stored chunk, ordered by document then position.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;

    /// Remove every chunk of a source document. Returns the number removed.
    async fn delete_source(&self, document: &str) -> Result<usize>;

    /// Store statistics.
    async fn stats(&self) -> Result<Stats>;
}

/// How a dense search selects its results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    /// Top-k by vector similarity.
    Plain,
    /// Fetch `fetch_k` nearest, then greedily pick k by maximal marginal
    /// relevance. `lambda_mult` in [0, 1], higher favours relevance.
    Diversity { fetch_k: usize, lambda_mult: f32 },
    /// Top-k restricted to similarity >= `score_threshold`.
    Threshold { score_threshold: f32 },
}

/// Options for a dense nearest-neighbour search.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestOptions {
    pub mode: SearchMode,
    pub filter: Option<MetadataFilter>,
}

impl NearestOptions {
    pub fn plain() -> Self {
        Self {
            mode: SearchMode::Plain,
            filter: None,
        }
    }

    pub fn with_mode(mode: SearchMode) -> Self {
        Self { mode, filter: None }
    }

    pub fn filter(mut self, filter: Option<MetadataFilter>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty());
        self
    }
}

/// Dense vector index over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest chunks to `embedding`, best first, scored by cosine similarity.
    async fn nearest(
        &self,
        embedding: &[f32],
        k: usize,
        options: &NearestOptions,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Sparse term-frequency index, built once from the full chunk set.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Best `k` chunks for `text`, best first, higher score is better.
    async fn search(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Text generation model (paraphrases and final answers).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Cross-encoder style relevance model.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score each `(query, document)` pair; one score per document, higher is
    /// more relevant.
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Chunking configuration.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,

    /// Characters carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 120,
        }
    }
}

/// Chunking strategy trait.
pub trait Chunker: Send + Sync {
    /// Chunk text content into pieces.
    fn chunk(
        &self,
        content: &str,
        content_type: ContentType,
        config: &ChunkConfig,
    ) -> Result<Vec<ChunkData>>;
}

/// Raw chunk data before ID assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Chunk text content.
    pub content: String,

    /// Byte offset of the chunk start in the source text.
    pub start: usize,
}
