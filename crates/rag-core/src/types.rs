//! Core domain types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::RagError;

/// Number of leading characters of a chunk that take part in its fingerprint.
pub const FINGERPRINT_PREFIX_CHARS: usize = 100;

/// Content type of an ingested document, selects chunk separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Markdown,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" => Self::Markdown,
            "txt" | "text" => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect content type from file path.
    pub fn from_path(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext),
            None => Self::Unknown,
        }
    }

    /// Stable lowercase name, stored in chunk metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::PlainText => "plaintext",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Markdown => "Markdown",
            Self::PlainText => "Plain Text",
            Self::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// Where a chunk came from: the originating document and its position in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Originating document identifier (usually a file URI).
    pub document: String,

    /// Index of the chunk within the document (0-based).
    pub position: u32,
}

impl SourceRef {
    pub fn new(document: impl Into<String>, position: u32) -> Self {
        Self {
            document: document.into(),
            position,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.position)
    }
}

/// An immutable unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Provenance of the chunk.
    pub source: SourceRef,

    /// Chunk text content.
    pub content: String,

    /// Ingestion metadata, matched by metadata filters.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Create a new chunk with a fresh id and no metadata.
    pub fn new(document: &str, position: u32, content: &str) -> Self {
        Self {
            id: Ulid::new(),
            source: SourceRef::new(document, position),
            content: content.to_string(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Content+source fingerprint used for pool deduplication.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.content, &self.source)
    }
}

/// Hash of a chunk's leading content and its source identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(content: &str, source: &SourceRef) -> Self {
        let prefix_end = content
            .char_indices()
            .nth(FINGERPRINT_PREFIX_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(content.len());

        let mut hasher = blake3::Hasher::new();
        hasher.update(content[..prefix_end].as_bytes());
        hasher.update(&[0]);
        hasher.update(source.to_string().as_bytes());
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A chunk together with the score the producing operation assigned to it.
///
/// Scores are only comparable within one pool: cosine similarity, BM25,
/// fused or cross-encoder scores all land here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: Option<f32>,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            score: Some(score),
        }
    }

    pub fn unscored(chunk: Chunk) -> Self {
        Self { chunk, score: None }
    }
}

/// Equality conjunction over chunk metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(pub HashMap<String, serde_json::Value>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn eq(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether a chunk satisfies every condition.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| chunk.metadata.get(key) == Some(expected))
    }
}

/// Single-pass retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Plain dense nearest-neighbour search.
    Similarity,
    /// Maximal marginal relevance over a larger dense candidate set.
    #[serde(alias = "mmr")]
    Diversity,
    /// Dense diversity search fused with lexical search.
    Hybrid,
    /// Dense search keeping only results above a similarity threshold.
    Threshold,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Diversity => "diversity",
            Self::Hybrid => "hybrid",
            Self::Threshold => "threshold",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested strategy: resolved from the question, or forced by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StrategyChoice {
    #[default]
    Auto,
    Fixed(Strategy),
}

impl TryFrom<String> for StrategyChoice {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StrategyChoice> for String {
    fn from(choice: StrategyChoice) -> Self {
        choice.to_string()
    }
}

impl FromStr for StrategyChoice {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "similarity" => Ok(Self::Fixed(Strategy::Similarity)),
            "diversity" | "mmr" => Ok(Self::Fixed(Strategy::Diversity)),
            "hybrid" => Ok(Self::Fixed(Strategy::Hybrid)),
            "threshold" => Ok(Self::Fixed(Strategy::Threshold)),
            other => Err(RagError::invalid_argument(format!(
                "unknown strategy '{}' (expected auto, similarity, diversity, hybrid or threshold)",
                other
            ))),
        }
    }
}

impl fmt::Display for StrategyChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed(strategy) => strategy.fmt(f),
        }
    }
}

/// Why a component returned a smaller or less refined pool than requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedReason {
    /// Hybrid search requested without a lexical index; ran diversity search.
    LexicalIndexUnavailable,
    /// Lexical search failed; hybrid fell back to its dense half.
    LexicalSearchFailed { message: String },
    /// No relevance scorer is loaded; kept retrieval order.
    ScorerUnavailable,
    /// The relevance scorer returned an error; kept retrieval order.
    ScoringFailed { message: String },
    /// The relevance scorer did not answer in time; kept retrieval order.
    ScoringTimedOut,
    /// Paraphrase generation failed; searched the original question only.
    ExpansionFailed { message: String },
    /// Paraphrase generation did not answer in time.
    ExpansionTimedOut,
    /// A retrieval pass for one expanded query failed and was dropped.
    ExpansionPassFailed { query: String, message: String },
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LexicalIndexUnavailable => {
                write!(f, "lexical index unavailable, used diversity search")
            }
            Self::LexicalSearchFailed { message } => {
                write!(f, "lexical search failed ({}), used dense results only", message)
            }
            Self::ScorerUnavailable => write!(f, "reranker unavailable, kept retrieval order"),
            Self::ScoringFailed { message } => {
                write!(f, "reranking failed ({}), kept retrieval order", message)
            }
            Self::ScoringTimedOut => write!(f, "reranking timed out, kept retrieval order"),
            Self::ExpansionFailed { message } => {
                write!(f, "query expansion failed ({}), used original question", message)
            }
            Self::ExpansionTimedOut => {
                write!(f, "query expansion timed out, used original question")
            }
            Self::ExpansionPassFailed { query, message } => {
                write!(f, "retrieval for {:?} failed: {}", query, message)
            }
        }
    }
}

/// Ordered chunks plus the degradations met while producing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pool {
    pub chunks: Vec<ScoredChunk>,
    pub degraded: Vec<DegradedReason>,
}

impl Pool {
    pub fn new(chunks: Vec<ScoredChunk>) -> Self {
        Self {
            chunks,
            degraded: Vec::new(),
        }
    }

    pub fn degraded(chunks: Vec<ScoredChunk>, reason: DegradedReason) -> Self {
        Self {
            chunks,
            degraded: vec![reason],
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.chunks.truncate(len);
    }
}

/// Final output of one retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The original question.
    pub question: String,

    /// Strategy used for the base passes.
    pub strategy: Strategy,

    /// Resolved result budget.
    pub k: usize,

    /// Queries actually searched, original first.
    pub queries: Vec<String>,

    /// Final ordered chunks.
    pub chunks: Vec<ScoredChunk>,

    /// Recoveries performed along the way.
    pub degraded: Vec<DegradedReason>,

    /// Retrieval latency in milliseconds.
    pub latency_ms: u64,
}

/// Statistics about the chunk store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Number of distinct source documents.
    pub documents: u64,

    /// Number of chunks.
    pub chunks: u64,

    /// Database size in bytes.
    pub storage_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_path() {
        assert_eq!(ContentType::from_path("notes/scrum.md"), ContentType::Markdown);
        assert_eq!(ContentType::from_path("guide.txt"), ContentType::PlainText);
        assert_eq!(ContentType::from_path("no_extension"), ContentType::Unknown);
    }

    #[test]
    fn test_fingerprint_uses_content_prefix_and_source() {
        let head = "x".repeat(FINGERPRINT_PREFIX_CHARS);
        let a = Chunk::new("file://a.md", 0, &format!("{}tail one", head));
        let b = Chunk::new("file://a.md", 0, &format!("{}tail two", head));
        let c = Chunk::new("file://b.md", 0, &format!("{}tail one", head));

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_respects_char_boundaries() {
        let text = "ğ".repeat(150);
        let a = Chunk::new("doc", 1, &text);
        let b = Chunk::new("doc", 1, &"ğ".repeat(FINGERPRINT_PREFIX_CHARS));
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_metadata_filter() {
        let chunk = Chunk::new("doc", 0, "text").with_metadata("content_type", "markdown");
        assert!(MetadataFilter::new().matches(&chunk));
        assert!(MetadataFilter::new().eq("content_type", "markdown").matches(&chunk));
        assert!(!MetadataFilter::new().eq("content_type", "plaintext").matches(&chunk));
        assert!(!MetadataFilter::new().eq("page", 3).matches(&chunk));
    }

    #[test]
    fn test_strategy_choice_from_str() {
        assert_eq!("auto".parse::<StrategyChoice>().unwrap(), StrategyChoice::Auto);
        assert_eq!(
            "MMR".parse::<StrategyChoice>().unwrap(),
            StrategyChoice::Fixed(Strategy::Diversity)
        );
        assert_eq!(
            "hybrid".parse::<StrategyChoice>().unwrap(),
            StrategyChoice::Fixed(Strategy::Hybrid)
        );
        assert!("bm25".parse::<StrategyChoice>().is_err());
    }
}
