//! Configuration types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::StrategyChoice;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Cross-encoder reranker configuration.
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Retrieval defaults.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Text generator configuration.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model directory (`model.onnx` + `tokenizer.json`).
    /// When the directory is missing the deterministic mock embedder is used.
    #[serde(default = "default_embedding_model_path")]
    pub model_path: PathBuf,

    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per input.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Prefix prepended to queries (e.g. "search_query: " for nomic models).
    #[serde(default)]
    pub query_prefix: String,

    /// Prefix prepended to documents.
    #[serde(default)]
    pub document_prefix: String,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Batch size for document embedding during ingestion.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: default_embedding_model_path(),
            dimension: default_dimension(),
            max_tokens: default_embedding_max_tokens(),
            query_prefix: String::new(),
            document_prefix: String::new(),
            num_threads: default_num_threads(),
            batch_size: default_batch_size(),
        }
    }
}

/// Cross-encoder reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Try to load the reranker at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Path to the ONNX model directory (`model.onnx` + `tokenizer.json`).
    #[serde(default = "default_reranker_model_path")]
    pub model_path: PathBuf,

    /// Maximum tokens per (query, passage) pair.
    #[serde(default = "default_reranker_max_tokens")]
    pub max_tokens: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: default_reranker_model_path(),
            max_tokens: default_reranker_max_tokens(),
            num_threads: default_num_threads(),
        }
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of overlap between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Retrieval defaults, overridable per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// "auto", "similarity", "diversity" (alias "mmr"), "hybrid" or "threshold".
    #[serde(default)]
    pub strategy: StrategyChoice,

    /// Base number of chunks per query.
    #[serde(default = "default_base_k")]
    pub base_k: usize,

    /// Upper bound for the dynamic k.
    #[serde(default = "default_max_k")]
    pub max_k: usize,

    /// Candidates fetched before diversity selection.
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    /// Diversity trade-off, higher favours relevance.
    #[serde(default = "default_lambda_mult")]
    pub lambda_mult: f32,

    /// Minimum similarity for threshold search.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// Weight of the lexical signal in hybrid fusion.
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    /// Expand the question into paraphrases.
    #[serde(default)]
    pub use_multi_query: bool,

    /// Number of paraphrases to request.
    #[serde(default = "default_num_queries")]
    pub num_queries: usize,

    /// Rerank candidates with the cross-encoder.
    #[serde(default)]
    pub use_rerank: bool,

    /// Candidates handed to the reranker.
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Concurrent retrieval passes during query expansion.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Timeout for paraphrase generation.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Timeout for relevance scoring.
    #[serde(default = "default_scoring_timeout")]
    pub scoring_timeout_secs: u64,

    /// Timeout for query embedding.
    #[serde(default = "default_embedding_timeout")]
    pub embedding_timeout_secs: u64,

    /// Terms driving dynamic k and strategy selection.
    #[serde(default)]
    pub lexicon: TermLexicon,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyChoice::Auto,
            base_k: default_base_k(),
            max_k: default_max_k(),
            fetch_k: default_fetch_k(),
            lambda_mult: default_lambda_mult(),
            score_threshold: default_score_threshold(),
            lexical_weight: default_lexical_weight(),
            use_multi_query: false,
            num_queries: default_num_queries(),
            use_rerank: false,
            rerank_top_n: default_rerank_top_n(),
            max_concurrency: default_max_concurrency(),
            generation_timeout_secs: default_generation_timeout(),
            scoring_timeout_secs: default_scoring_timeout(),
            embedding_timeout_secs: default_embedding_timeout(),
            lexicon: TermLexicon::default(),
        }
    }
}

/// Lower-case substrings matched against the lower-cased question.
///
/// Defaults target an ASCII-folded Turkish corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermLexicon {
    /// Complexity indicators ("and", "why", "how", "which", "when", "who").
    #[serde(default = "default_indicator_terms")]
    pub indicators: Vec<String>,

    /// Exact/numeric fact markers ("how many", "duration", "when", "minutes").
    #[serde(default = "default_numeric_terms")]
    pub numeric: Vec<String>,

    /// Explanatory markers ("why", "how").
    #[serde(default = "default_explanatory_terms")]
    pub explanatory: Vec<String>,
}

impl Default for TermLexicon {
    fn default() -> Self {
        Self {
            indicators: default_indicator_terms(),
            numeric: default_numeric_terms(),
            explanatory: default_explanatory_terms(),
        }
    }
}

impl TermLexicon {
    /// English term set.
    pub fn english() -> Self {
        Self {
            indicators: strings(&["and", "why", "how", "which", "when", "who"]),
            numeric: strings(&["how many", "duration", "when", "minutes"]),
            explanatory: strings(&["why", "how"]),
        }
    }
}

/// Text generator configuration (Ollama).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Ollama base URL.
    #[serde(default = "default_generator_url")]
    pub base_url: String,

    /// Model name.
    #[serde(default = "default_generator_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_generator_url(),
            model: default_generator_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_dimension() -> usize {
    1024
}

fn default_embedding_max_tokens() -> usize {
    8192
}

fn default_reranker_max_tokens() -> usize {
    512
}

fn default_num_threads() -> usize {
    4
}

fn default_batch_size() -> usize {
    32
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    120
}

fn default_base_k() -> usize {
    6
}

fn default_max_k() -> usize {
    12
}

fn default_fetch_k() -> usize {
    20
}

fn default_lambda_mult() -> f32 {
    0.7
}

fn default_score_threshold() -> f32 {
    0.75
}

fn default_lexical_weight() -> f32 {
    0.3
}

fn default_num_queries() -> usize {
    3
}

fn default_rerank_top_n() -> usize {
    20
}

fn default_max_concurrency() -> usize {
    4
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_scoring_timeout() -> u64 {
    30
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_indicator_terms() -> Vec<String> {
    strings(&["ve", "neden", "nasil", "hangi", "ne zaman", "kim"])
}

fn default_numeric_terms() -> Vec<String> {
    strings(&["kac", "sure", "ne zaman", "dakika"])
}

fn default_explanatory_terms() -> Vec<String> {
    strings(&["neden", "nasil"])
}

fn default_generator_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_generator_model() -> String {
    "llama3:8b".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_request_timeout() -> u64 {
    120
}

fn strings(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rag")
}

fn default_database_path() -> PathBuf {
    data_dir().join("rag.db")
}

fn default_embedding_model_path() -> PathBuf {
    data_dir().join("models").join("bge-m3")
}

fn default_reranker_model_path() -> PathBuf {
    data_dir().join("models").join("bge-reranker-base")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::RagError::config(format!("Failed to parse config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("rag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        // Return defaults
        Ok(Self::default())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let r = &self.retrieval;
        if r.base_k == 0 {
            return Err(crate::error::RagError::config("retrieval.base_k must be at least 1"));
        }
        if r.max_k < r.base_k {
            return Err(crate::error::RagError::config(
                "retrieval.max_k must not be smaller than retrieval.base_k",
            ));
        }
        if !(0.0..=1.0).contains(&r.lambda_mult) {
            return Err(crate::error::RagError::config(
                "retrieval.lambda_mult must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&r.lexical_weight) {
            return Err(crate::error::RagError::config(
                "retrieval.lexical_weight must be within [0, 1]",
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(crate::error::RagError::config(
                "chunking.chunk_overlap must be smaller than chunking.chunk_size",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Strategy;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.retrieval.base_k, 6);
        assert_eq!(config.retrieval.max_k, 12);
        assert_eq!(config.retrieval.fetch_k, 20);
        assert_eq!(config.retrieval.strategy, StrategyChoice::Auto);
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.generator.model, "llama3:8b");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: RagConfig = toml::from_str(
            r#"
            [retrieval]
            strategy = "mmr"
            base_k = 4
            use_rerank = true

            [retrieval.lexicon]
            numeric = ["how many", "minutes"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.retrieval.strategy,
            StrategyChoice::Fixed(Strategy::Diversity)
        );
        assert_eq!(config.retrieval.base_k, 4);
        assert_eq!(config.retrieval.rerank_top_n, 20);
        assert!(config.retrieval.use_rerank);
        assert_eq!(config.retrieval.lexicon.numeric, vec!["how many", "minutes"]);
        assert_eq!(config.retrieval.lexicon.explanatory, vec!["neden", "nasil"]);
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let parsed: std::result::Result<RagConfig, _> = toml::from_str(
            r#"
            [retrieval]
            strategy = "fulltext"
            "#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = RagConfig::default();
        config.retrieval.max_k = 2;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.retrieval.lexical_weight = 1.5;
        assert!(config.validate().is_err());
    }
}
