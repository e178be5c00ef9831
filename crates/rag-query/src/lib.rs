//! rag-query - Retrieval strategy engine
//!
//! Decides per question how to fetch grounding chunks from the dense and
//! lexical indexes.
//!
//! # Features
//!
//! - Dynamic result budget and strategy selection from the question text
//! - Similarity, diversity (MMR), threshold and hybrid dense+lexical passes
//! - Weighted min-max score fusion for hybrid search
//! - Optional paraphrase expansion with bounded concurrent passes
//! - Optional cross-encoder re-ranking
//! - Degradation reported as data instead of errors
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_query::{EngineOptions, RetrievalEngine, RetrievalFlags};
//! use std::sync::Arc;
//!
//! let engine = RetrievalEngine::new(Arc::new(store), Arc::new(embedder), EngineOptions::default())
//!     .with_lexical(Some(Arc::new(lexical)));
//! let result = engine.retrieve("Daily Scrum ne kadar surer?", &RetrievalFlags::default()).await?;
//! ```

mod dedup;
mod engine;
mod expansion;
mod fusion;
mod rerank;
mod retriever;
mod strategy;

#[cfg(test)]
mod testing;

pub use dedup::dedup_by_fingerprint;
pub use engine::{EngineOptions, RetrievalEngine, RetrievalFlags};
pub use expansion::{expand_and_merge, parse_paraphrases, Expansion, QueryExpander};
pub use fusion::{fuse_scores, hybrid_fusion, min_max_normalize};
pub use rerank::Reranker;
pub use retriever::{BaseRetriever, RetrievalPlan};
pub use strategy::{dynamic_k, indicator_score, resolve_strategy, select_strategy};

pub use rag_core::{RetrievalResult, Strategy, StrategyChoice};
