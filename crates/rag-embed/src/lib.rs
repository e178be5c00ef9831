//! rag-embed - ONNX model wrappers
//!
//! Text embeddings for dense retrieval and cross-encoder relevance scoring
//! for re-ranking, both running on ONNX Runtime.
//!
//! # Features
//!
//! - Configurable query/document prefixes for asymmetric retrieval
//! - Mean pooling with attention mask and L2 normalization
//! - Sigmoid-calibrated cross-encoder scores
//! - A model-free hashed embedder for tests and offline use

mod cross_encoder;
mod mock;
mod onnx;
mod session;

pub use cross_encoder::OnnxCrossEncoder;
pub use mock::MockEmbedder;
pub use onnx::OnnxEmbedder;

pub use rag_core::{Embedder, RelevanceScorer};
