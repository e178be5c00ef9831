//! rag-chunk - Text chunking
//!
//! Splits documents into overlapping, size-bounded pieces for embedding.
//!
//! # Example
//!
//! ```rust
//! use rag_chunk::{Chunker, RecursiveChunker};
//! use rag_core::{ChunkConfig, ContentType};
//!
//! let chunker = RecursiveChunker::new();
//! let config = ChunkConfig::default();
//! let chunks = chunker.chunk("Hello world", ContentType::PlainText, &config).unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```

mod recursive;

pub use recursive::RecursiveChunker;

pub use rag_core::{ChunkConfig, ChunkData, Chunker, ContentType};
