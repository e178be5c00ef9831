//! rag-store - SQLite storage and indexes
//!
//! This crate provides the persistent chunk store with exact dense search
//! (plain, diversity and threshold modes) and the in-memory FTS5 lexical
//! index used by hybrid retrieval.

mod lexical;
mod schema;
mod similarity;
mod sqlite;

pub use lexical::FtsLexicalIndex;
pub use similarity::{cosine_similarity, maximal_marginal_relevance};
pub use sqlite::SqliteStore;

// Re-export schema for testing/migrations
pub use schema::SCHEMA;
