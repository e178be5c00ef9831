//! Fingerprint deduplication.

use std::collections::HashSet;

use rag_core::ScoredChunk;

/// Drop every chunk whose fingerprint was already seen, keeping the first.
pub fn dedup_by_fingerprint(chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut seen = HashSet::with_capacity(chunks.len());
    chunks
        .into_iter()
        .filter(|sc| seen.insert(sc.chunk.fingerprint()))
        .collect()
}
