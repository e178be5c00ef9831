//! Query expansion: paraphrase generation and multi-pass merging.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use rag_core::{DegradedReason, Pool, RagError, Result, TextGenerator};
use rag_llm::prompts::paraphrase_prompt;

use crate::dedup::dedup_by_fingerprint;
use crate::retriever::BaseRetriever;

/// Paraphrase lines shorter than this are discarded.
const MIN_PARAPHRASE_CHARS: usize = 6;

/// Queries to search, original question first.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub queries: Vec<String>,
    pub degraded: Option<DegradedReason>,
}

impl Expansion {
    fn original_only(question: &str, reason: DegradedReason) -> Self {
        Self {
            queries: vec![question.to_string()],
            degraded: Some(reason),
        }
    }
}

/// Parse generator output into at most `num_queries` paraphrases.
///
/// One paraphrase per line; leading enumeration markers are stripped.
pub fn parse_paraphrases(text: &str, num_queries: usize) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || ".-) ".contains(c))
                .trim()
        })
        .filter(|line| line.chars().count() >= MIN_PARAPHRASE_CHARS)
        .take(num_queries)
        .map(str::to_string)
        .collect()
}

/// Rewrites a question into paraphrases with a text generator.
pub struct QueryExpander {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Expand `question` into itself plus up to `num_queries` paraphrases.
    ///
    /// Never fails: generation errors and timeouts fall back to the original
    /// question with a degradation.
    pub async fn expand(&self, question: &str, num_queries: usize) -> Expansion {
        let Some(generator) = &self.generator else {
            warn!("Query expansion requested without a text generator");
            return Expansion::original_only(
                question,
                DegradedReason::ExpansionFailed {
                    message: "no text generator configured".to_string(),
                },
            );
        };

        if num_queries == 0 {
            return Expansion {
                queries: vec![question.to_string()],
                degraded: None,
            };
        }

        let prompt = paraphrase_prompt(question, num_queries);
        let output = match tokio::time::timeout(self.timeout, generator.complete(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Paraphrase generation failed, using original question: {}", e);
                return Expansion::original_only(
                    question,
                    DegradedReason::ExpansionFailed {
                        message: e.to_string(),
                    },
                );
            }
            Err(_) => {
                warn!(
                    "Paraphrase generation timed out after {:?}, using original question",
                    self.timeout
                );
                return Expansion::original_only(question, DegradedReason::ExpansionTimedOut);
            }
        };

        let mut queries = vec![question.to_string()];
        queries.extend(parse_paraphrases(&output, num_queries));

        info!("Expanded question into {} queries", queries.len());
        for (i, q) in queries.iter().enumerate().skip(1) {
            debug!("  paraphrase {}: {:?}", i, q);
        }

        Expansion {
            queries,
            degraded: None,
        }
    }
}

/// Run one base pass per query and merge the pools.
///
/// Passes run concurrently, at most `max_concurrency` at a time, and are
/// merged in query order, so earlier queries win ties. The merged pool is
/// deduplicated by fingerprint and cut to `limit`. A failed pass is dropped
/// with a degradation; the first error is returned only if every pass failed.
pub async fn expand_and_merge(
    retriever: &BaseRetriever,
    queries: &[String],
    max_concurrency: usize,
    limit: usize,
) -> Result<Pool> {
    let outcomes: Vec<Result<Pool>> = stream::iter(queries.iter().map(|q| retriever.run(q)))
        .buffered(max_concurrency.max(1))
        .collect()
        .await;

    let mut merged = Pool::default();
    let mut first_error: Option<RagError> = None;
    let mut succeeded = 0usize;

    for (query, outcome) in queries.iter().zip(outcomes) {
        match outcome {
            Ok(pool) => {
                succeeded += 1;
                merged.chunks.extend(pool.chunks);
                for reason in pool.degraded {
                    if !merged.degraded.contains(&reason) {
                        merged.degraded.push(reason);
                    }
                }
            }
            Err(e) => {
                warn!("Retrieval for {:?} failed, dropping it: {}", query, e);
                merged.degraded.push(DegradedReason::ExpansionPassFailed {
                    query: query.clone(),
                    message: e.to_string(),
                });
                first_error.get_or_insert(e);
            }
        }
    }

    if succeeded == 0 {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let total = merged.len();
    merged.chunks = dedup_by_fingerprint(merged.chunks);
    let unique = merged.len();
    merged.truncate(limit);

    info!(
        "Merged {} passes: {} chunks, {} unique, using {}",
        succeeded,
        total,
        unique,
        merged.len()
    );
    Ok(merged)
}
