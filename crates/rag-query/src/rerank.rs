//! Cross-encoder re-ranking.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use rag_core::{DegradedReason, Pool, RelevanceScorer, ScoredChunk};

use crate::fusion::descending;

/// Re-scores candidate pools with a relevance model.
///
/// Every failure mode keeps the incoming order and only truncates.
pub struct Reranker {
    scorer: Option<Arc<dyn RelevanceScorer>>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(scorer: Option<Arc<dyn RelevanceScorer>>, timeout: Duration) -> Self {
        Self { scorer, timeout }
    }

    pub fn is_available(&self) -> bool {
        self.scorer.is_some()
    }

    /// Order `chunks` by relevance to `query`, best first, keeping `top_k`.
    pub async fn rerank(
        &self,
        query: &str,
        mut chunks: Vec<ScoredChunk>,
        top_k: Option<usize>,
    ) -> Pool {
        let limit = top_k.unwrap_or(chunks.len());

        if chunks.len() <= 1 {
            chunks.truncate(limit);
            return Pool::new(chunks);
        }

        let Some(scorer) = &self.scorer else {
            warn!("Reranker unavailable, keeping retrieval order");
            chunks.truncate(limit);
            return Pool::degraded(chunks, DegradedReason::ScorerUnavailable);
        };

        let passages: Vec<&str> = chunks.iter().map(|c| c.chunk.content.as_str()).collect();
        let outcome = tokio::time::timeout(self.timeout, scorer.score(query, &passages)).await;

        let reason = match outcome {
            Ok(Ok(scores)) if scores.len() == chunks.len() => {
                for (chunk, score) in chunks.iter_mut().zip(scores) {
                    chunk.score = Some(score);
                }
                chunks.sort_by(|a, b| {
                    descending(a.score.unwrap_or(f32::NAN), b.score.unwrap_or(f32::NAN))
                });
                chunks.truncate(limit);

                debug!("Reranked {} chunks", chunks.len());
                return Pool::new(chunks);
            }
            Ok(Ok(scores)) => DegradedReason::ScoringFailed {
                message: format!("{} scores for {} passages", scores.len(), chunks.len()),
            },
            Ok(Err(e)) => DegradedReason::ScoringFailed {
                message: e.to_string(),
            },
            Err(_) => DegradedReason::ScoringTimedOut,
        };

        warn!("{}", reason);
        chunks.truncate(limit);
        Pool::degraded(chunks, reason)
    }

    /// Rerank the first `rerank_top_n` chunks of a base pool down to `top_k`.
    ///
    /// Pools of at most one chunk skip scoring.
    pub async fn rerank_pool(
        &self,
        query: &str,
        pool: Pool,
        top_k: usize,
        rerank_top_n: usize,
    ) -> Pool {
        let Pool {
            mut chunks,
            mut degraded,
        } = pool;

        if chunks.len() <= 1 {
            chunks.truncate(top_k);
            return Pool { chunks, degraded };
        }

        chunks.truncate(rerank_top_n);
        let reranked = self.rerank(query, chunks, Some(top_k)).await;
        degraded.extend(reranked.degraded);

        Pool {
            chunks: reranked.chunks,
            degraded,
        }
    }
}
