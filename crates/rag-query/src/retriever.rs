//! Single-pass base retrievers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use rag_core::{
    DegradedReason, Embedder, LexicalIndex, MetadataFilter, NearestOptions, Pool, RagError,
    Result, ScoredChunk, SearchMode, Strategy, VectorIndex,
};

use crate::dedup::dedup_by_fingerprint;
use crate::fusion::hybrid_fusion;

/// Everything a base retriever needs to know about one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPlan {
    pub strategy: Strategy,

    /// Number of chunks to return.
    pub k: usize,

    /// Candidates considered by diversity selection.
    pub fetch_k: usize,

    pub lambda_mult: f32,
    pub score_threshold: f32,
    pub lexical_weight: f32,

    /// Equality filter on chunk metadata.
    pub filter: Option<MetadataFilter>,
}

impl RetrievalPlan {
    fn diversity_mode(&self) -> SearchMode {
        SearchMode::Diversity {
            fetch_k: self.fetch_k.max(self.k),
            lambda_mult: self.lambda_mult,
        }
    }

    fn dense_options(&self, mode: SearchMode) -> NearestOptions {
        NearestOptions::with_mode(mode).filter(self.filter.clone())
    }
}

/// A retrieval operation built for one strategy and budget.
///
/// Holds shared handles to the indexes; cheap to build per query.
pub struct BaseRetriever {
    plan: RetrievalPlan,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    embedding_timeout: Duration,
}

impl BaseRetriever {
    pub fn build(
        plan: RetrievalPlan,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        lexical: Option<Arc<dyn LexicalIndex>>,
        embedding_timeout: Duration,
    ) -> Self {
        Self {
            plan,
            vectors,
            embedder,
            lexical,
            embedding_timeout,
        }
    }

    pub fn plan(&self) -> &RetrievalPlan {
        &self.plan
    }

    /// Run the pass for `query`.
    ///
    /// Dense search failures are errors; a missing or failing lexical index
    /// degrades hybrid search to its dense half.
    pub async fn run(&self, query: &str) -> Result<Pool> {
        let plan = &self.plan;
        if plan.k == 0 {
            return Ok(Pool::default());
        }

        let embedding = self.embed(query).await?;

        let pool = match plan.strategy {
            Strategy::Similarity => Pool::new(self.dense(&embedding, SearchMode::Plain).await?),
            Strategy::Diversity => {
                Pool::new(self.dense(&embedding, plan.diversity_mode()).await?)
            }
            Strategy::Threshold => {
                let mode = SearchMode::Threshold {
                    score_threshold: plan.score_threshold,
                };
                Pool::new(self.dense(&embedding, mode).await?)
            }
            Strategy::Hybrid => self.hybrid(query, &embedding).await?,
        };

        let mut pool = Pool {
            chunks: dedup_by_fingerprint(pool.chunks),
            degraded: pool.degraded,
        };
        pool.truncate(plan.k);

        debug!(
            "{} pass returned {} chunks for {:?}",
            plan.strategy,
            pool.len(),
            query
        );
        Ok(pool)
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        tokio::time::timeout(self.embedding_timeout, self.embedder.embed_query(query))
            .await
            .map_err(|_| RagError::timeout("query embedding", self.embedding_timeout))?
    }

    async fn dense(&self, embedding: &[f32], mode: SearchMode) -> Result<Vec<ScoredChunk>> {
        self.vectors
            .nearest(embedding, self.plan.k, &self.plan.dense_options(mode))
            .await
    }

    async fn hybrid(&self, query: &str, embedding: &[f32]) -> Result<Pool> {
        let plan = &self.plan;

        let Some(lexical) = &self.lexical else {
            warn!("Hybrid search without a lexical index, using diversity search");
            let dense = self.dense(embedding, plan.diversity_mode()).await?;
            return Ok(Pool::degraded(dense, DegradedReason::LexicalIndexUnavailable));
        };

        let (dense, sparse) = tokio::join!(
            self.dense(embedding, plan.diversity_mode()),
            lexical.search(query, plan.k)
        );
        let dense = dense?;

        let sparse = match sparse {
            Ok(results) => results,
            Err(e) => {
                warn!("Lexical search failed, using dense results only: {}", e);
                return Ok(Pool::degraded(
                    dense,
                    DegradedReason::LexicalSearchFailed {
                        message: e.to_string(),
                    },
                ));
            }
        };

        // The lexical index knows nothing about metadata; filter here.
        let sparse: Vec<ScoredChunk> = match &plan.filter {
            Some(filter) => sparse
                .into_iter()
                .filter(|sc| filter.matches(&sc.chunk))
                .collect(),
            None => sparse,
        };

        debug!(
            "Hybrid: {} dense, {} lexical candidates",
            dense.len(),
            sparse.len()
        );

        Ok(Pool::new(hybrid_fusion(
            dense,
            sparse,
            plan.lexical_weight,
            plan.k,
        )))
    }
}
