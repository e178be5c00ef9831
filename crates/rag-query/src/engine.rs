//! Retrieval orchestrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use rag_core::{
    Embedder, LexicalIndex, MetadataFilter, Pool, RagError, RelevanceScorer, Result,
    RetrievalConfig, RetrievalResult, Strategy, StrategyChoice, TermLexicon, TextGenerator,
    VectorIndex,
};

use crate::expansion::{expand_and_merge, QueryExpander};
use crate::rerank::Reranker;
use crate::retriever::{BaseRetriever, RetrievalPlan};
use crate::strategy::{dynamic_k, resolve_strategy};

/// Per-call retrieval switches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalFlags {
    /// Auto selection or a forced strategy.
    pub strategy: StrategyChoice,

    /// Base number of chunks before the dynamic increase.
    pub base_k: usize,

    /// Candidates fetched before diversity selection.
    pub fetch_k: usize,

    /// Diversity trade-off (higher favours relevance).
    pub lambda_mult: f32,

    /// Minimum similarity for threshold search.
    pub score_threshold: f32,

    /// Equality filter on chunk metadata.
    pub metadata_filter: Option<MetadataFilter>,

    /// Weight of the lexical signal in hybrid fusion.
    pub lexical_weight: f32,

    /// Expand the question into paraphrases.
    pub use_multi_query: bool,

    /// Paraphrases to request.
    pub num_queries: usize,

    /// Rerank with the relevance scorer.
    pub use_rerank: bool,

    /// Candidates handed to the reranker.
    pub rerank_top_n: usize,
}

impl Default for RetrievalFlags {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalFlags {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            strategy: config.strategy,
            base_k: config.base_k,
            fetch_k: config.fetch_k,
            lambda_mult: config.lambda_mult,
            score_threshold: config.score_threshold,
            metadata_filter: None,
            lexical_weight: config.lexical_weight,
            use_multi_query: config.use_multi_query,
            num_queries: config.num_queries,
            use_rerank: config.use_rerank,
            rerank_top_n: config.rerank_top_n,
        }
    }
}

impl RetrievalFlags {
    /// Reject flags the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.base_k == 0 {
            return Err(RagError::invalid_argument("base_k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.lambda_mult) {
            return Err(RagError::invalid_argument(format!(
                "lambda_mult must be in [0, 1], got {}",
                self.lambda_mult
            )));
        }
        if !(0.0..=1.0).contains(&self.lexical_weight) {
            return Err(RagError::invalid_argument(format!(
                "lexical_weight must be in [0, 1], got {}",
                self.lexical_weight
            )));
        }
        Ok(())
    }
}

/// Process-wide engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound for the dynamic k.
    pub max_k: usize,

    /// Concurrent passes during query expansion.
    pub max_concurrency: usize,

    pub embedding_timeout: Duration,
    pub generation_timeout: Duration,
    pub scoring_timeout: Duration,

    pub lexicon: TermLexicon,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for EngineOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_k: config.max_k,
            max_concurrency: config.max_concurrency,
            embedding_timeout: Duration::from_secs(config.embedding_timeout_secs),
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
            scoring_timeout: Duration::from_secs(config.scoring_timeout_secs),
            lexicon: config.lexicon.clone(),
        }
    }
}

/// Retrieval strategy engine.
///
/// Picks a strategy and budget per question, runs the base retriever
/// (through query expansion when asked) and optionally reranks.
pub struct RetrievalEngine {
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    lexical: Option<Arc<dyn LexicalIndex>>,
    expander: QueryExpander,
    reranker: Reranker,
    options: EngineOptions,
}

impl RetrievalEngine {
    /// Create an engine without lexical index, generator or scorer.
    pub fn new(
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        options: EngineOptions,
    ) -> Self {
        Self {
            vectors,
            embedder,
            lexical: None,
            expander: QueryExpander::new(None, options.generation_timeout),
            reranker: Reranker::new(None, options.scoring_timeout),
            options,
        }
    }

    /// Lexical index for hybrid search.
    pub fn with_lexical(mut self, lexical: Option<Arc<dyn LexicalIndex>>) -> Self {
        self.lexical = lexical;
        self
    }

    /// Text generator for query expansion.
    pub fn with_generator(mut self, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        self.expander = QueryExpander::new(generator, self.options.generation_timeout);
        self
    }

    /// Relevance scorer for re-ranking.
    pub fn with_scorer(mut self, scorer: Option<Arc<dyn RelevanceScorer>>) -> Self {
        self.reranker = Reranker::new(scorer, self.options.scoring_timeout);
        self
    }

    pub fn has_lexical_index(&self) -> bool {
        self.lexical.is_some()
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_available()
    }

    /// Retrieve the chunks to ground an answer to `question`.
    pub async fn retrieve(&self, question: &str, flags: &RetrievalFlags) -> Result<RetrievalResult> {
        let start = Instant::now();

        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::invalid_argument("question must not be empty"));
        }
        flags.validate()?;

        let lexicon = &self.options.lexicon;
        let k = dynamic_k(question, flags.base_k, self.options.max_k, lexicon);
        let strategy = resolve_strategy(flags.strategy, question, lexicon);

        info!(
            "Retrieving for {:?}: strategy={}, k={}, multi_query={}, rerank={}",
            question, strategy, k, flags.use_multi_query, flags.use_rerank
        );

        let (queries, pool) = if flags.use_multi_query {
            let expansion = self.expander.expand(question, flags.num_queries).await;
            let retriever = self.retriever(self.plan(strategy, k, flags));

            let mut pool = expand_and_merge(
                &retriever,
                &expansion.queries,
                self.options.max_concurrency,
                2 * flags.base_k,
            )
            .await?;
            if let Some(reason) = expansion.degraded {
                pool.degraded.insert(0, reason);
            }

            if flags.use_rerank {
                pool = self
                    .reranker
                    .rerank_pool(question, pool, flags.base_k, flags.rerank_top_n)
                    .await;
            }
            (expansion.queries, pool)
        } else {
            let search_k = if flags.use_rerank {
                flags.rerank_top_n.max(k * 2)
            } else {
                k
            };
            let retriever = self.retriever(self.plan(strategy, search_k, flags));

            let mut pool: Pool = retriever.run(question).await?;
            if flags.use_rerank {
                pool = self
                    .reranker
                    .rerank_pool(question, pool, k, flags.rerank_top_n)
                    .await;
            }
            (vec![question.to_string()], pool)
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        info!(
            "Retrieval completed in {}ms: {} chunks, {} degradations",
            latency_ms,
            pool.len(),
            pool.degraded.len()
        );

        Ok(RetrievalResult {
            question: question.to_string(),
            strategy,
            k,
            queries,
            chunks: pool.chunks,
            degraded: pool.degraded,
            latency_ms,
        })
    }

    fn plan(&self, strategy: Strategy, k: usize, flags: &RetrievalFlags) -> RetrievalPlan {
        RetrievalPlan {
            strategy,
            k,
            fetch_k: flags.fetch_k,
            lambda_mult: flags.lambda_mult,
            score_threshold: flags.score_threshold,
            lexical_weight: flags.lexical_weight,
            filter: flags.metadata_filter.clone(),
        }
    }

    fn retriever(&self, plan: RetrievalPlan) -> BaseRetriever {
        BaseRetriever::build(
            plan,
            self.vectors.clone(),
            self.embedder.clone(),
            self.lexical.clone(),
            self.options.embedding_timeout,
        )
    }
}
