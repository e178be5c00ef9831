//! Test fixtures and collaborator doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use rag_core::{
    Chunk, ChunkStore, ContentType, Embedder, LexicalIndex, NearestOptions, RagError,
    RelevanceScorer, Result, ScoredChunk, TextGenerator, VectorIndex,
};
use rag_embed::MockEmbedder;
use rag_store::{FtsLexicalIndex, SqliteStore};

pub struct Fixture {
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub lexical: Arc<dyn LexicalIndex>,
}

fn chunk(document: &str, position: u32, content: &str) -> Chunk {
    Chunk::new(document, position, content)
        .with_metadata("content_type", ContentType::from_path(document).as_str())
}

pub fn corpus() -> Vec<Chunk> {
    vec![
        chunk("scrum.md", 0, "Daily Scrum 15 dakika surer."),
        chunk("scrum.md", 1, "Sprint Review sprint sonunda yapilir."),
        chunk(
            "scrum.md",
            2,
            "Sprint Planning sprint basinda yapilir ve sprint hedefi belirlenir.",
        ),
        chunk(
            "kanban.txt",
            0,
            "Kanban panosunda is akisi gorsellestirilir ve sprint zorunlu degildir.",
        ),
        chunk("kanban.txt", 1, "Kanban takimlari WIP limitleri ile calisir."),
    ]
}

/// In-memory store and lexical index over [`corpus`], embedded with the
/// hashed bag-of-words mock.
pub async fn fixture() -> Fixture {
    let chunks = corpus();
    let embedder = MockEmbedder::with_dimension(1024);

    let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let embeddings = embedder.embed_documents(&texts).await.unwrap();

    let store = SqliteStore::open_memory().unwrap();
    store.insert_chunks(&chunks, &embeddings).await.unwrap();

    Fixture {
        vectors: Arc::new(store),
        embedder: Arc::new(embedder),
        lexical: Arc::new(FtsLexicalIndex::build(chunks).unwrap()),
    }
}

pub struct FailingVectorIndex;

#[async_trait]
impl VectorIndex for FailingVectorIndex {
    async fn nearest(&self, _: &[f32], _: usize, _: &NearestOptions) -> Result<Vec<ScoredChunk>> {
        Err(RagError::database("vector index offline"))
    }
}

pub struct FailingLexicalIndex;

#[async_trait]
impl LexicalIndex for FailingLexicalIndex {
    async fn search(&self, _: &str, _: usize) -> Result<Vec<ScoredChunk>> {
        Err(RagError::database("lexical index offline"))
    }
}

/// Fails for any query containing `poison`, delegates otherwise.
pub struct PoisonedEmbedder {
    pub inner: Arc<dyn Embedder>,
    pub poison: &'static str,
}

#[async_trait]
impl Embedder for PoisonedEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(self.poison) {
            return Err(RagError::embedding(format!("cannot embed {:?}", text)));
        }
        self.inner.embed_query(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Delays queries starting with `prefix`, delegates otherwise.
pub struct DelayedEmbedder {
    pub inner: Arc<dyn Embedder>,
    pub prefix: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl Embedder for DelayedEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.inner.embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.starts_with(self.prefix) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.embed_query(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

pub struct SlowEmbedder;

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![vec![0.0; 4]; texts.len()])
    }

    async fn embed_query(&self, _: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![0.0; 4])
    }

    fn dimension(&self) -> usize {
        4
    }
}

/// Generator returning a fixed reply, failing, or hanging; counts calls.
pub struct ScriptedGenerator {
    reply: std::result::Result<String, String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging() -> Self {
        Self {
            reply: Ok(String::new()),
            delay: Some(Duration::from_secs(5)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(RagError::generation)
    }
}

/// Scores a passage by how many query words it contains.
pub struct WordOverlapScorer;

#[async_trait]
impl RelevanceScorer for WordOverlapScorer {
    async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        Ok(documents
            .iter()
            .map(|d| {
                let d = d.to_lowercase();
                words.iter().filter(|w| d.contains(w.as_str())).count() as f32
            })
            .collect())
    }
}

/// Returns a fixed score vector regardless of input.
pub struct FixedScorer(pub Vec<f32>);

#[async_trait]
impl RelevanceScorer for FixedScorer {
    async fn score(&self, _: &str, _: &[&str]) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

pub struct FailingScorer;

#[async_trait]
impl RelevanceScorer for FailingScorer {
    async fn score(&self, _: &str, _: &[&str]) -> Result<Vec<f32>> {
        Err(RagError::scoring("model crashed"))
    }
}

pub struct SlowScorer;

#[async_trait]
impl RelevanceScorer for SlowScorer {
    async fn score(&self, _: &str, documents: &[&str]) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![1.0; documents.len()])
    }
}
