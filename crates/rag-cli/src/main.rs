//! rag - CLI for the retrieval engine
//!
//! Usage:
//!   rag init                         Create the database
//!   rag ingest <path> [-r]           Ingest markdown and text files
//!   rag remove <document>            Remove a document's chunks
//!   rag retrieve <question>          Print retrieved chunks
//!   rag ask <question>               Retrieve and answer
//!   rag chat                         Interactive question loop
//!   rag stats                        Show database statistics

mod ingest;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rag_chunk::RecursiveChunker;
use rag_core::{
    ChunkConfig, ChunkStore, Embedder, EmbeddingConfig, LexicalIndex, MetadataFilter, RagConfig,
    RagError, RelevanceScorer, RetrievalResult, StrategyChoice, TextGenerator,
};
use rag_embed::{MockEmbedder, OnnxCrossEncoder, OnnxEmbedder};
use rag_llm::{prompts::NOT_FOUND_ANSWER, OllamaGenerator};
use rag_query::{EngineOptions, RetrievalEngine, RetrievalFlags};
use rag_store::{FtsLexicalIndex, SqliteStore};

use crate::ingest::{collect_files, Ingestor};

#[derive(Parser)]
#[command(name = "rag")]
#[command(about = "Adaptive retrieval over local markdown and text documents")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config dir, then ./rag.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database
    Init,

    /// Ingest a file or directory
    Ingest {
        /// File or directory path
        path: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Remove every chunk of a document
    Remove {
        /// Document path as it was ingested
        document: String,
    },

    /// Retrieve chunks for a question
    Retrieve {
        question: String,

        #[command(flatten)]
        flags: FlagArgs,
    },

    /// Retrieve and answer a question
    Ask {
        question: String,

        #[command(flatten)]
        flags: FlagArgs,
    },

    /// Answer questions interactively
    Chat {
        #[command(flatten)]
        flags: FlagArgs,
    },

    /// Show database statistics
    Stats,
}

/// Per-call overrides of the `[retrieval]` config section.
#[derive(Args, Clone, Default)]
struct FlagArgs {
    /// auto, similarity, diversity (mmr), hybrid or threshold
    #[arg(short, long)]
    strategy: Option<String>,

    /// Base number of chunks
    #[arg(short = 'k', long)]
    base_k: Option<usize>,

    /// Candidates fetched before diversity selection
    #[arg(long)]
    fetch_k: Option<usize>,

    /// Diversity trade-off in [0, 1], higher favours relevance
    #[arg(long)]
    lambda_mult: Option<f32>,

    /// Minimum similarity for threshold search
    #[arg(long)]
    score_threshold: Option<f32>,

    /// Weight of the lexical signal in hybrid search
    #[arg(long)]
    lexical_weight: Option<f32>,

    /// Metadata equality filter, key=value (repeatable)
    #[arg(short, long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// Expand the question into paraphrases
    #[arg(long)]
    multi_query: bool,

    /// Paraphrases to request
    #[arg(long)]
    num_queries: Option<usize>,

    /// Rerank with the cross-encoder
    #[arg(long)]
    rerank: bool,

    /// Candidates handed to the reranker
    #[arg(long)]
    rerank_top_n: Option<usize>,
}

impl FlagArgs {
    fn apply(&self, mut flags: RetrievalFlags) -> Result<RetrievalFlags, RagError> {
        if let Some(strategy) = &self.strategy {
            flags.strategy = strategy.parse::<StrategyChoice>()?;
        }
        if let Some(k) = self.base_k {
            flags.base_k = k;
        }
        if let Some(fetch_k) = self.fetch_k {
            flags.fetch_k = fetch_k;
        }
        if let Some(lambda) = self.lambda_mult {
            flags.lambda_mult = lambda;
        }
        if let Some(threshold) = self.score_threshold {
            flags.score_threshold = threshold;
        }
        if let Some(weight) = self.lexical_weight {
            flags.lexical_weight = weight;
        }
        if !self.filters.is_empty() {
            flags.metadata_filter = Some(parse_filter(&self.filters)?);
        }
        if self.multi_query {
            flags.use_multi_query = true;
        }
        if let Some(n) = self.num_queries {
            flags.num_queries = n;
        }
        if self.rerank {
            flags.use_rerank = true;
        }
        if let Some(n) = self.rerank_top_n {
            flags.rerank_top_n = n;
        }
        flags.validate()?;
        Ok(flags)
    }
}

fn parse_filter(pairs: &[String]) -> Result<MetadataFilter, RagError> {
    pairs.iter().try_fold(MetadataFilter::new(), |filter, pair| {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            RagError::invalid_argument(format!("filter '{}' is not key=value", pair))
        })?;
        Ok(filter.eq(key.trim(), value.trim()))
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::load_default()?,
    };
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }

    match cli.command {
        Commands::Init => {
            init_database(&config.database.path)?;
        }

        Commands::Ingest { path, recursive } => {
            let store = open_store(&config.database.path)?;
            let (embedder, embedder_id) = load_embedder(&config);
            store.claim_embedder(&embedder_id)?;
            let chunker = RecursiveChunker;

            let ingestor = Ingestor {
                store: &store,
                embedder: embedder.as_ref(),
                chunker: &chunker,
                config: ChunkConfig {
                    chunk_size: config.chunking.chunk_size,
                    chunk_overlap: config.chunking.chunk_overlap,
                },
                batch_size: config.embedding.batch_size,
            };

            let files = collect_files(&path, recursive)?;
            if files.is_empty() {
                println!("No markdown or text files found at {:?}", path);
                return Ok(());
            }

            println!("Ingesting {} files...", files.len());

            let mut success = 0;
            let mut failed = 0;

            for file_path in &files {
                match ingestor.ingest_file(file_path).await {
                    Ok(chunks) => {
                        println!("  {} - {} chunks", file_path.display(), chunks);
                        success += 1;
                    }
                    Err(e) => {
                        println!("  {} - ERROR: {}", file_path.display(), e);
                        failed += 1;
                    }
                }
            }

            println!("\nComplete: {} succeeded, {} failed", success, failed);
        }

        Commands::Remove { document } => {
            let store = open_store(&config.database.path)?;
            let removed = store.delete_source(&document).await?;
            if removed == 0 {
                println!("No chunks stored for '{}'", document);
            } else {
                println!("Removed {} chunks of '{}'", removed, document);
            }
        }

        Commands::Retrieve { question, flags } => {
            let flags = flags.apply(RetrievalFlags::from(&config.retrieval))?;
            let engine = build_engine(&config).await?;

            let result = engine.retrieve(&question, &flags).await?;
            print_result(&result);
        }

        Commands::Ask { question, flags } => {
            let flags = flags.apply(RetrievalFlags::from(&config.retrieval))?;
            let engine = build_engine(&config).await?;
            let generator = OllamaGenerator::new(config.generator.clone())?;

            let answer = ask(&engine, &generator, &question, &flags).await?;
            println!("{}", answer);
        }

        Commands::Chat { flags } => {
            let flags = flags.apply(RetrievalFlags::from(&config.retrieval))?;
            let engine = build_engine(&config).await?;
            let generator = OllamaGenerator::new(config.generator.clone())?;

            chat(&engine, &generator, &flags).await?;
        }

        Commands::Stats => {
            let store = open_store(&config.database.path)?;
            let stats = store.stats().await?;

            println!("Database Statistics");
            println!("===================");
            println!("Documents:   {}", stats.documents);
            println!("Chunks:      {}", stats.chunks);
            println!("Storage:     {}", format_bytes(stats.storage_bytes));
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    // Ignore the error if a subscriber is already installed
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn init_database(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let _store = SqliteStore::open(path)?;
    println!("Initialized database at {:?}", path);
    Ok(())
}

fn open_store(path: &Path) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteStore::open(path)?)
}

/// The ONNX embedder when its model is installed, the mock otherwise,
/// together with the identity recorded in the store.
fn load_embedder(config: &RagConfig) -> (Arc<dyn Embedder>, String) {
    let embedding = &config.embedding;
    let mock = || -> (Arc<dyn Embedder>, String) {
        (
            Arc::new(MockEmbedder::with_dimension(embedding.dimension)),
            mock_embedder_id(embedding.dimension),
        )
    };

    if !embedding.model_path.exists() {
        warn!(
            "Embedding model not found at {:?}, using the mock embedder",
            embedding.model_path
        );
        return mock();
    }

    match OnnxEmbedder::from_config(embedding) {
        Ok(embedder) => (Arc::new(embedder), onnx_embedder_id(embedding)),
        Err(e) => {
            warn!("Failed to load embedding model, using the mock embedder: {}", e);
            mock()
        }
    }
}

fn mock_embedder_id(dimension: usize) -> String {
    format!("mock-hash:{}", dimension)
}

fn onnx_embedder_id(config: &EmbeddingConfig) -> String {
    let model = config
        .model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| config.model_path.display().to_string());
    format!("onnx:{}:{}", model, config.dimension)
}

fn load_scorer(config: &RagConfig) -> Option<Arc<dyn RelevanceScorer>> {
    let reranker = &config.reranker;
    if !reranker.enabled {
        return None;
    }
    if !reranker.model_path.exists() {
        info!("No reranker model at {:?}", reranker.model_path);
        return None;
    }

    match OnnxCrossEncoder::from_config(reranker) {
        Ok(scorer) => Some(Arc::new(scorer)),
        Err(e) => {
            warn!("Failed to load reranker, continuing without it: {}", e);
            None
        }
    }
}

/// Wire the engine over the stored corpus.
async fn build_engine(config: &RagConfig) -> Result<RetrievalEngine, Box<dyn std::error::Error>> {
    let store = Arc::new(open_store(&config.database.path)?);
    let (embedder, embedder_id) = load_embedder(config);
    store.check_embedder(&embedder_id)?;

    let lexical: Option<Arc<dyn LexicalIndex>> =
        match FtsLexicalIndex::build(store.all_chunks().await?) {
            Ok(index) => Some(Arc::new(index)),
            Err(RagError::EmptyCorpus { .. }) => {
                warn!("No chunks stored yet, hybrid search is disabled");
                None
            }
            Err(e) => return Err(e.into()),
        };

    let generator: Arc<dyn TextGenerator> =
        Arc::new(OllamaGenerator::new(config.generator.clone())?);

    let engine = RetrievalEngine::new(
        store,
        embedder,
        EngineOptions::from(&config.retrieval),
    )
    .with_lexical(lexical)
    .with_generator(Some(generator))
    .with_scorer(load_scorer(config));

    info!(
        "Engine ready (lexical index: {}, reranker: {})",
        engine.has_lexical_index(),
        engine.has_reranker()
    );
    Ok(engine)
}

async fn ask(
    engine: &RetrievalEngine,
    generator: &OllamaGenerator,
    question: &str,
    flags: &RetrievalFlags,
) -> Result<String, RagError> {
    let result = engine.retrieve(question, flags).await?;
    for reason in &result.degraded {
        warn!("{}", reason);
    }

    if result.chunks.is_empty() {
        return Ok(NOT_FOUND_ANSWER.to_string());
    }
    rag_llm::answer(generator, question, &result.chunks).await
}

async fn chat(
    engine: &RetrievalEngine,
    generator: &OllamaGenerator,
    flags: &RetrievalFlags,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Model: {}. Type 'exit' to quit.", generator.model());

    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "cikis") {
            break;
        }

        match ask(engine, generator, question, flags).await {
            Ok(answer) => println!("{}", answer),
            Err(e) => println!("Error [{}]: {}", e.error_code(), e),
        }
    }

    Ok(())
}

fn print_result(result: &RetrievalResult) {
    println!(
        "Strategy: {}, k = {}, {} chunks in {}ms",
        result.strategy,
        result.k,
        result.chunks.len(),
        result.latency_ms
    );

    if result.queries.len() > 1 {
        println!("Queries:");
        for query in &result.queries {
            println!("  - {}", query);
        }
    }

    for (i, scored) in result.chunks.iter().enumerate() {
        let score = scored
            .score
            .map(|s| format!("{:.3}", s))
            .unwrap_or_else(|| "-".to_string());
        println!("\n{}. [{}] {}", i + 1, score, scored.chunk.source);
        println!("   {}", truncate(&scored.chunk.content, 200).replace('\n', " "));
    }

    if !result.degraded.is_empty() {
        println!("\nDegraded:");
        for reason in &result.degraded {
            println!("  - {}", reason);
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
