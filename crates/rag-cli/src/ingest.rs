//! File discovery and the chunk, embed, store pipeline.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use rag_core::{Chunk, ChunkConfig, ChunkStore, Chunker, ContentType, Embedder, RagError, Result};

/// Collect supported files under `path`.
pub fn collect_files(path: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_supported_file(path) {
            files.push(path.to_path_buf());
        }
        return Ok(files);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for entry_path in entries {
        if entry_path.is_dir() {
            if recursive {
                files.extend(collect_files(&entry_path, recursive)?);
            }
        } else if is_supported_file(&entry_path) {
            files.push(entry_path);
        }
    }

    Ok(files)
}

/// Markdown and plain text only.
pub fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "md" | "markdown" | "txt"))
        .unwrap_or(false)
}

/// Chunks, embeds and stores documents.
pub struct Ingestor<'a> {
    pub store: &'a dyn ChunkStore,
    pub embedder: &'a dyn Embedder,
    pub chunker: &'a dyn Chunker,
    pub config: ChunkConfig,
    pub batch_size: usize,
}

impl Ingestor<'_> {
    /// Replace `document` in the store with the chunks of `content`.
    ///
    /// Returns the number of chunks stored.
    pub async fn ingest(&self, document: &str, content: &str) -> Result<usize> {
        let content_type = ContentType::from_path(document);
        let pieces = self.chunker.chunk(content, content_type, &self.config)?;

        let replaced = self.store.delete_source(document).await?;
        if replaced > 0 {
            debug!("Replacing {} existing chunks of {}", replaced, document);
        }

        if pieces.is_empty() {
            info!("{} produced no chunks", document);
            return Ok(0);
        }

        let chunks: Vec<Chunk> = pieces
            .iter()
            .enumerate()
            .map(|(i, piece)| {
                Chunk::new(document, i as u32, &piece.content)
                    .with_metadata("content_type", content_type.as_str())
            })
            .collect();

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            embeddings.extend(self.embedder.embed_documents(&texts).await?);
        }

        if embeddings.len() != chunks.len() {
            return Err(RagError::embedding(format!(
                "{} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        self.store.insert_chunks(&chunks, &embeddings).await?;
        info!("Ingested {} as {} chunks", document, chunks.len());
        Ok(chunks.len())
    }

    /// Read `path` and ingest it under its path string.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        self.ingest(&path.to_string_lossy(), &content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_chunk::RecursiveChunker;
    use rag_embed::MockEmbedder;
    use rag_store::SqliteStore;

    fn ingestor<'a>(
        store: &'a SqliteStore,
        embedder: &'a MockEmbedder,
        chunker: &'a RecursiveChunker,
    ) -> Ingestor<'a> {
        Ingestor {
            store,
            embedder,
            chunker,
            config: ChunkConfig {
                chunk_size: 60,
                chunk_overlap: 10,
            },
            batch_size: 2,
        }
    }

    #[test]
    fn test_supported_files() {
        assert!(is_supported_file(Path::new("notes/scrum.md")));
        assert!(is_supported_file(Path::new("KANBAN.TXT")));
        assert!(!is_supported_file(Path::new("main.rs")));
        assert!(!is_supported_file(Path::new("README")));
    }

    #[test]
    fn test_collect_files_recursion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("b.rs"), "b").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.txt"), "c").unwrap();

        let flat = collect_files(dir.path(), false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.md")]);

        let deep = collect_files(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 2);
        assert!(deep.contains(&dir.path().join("sub").join("c.txt")));
    }

    #[tokio::test]
    async fn test_ingest_replaces_document() {
        let store = SqliteStore::open_memory().unwrap();
        let embedder = MockEmbedder::new();
        let chunker = RecursiveChunker;
        let ingestor = ingestor(&store, &embedder, &chunker);

        let text = "Daily Scrum 15 dakika surer.\n\nSprint Review sprint sonunda yapilir.\n\nSprint Planning sprint basinda yapilir.";
        let first = ingestor.ingest("scrum.md", text).await.unwrap();
        assert!(first >= 2);

        let second = ingestor.ingest("scrum.md", "Tek paragraf.").await.unwrap();
        assert_eq!(second, 1);

        let chunks = store.all_chunks().await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Tek paragraf.");
        assert_eq!(chunks[0].metadata["content_type"], "markdown");
    }

    #[tokio::test]
    async fn test_ingest_empty_document_stores_nothing() {
        let store = SqliteStore::open_memory().unwrap();
        let embedder = MockEmbedder::new();
        let chunker = RecursiveChunker;

        let stored = ingestor(&store, &embedder, &chunker)
            .ingest("empty.txt", "   \n\n ")
            .await
            .unwrap();
        assert_eq!(stored, 0);
        assert_eq!(store.stats().await.unwrap().chunks, 0);
    }
}
