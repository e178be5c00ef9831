//! Recursive character text chunker.
//!
//! Splits text by trying progressively smaller separators until every piece
//! fits within the character limit, then merges neighbouring pieces back
//! into chunks with a trailing overlap.

use std::collections::VecDeque;

use tracing::debug;

use rag_core::{ChunkConfig, ChunkData, Chunker, ContentType, RagError, Result};

/// Recursive chunker that splits text by multiple separators.
///
/// Tries each separator in order until pieces are small enough:
/// 1. Markdown section headings (Markdown only)
/// 2. Double newline (paragraph breaks)
/// 3. Single newline
/// 4. Sentence boundaries
/// 5. Word boundaries (space)
/// 6. Character (last resort)
///
/// Sizes are counted in characters, not bytes.
pub struct RecursiveChunker;

/// A contiguous slice of the source text, addressed by byte offset.
#[derive(Debug, Clone, Copy)]
struct Piece {
    offset: usize,
    bytes: usize,
    chars: usize,
}

impl RecursiveChunker {
    pub fn new() -> Self {
        Self
    }

    /// Get separators for the given content type.
    fn separators(content_type: ContentType) -> &'static [&'static str] {
        match content_type {
            ContentType::Markdown => &["\n## ", "\n### ", "\n\n", "\n", ". ", " "],
            ContentType::PlainText | ContentType::Unknown => &["\n\n", "\n", ". ", " "],
        }
    }

    /// Split `text` into pieces of at most `limit` characters.
    ///
    /// Separators stay attached to the start of the piece that follows them,
    /// so the pieces cover `text` exactly and in order.
    fn split_recursive(
        text: &str,
        offset: usize,
        separators: &[&str],
        limit: usize,
        out: &mut Vec<Piece>,
    ) {
        let chars = text.chars().count();
        if chars <= limit {
            if !text.is_empty() {
                out.push(Piece {
                    offset,
                    bytes: text.len(),
                    chars,
                });
            }
            return;
        }

        let Some(pos) = separators.iter().position(|s| text.contains(s)) else {
            Self::split_by_size(text, offset, limit, out);
            return;
        };

        let remaining = &separators[pos + 1..];
        for (start, part) in split_before(text, separators[pos]) {
            Self::split_recursive(part, offset + start, remaining, limit, out);
        }
    }

    /// Hard split by character count (last resort).
    fn split_by_size(text: &str, offset: usize, limit: usize, out: &mut Vec<Piece>) {
        let mut start = 0;
        let mut chars = 0;

        for (i, _) in text.char_indices() {
            if chars == limit {
                out.push(Piece {
                    offset: offset + start,
                    bytes: i - start,
                    chars,
                });
                start = i;
                chars = 0;
            }
            chars += 1;
        }

        if chars > 0 {
            out.push(Piece {
                offset: offset + start,
                bytes: text.len() - start,
                chars,
            });
        }
    }

    /// Merge pieces into chunks of at most `chunk_size` characters, keeping up
    /// to `chunk_overlap` characters of each chunk's tail at the head of the next.
    fn merge(text: &str, pieces: Vec<Piece>, config: &ChunkConfig) -> Vec<ChunkData> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            if total + piece.chars > config.chunk_size && !window.is_empty() {
                push_chunk(text, &window, &mut chunks);

                while total > config.chunk_overlap
                    || (total > 0 && total + piece.chars > config.chunk_size)
                {
                    match window.pop_front() {
                        Some(front) => total -= front.chars,
                        None => break,
                    }
                }
            }

            total += piece.chars;
            window.push_back(piece);
        }

        if !window.is_empty() {
            push_chunk(text, &window, &mut chunks);
        }

        chunks
    }
}

/// Split `text` right before every occurrence of `separator`.
fn split_before<'a>(text: &'a str, separator: &str) -> Vec<(usize, &'a str)> {
    let mut parts = Vec::new();
    let mut last = 0;

    for (i, _) in text.match_indices(separator) {
        if i > last {
            parts.push((last, &text[last..i]));
            last = i;
        }
    }
    parts.push((last, &text[last..]));

    parts
}

/// Emit the window as a whitespace-trimmed chunk, skipping blank windows.
fn push_chunk(text: &str, window: &VecDeque<Piece>, chunks: &mut Vec<ChunkData>) {
    let (Some(first), Some(last)) = (window.front(), window.back()) else {
        return;
    };

    let raw = &text[first.offset..last.offset + last.bytes];
    let trimmed_start = raw.trim_start();
    let content = trimmed_start.trim_end();
    if content.is_empty() {
        return;
    }

    chunks.push(ChunkData {
        content: content.to_string(),
        start: first.offset + (raw.len() - trimmed_start.len()),
    });
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(
        &self,
        content: &str,
        content_type: ContentType,
        config: &ChunkConfig,
    ) -> Result<Vec<ChunkData>> {
        if config.chunk_size == 0 {
            return Err(RagError::chunking("chunk_size must be positive"));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::chunking(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut pieces = Vec::new();
        Self::split_recursive(
            content,
            0,
            Self::separators(content_type),
            config.chunk_size,
            &mut pieces,
        );
        let chunks = Self::merge(content, pieces, config);

        debug!(
            "Chunked {} chars into {} chunks ({})",
            content.chars().count(),
            chunks.len(),
            content_type
        );
        Ok(chunks)
    }
}
