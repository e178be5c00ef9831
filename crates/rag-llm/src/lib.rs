//! rag-llm - Text generation
//!
//! An Ollama-backed [`TextGenerator`], the paraphrase and answer prompts,
//! and grounded answering over retrieved chunks.

mod ollama;
pub mod prompts;

pub use ollama::OllamaGenerator;

use tracing::debug;

use rag_core::{Result, ScoredChunk, TextGenerator};

/// Answer `question` from `chunks` only.
///
/// Returns the generator's text trimmed; generation errors propagate.
pub async fn answer(
    generator: &dyn TextGenerator,
    question: &str,
    chunks: &[ScoredChunk],
) -> Result<String> {
    let context = prompts::render_context(chunks);
    let prompt = prompts::answer_prompt(question, &context);

    debug!("Answering with {} context chunks", chunks.len());
    let text = generator.complete(&prompt).await?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_core::{Chunk, RagError};
    use std::sync::Mutex;

    struct Recording {
        prompts: Mutex<Vec<String>>,
        reply: Result<String>,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(RagError::generation(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_answer_uses_context() {
        let generator = Recording {
            prompts: Mutex::new(Vec::new()),
            reply: Ok("  15 dakika surer.\n".to_string()),
        };
        let chunks = vec![ScoredChunk::new(
            Chunk::new("scrum.md", 0, "Daily Scrum 15 dakika surer."),
            0.8,
        )];

        let text = answer(&generator, "Daily Scrum ne kadar surer?", &chunks)
            .await
            .unwrap();
        assert_eq!(text, "15 dakika surer.");

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Daily Scrum 15 dakika surer."));
    }

    #[tokio::test]
    async fn test_answer_propagates_errors() {
        let generator = Recording {
            prompts: Mutex::new(Vec::new()),
            reply: Err(RagError::generation("connection refused")),
        };

        let err = answer(&generator, "soru", &[]).await.unwrap_err();
        assert_eq!(err.error_code(), "GENERATION_ERROR");
    }
}
