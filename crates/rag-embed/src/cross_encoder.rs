//! ONNX cross-encoder relevance scorer.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use rag_core::{RagError, RelevanceScorer, RerankerConfig, Result};

use crate::session::build_session;

/// Pairs scored per inference call.
const BATCH_SIZE: usize = 16;

/// Cross-encoder such as bge-reranker-base.
///
/// Scores `(query, passage)` pairs jointly and maps the single relevance
/// logit through a sigmoid, so scores fall in `(0, 1)`.
pub struct OnnxCrossEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl OnnxCrossEncoder {
    /// Load `model.onnx` and `tokenizer.json` from the configured directory.
    pub fn from_config(config: &RerankerConfig) -> Result<Self> {
        let dir = config.model_path.as_path();
        let mut encoder = Self::new(
            dir.join("model.onnx"),
            dir.join("tokenizer.json"),
            config.num_threads,
        )?;
        truncate_pairs(&mut encoder.tokenizer, config.max_tokens)?;
        Ok(encoder)
    }

    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        num_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();

        info!("Loading cross-encoder from {:?}", model_path);
        let session = build_session(model_path, num_threads).map_err(RagError::scoring)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path.as_ref())
            .map_err(|e| RagError::scoring(format!("Failed to load tokenizer: {}", e)))?;
        truncate_pairs(&mut tokenizer, RerankerConfig::default().max_tokens)?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let encodings = encode_pairs(&self.tokenizer, query, passages)?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for j in 0..ids.len() {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| RagError::scoring(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor =
            Tensor::from_array((vec![batch_size, max_len], attention_mask))
                .map_err(|e| RagError::scoring(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::scoring(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| RagError::scoring(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::scoring("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::scoring(format!("Failed to extract logits: {}", e)))?;

        // Logits come as (batch, 1) or (batch,).
        let logits: Vec<f32> = match view.shape() {
            [n, 1] if *n == batch_size => (0..batch_size).map(|i| view[[i, 0]]).collect(),
            [n] if *n == batch_size => (0..batch_size).map(|i| view[[i]]).collect(),
            shape => {
                return Err(RagError::scoring(format!(
                    "Unexpected logits shape: {:?}",
                    shape
                )))
            }
        };

        Ok(logits.into_iter().map(sigmoid).collect())
    }
}

/// Cap encoded pairs at `max_tokens`, trimming the longer sequence first.
fn truncate_pairs(tokenizer: &mut Tokenizer, max_tokens: usize) -> Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_tokens,
            strategy: TruncationStrategy::LongestFirst,
            ..Default::default()
        }))
        .map_err(|e| RagError::scoring(format!("Failed to configure truncation: {}", e)))?;
    Ok(())
}

fn encode_pairs(tokenizer: &Tokenizer, query: &str, passages: &[&str]) -> Result<Vec<Encoding>> {
    let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, *p)).collect();
    tokenizer
        .encode_batch(pairs, true)
        .map_err(|e| RagError::scoring(format!("Tokenization failed: {}", e)))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[async_trait]
impl RelevanceScorer for OnnxCrossEncoder {
    async fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for batch in passages.chunks(BATCH_SIZE) {
            scores.extend(self.score_batch(query, batch)?);
        }
        debug!("Scored {} passages", scores.len());
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(8.0) > 0.99);
        assert!(sigmoid(-8.0) < 0.01);
        assert!(sigmoid(1.0) > sigmoid(0.5));
    }

    /// Whitespace word-level tokenizer with BERT-style pair template.
    fn pair_tokenizer() -> Tokenizer {
        let json = r#"{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": {
                "type": "TemplateProcessing",
                "single": [
                    { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                    { "Sequence": { "id": "A", "type_id": 0 } },
                    { "SpecialToken": { "id": "[SEP]", "type_id": 0 } }
                ],
                "pair": [
                    { "SpecialToken": { "id": "[CLS]", "type_id": 0 } },
                    { "Sequence": { "id": "A", "type_id": 0 } },
                    { "SpecialToken": { "id": "[SEP]", "type_id": 0 } },
                    { "Sequence": { "id": "B", "type_id": 1 } },
                    { "SpecialToken": { "id": "[SEP]", "type_id": 1 } }
                ],
                "special_tokens": {
                    "[CLS]": { "id": "[CLS]", "ids": [1], "tokens": ["[CLS]"] },
                    "[SEP]": { "id": "[SEP]", "ids": [2], "tokens": ["[SEP]"] }
                }
            },
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": { "[UNK]": 0, "[CLS]": 1, "[SEP]": 2, "sprint": 3, "review": 4 },
                "unk_token": "[UNK]"
            }
        }"#;
        json.parse().unwrap()
    }

    #[test]
    fn test_long_query_keeps_passage_and_separator() {
        let mut tokenizer = pair_tokenizer();
        truncate_pairs(&mut tokenizer, 8).unwrap();

        let query = ["sprint"; 10].join(" ");
        let encodings = encode_pairs(&tokenizer, &query, &["review review"]).unwrap();
        let ids = encodings[0].get_ids();

        assert_eq!(ids.len(), 8);
        assert_eq!(ids[0], 1);
        assert_eq!(*ids.last().unwrap(), 2);
        assert_eq!(ids.iter().filter(|&&id| id == 4).count(), 2);
    }

    #[test]
    fn test_short_pairs_are_untouched() {
        let mut tokenizer = pair_tokenizer();
        truncate_pairs(&mut tokenizer, 512).unwrap();

        let encodings = encode_pairs(&tokenizer, "sprint", &["review"]).unwrap();
        assert_eq!(encodings[0].get_ids(), &[1, 3, 2, 4, 2]);
    }

    #[test]
    fn test_missing_model_is_scoring_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RerankerConfig {
            model_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let err = OnnxCrossEncoder::from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "SCORING_ERROR");
    }
}
