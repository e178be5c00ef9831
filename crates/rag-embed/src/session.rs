//! Shared ONNX Runtime session setup.

use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

/// Build an optimised CPU session for the model at `model_path`.
pub(crate) fn build_session(model_path: &Path, num_threads: usize) -> Result<Session, String> {
    Session::builder()
        .map_err(|e| format!("Failed to create session builder: {}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| format!("Failed to set optimization level: {}", e))?
        .with_intra_threads(num_threads.max(1))
        .map_err(|e| format!("Failed to set thread count: {}", e))?
        .commit_from_file(model_path)
        .map_err(|e| format!("Failed to load model {}: {}", model_path.display(), e))
}
