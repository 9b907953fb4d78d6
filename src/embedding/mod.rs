//! Text-to-vector embedding.
//!
//! The vector store depends only on the [`EmbeddingProvider`] trait. The crate
//! ships a local implementation running all-MiniLM-L6-v2 (384 dimensions) on
//! ONNX Runtime; [`create_provider`] builds it from configuration.

pub mod local;

use anyhow::Result;

/// Number of dimensions produced by all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Batch text embedding.
///
/// Implementations return one vector per input, in input order, all of the same
/// width. The store takes its width from the first batch it commits and rejects
/// later batches of another width. It normalizes whatever it receives, so implementations need
/// not. Methods are synchronous; async callers go through
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("provider returned no vector"))
    }

    /// Model identifier recorded alongside persisted vectors.
    fn model_name(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// Only `"local"` is supported. Fails if the model files are missing; run
/// `courtside model download` first.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}
