//! all-MiniLM-L6-v2 on ONNX Runtime.
//!
//! Tokenizes with `tokenizers`, runs the encoder with `ort`, then mean-pools
//! the token embeddings under the attention mask.

use std::sync::Mutex;

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView3, Axis};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// all-MiniLM-L6-v2 was trained on sequences of 256 tokens.
const MAX_SEQ_LEN: usize = 256;

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model: String,
}

// Safety: Tokenizer is Send+Sync and the Session is only reached through the Mutex.
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `courtside model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer not found at {}. Run `courtside model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;
        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model: config.model.clone(),
        })
    }
}

/// Flatten encodings into `[batch, seq]` id and mask matrices.
fn encodings_to_inputs(encodings: &[Encoding]) -> Result<(Array2<i64>, Array2<i64>)> {
    let batch = encodings.len();
    let seq = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);

    let ids: Vec<i64> = encodings
        .iter()
        .flat_map(|e| e.get_ids().iter().map(|&id| id as i64))
        .collect();
    let mask: Vec<i64> = encodings
        .iter()
        .flat_map(|e| e.get_attention_mask().iter().map(|&m| m as i64))
        .collect();

    Ok((
        Array2::from_shape_vec((batch, seq), ids)?,
        Array2::from_shape_vec((batch, seq), mask)?,
    ))
}

/// Average token embeddings where the attention mask is set.
///
/// `tokens` is `[batch, seq, hidden]`, `mask` is `[batch, seq]`.
fn mean_pool(tokens: ArrayView3<'_, f32>, mask: &Array2<i64>) -> Vec<Vec<f32>> {
    tokens
        .axis_iter(Axis(0))
        .zip(mask.axis_iter(Axis(0)))
        .map(|(seq, seq_mask)| {
            let mut sum = vec![0.0f32; seq.ncols()];
            let mut count = 0.0f32;
            for (token, &m) in seq.axis_iter(Axis(0)).zip(seq_mask.iter()) {
                if m > 0 {
                    for (acc, x) in sum.iter_mut().zip(token.iter()) {
                        *acc += x;
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                sum.iter_mut().for_each(|x| *x /= count);
            }
            sum
        })
        .collect()
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;
        let (ids, mask) = encodings_to_inputs(&encodings)?;
        let shape = vec![ids.nrows() as i64, ids.ncols() as i64];

        let flat_ids: Box<[i64]> = ids.iter().copied().collect();
        let flat_mask: Box<[i64]> = mask.iter().copied().collect();
        let ids_tensor = Tensor::from_array((shape.clone(), flat_ids))?;
        let mask_tensor = Tensor::from_array((shape.clone(), flat_mask))?;
        // single-segment input
        let type_ids_tensor = Tensor::from_array((shape, vec![0i64; ids.len()].into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => type_ids_tensor,
        })?;

        // Output name differs between exports.
        let token_embeddings = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (dims, data) = token_embeddings
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings")?;

        let dims: &[i64] = &dims;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token embedding shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );
        let tokens = ArrayView3::from_shape(
            (dims[0] as usize, dims[1] as usize, dims[2] as usize),
            data,
        )?;

        Ok(mean_pool(tokens, &mask))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
