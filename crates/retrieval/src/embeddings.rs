//! Text embeddings
//!
//! Embedding-space consistency is load-bearing: the same embedder and the
//! same normalization must be used at index-build time and at query time,
//! or cosine similarity stops being a bounded score. Both implementations
//! here L2-normalize by default.

#[cfg(feature = "onnx")]
use std::path::Path;

#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

use crate::RetrievalError;

/// Embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Maximum sequence length
    pub max_seq_len: usize,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// L2-normalize output vectors
    pub normalize: bool,
    /// ONNX output tensor name; models disagree on this
    pub output_name: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 512,
            embedding_dim: 384,
            normalize: true,
            output_name: "last_hidden_state".to_string(),
        }
    }
}

/// Embedder interface
///
/// Implementations are synchronous; index builds and query paths run them
/// through `tokio::task::spawn_blocking` so inference never stalls the
/// async runtime.
pub trait TextEmbedder: Send + Sync + 'static {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output dimension; validated against the persisted index on open
    fn dim(&self) -> usize;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

/// Deterministic hash-based embedder
///
/// No model files required. Used by tests and as the development fallback;
/// vectors are stable across processes, which the index fingerprinting
/// relies on.
pub struct HashEmbedder {
    config: EmbeddingConfig,
}

impl HashEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }

    pub fn with_dim(dim: usize) -> Self {
        Self::new(EmbeddingConfig {
            embedding_dim: dim,
            ..Default::default()
        })
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default())
    }
}

impl TextEmbedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut embedding = vec![0.0f32; self.config.embedding_dim];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % self.config.embedding_dim;
            embedding[idx] += 1.0;
        }

        if self.config.normalize {
            l2_normalize(&mut embedding);
        }

        Ok(embedding)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Text embedder backed by an ONNX sentence-embedding model
///
/// Mean-pools the last hidden state over real (unpadded) tokens, then
/// L2-normalizes when configured.
#[cfg(feature = "onnx")]
pub struct OnnxEmbedder {
    session: Session,
    tokenizer: Tokenizer,
    config: EmbeddingConfig,
}

#[cfg(feature = "onnx")]
impl OnnxEmbedder {
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        config: EmbeddingConfig,
    ) -> Result<Self, RetrievalError> {
        let session = Session::builder()
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        Ok(Self {
            session,
            tokenizer,
            config,
        })
    }

    fn embed_batch_internal(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let batch_size = texts.len();

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let mut input_ids = vec![0i64; batch_size * self.config.max_seq_len];
        let mut attention_mask = vec![0i64; batch_size * self.config.max_seq_len];
        let mut token_type_ids = vec![0i64; batch_size * self.config.max_seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            let len = ids.len().min(self.config.max_seq_len);
            let offset = i * self.config.max_seq_len;

            for j in 0..len {
                input_ids[offset + j] = ids[j] as i64;
                attention_mask[offset + j] = mask[j] as i64;
                token_type_ids[offset + j] = types[j] as i64;
            }
        }

        let input_ids = Array2::from_shape_vec((batch_size, self.config.max_seq_len), input_ids)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        let attention_mask =
            Array2::from_shape_vec((batch_size, self.config.max_seq_len), attention_mask)
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        let token_type_ids =
            Array2::from_shape_vec((batch_size, self.config.max_seq_len), token_type_ids)
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let input_ids_tensor =
            Tensor::from_array(input_ids).map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array(attention_mask)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array(token_type_ids)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let (shape, hidden_data) = outputs
            .get(&self.config.output_name)
            .ok_or_else(|| {
                RetrievalError::Embedding(format!(
                    "missing output tensor: {}",
                    self.config.output_name
                ))
            })?
            .try_extract_tensor::<f32>()
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let (_, tensor_seq_len, tensor_hidden_dim) = match dims[..] {
            [b, s, h] => (b, s, h),
            _ => {
                return Err(RetrievalError::Embedding(format!(
                    "unexpected tensor shape: {:?}",
                    dims
                )))
            }
        };

        let mut embeddings = Vec::with_capacity(batch_size);

        for i in 0..batch_size {
            let seq_len = encodings[i]
                .get_ids()
                .len()
                .min(self.config.max_seq_len)
                .min(tensor_seq_len);
            let mut embedding = vec![0.0f32; self.config.embedding_dim];

            for j in 0..seq_len {
                for (k, slot) in embedding
                    .iter_mut()
                    .enumerate()
                    .take(self.config.embedding_dim.min(tensor_hidden_dim))
                {
                    let idx = i * tensor_seq_len * tensor_hidden_dim + j * tensor_hidden_dim + k;
                    if idx < hidden_data.len() {
                        *slot += hidden_data[idx];
                    }
                }
            }

            if seq_len > 0 {
                for v in &mut embedding {
                    *v /= seq_len as f32;
                }
            }

            if self.config.normalize {
                l2_normalize(&mut embedding);
            }

            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}

#[cfg(feature = "onnx")]
impl TextEmbedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let embeddings = self.embed_batch_internal(&[text])?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("empty embedding batch".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        self.embed_batch_internal(texts)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_name(&self) -> &str {
        "onnx-embedder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_normalized() {
        let embedder = HashEmbedder::default();
        let embedding = embedder.embed("Hello world").unwrap();

        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::default();
        assert_eq!(
            embedder.embed("rent subsidy").unwrap(),
            embedder.embed("rent subsidy").unwrap()
        );
    }

    #[test]
    fn test_hash_embedder_dim_override() {
        let embedder = HashEmbedder::with_dim(64);
        assert_eq!(embedder.dim(), 64);
        assert_eq!(embedder.embed("x").unwrap().len(), 64);
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = HashEmbedder::default();
        let batch = embedder.embed_batch(&["a", "b"]).unwrap();
        assert_eq!(batch[0], embedder.embed("a").unwrap());
        assert_eq!(batch[1], embedder.embed("b").unwrap());
    }
}
