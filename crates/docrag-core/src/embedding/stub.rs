use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::Result;

/// Deterministic embedder used by tests: vectors are derived from a hash
/// of the input text, so identical texts always map to identical unit
/// vectors without any model weights.
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut state = u64::from_be_bytes(digest[..8].try_into().unwrap());

        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|_| {
                // xorshift keeps the sequence cheap and reproducible.
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state % 2000) as f32 / 1000.0 - 1.0
            })
            .collect();

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "stub-hash-embedder"
    }
}
