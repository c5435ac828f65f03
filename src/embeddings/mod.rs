// Embeddings module
// Text windowing plus the sentence-embedding backend

#[cfg(test)]
mod tests;

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, TextWindows, chunk_pages, chunk_text, normalize_whitespace};
pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaClient};

use crate::Result;

/// A fixed-dimension sentence-embedding model.
///
/// Implementations return unit-length vectors in input order, one per text.
/// Calls are blocking; async callers run them on the blocking pool.
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed `texts`, sending at most `batch_size` texts per model call
    fn embed(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Euclidean norm, mostly useful for assertions
#[inline]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}
