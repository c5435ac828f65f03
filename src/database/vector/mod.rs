// Vector index abstraction
// One shared collection of embedded chunks, scoped by document id


pub mod memory;

pub use memory::MemoryIndex;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::{RagError, Result};

/// Metadata stored alongside every vector
#[derive(Debug, Clone, PartialEq)]
pub struct PointPayload {
    pub text: String,
    pub source: String,
    pub document_id: i64,
}

/// One embedded chunk
#[derive(Debug, Clone)]
pub struct VectorPoint {
    /// Random identifier assigned at insert time, never derived from content
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl VectorPoint {
    #[inline]
    pub fn new(vector: Vec<f32>, payload: PointPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            payload,
        }
    }
}

/// A scored match returned by [`VectorIndex::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub text: String,
    /// Cosine similarity, higher is closer
    pub score: f32,
    pub source: String,
    pub point_id: String,
}

/// Append-only point store with filtered similarity search.
///
/// Implementations must be safe to share between ingestion jobs and queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimension every stored vector must have
    fn dimension(&self) -> usize;

    /// Create the collection if absent. Fails if an existing collection was
    /// built with a different dimension.
    async fn ensure_collection(&self) -> Result<()>;

    /// Add points; an empty batch is a no-op
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;

    /// Backend search restricted to a non-empty set of document ids
    async fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        allowed_document_ids: &BTreeSet<i64>,
    ) -> Result<Vec<SearchHit>>;

    /// Remove every point belonging to `document_id`
    async fn delete_by_document(&self, document_id: i64) -> Result<()>;

    /// Destroy the collection. Call [`VectorIndex::ensure_collection`] afterwards.
    async fn purge_all(&self) -> Result<()>;

    /// Number of stored points; zero when the collection is absent
    async fn count(&self) -> Result<u64>;

    /// Top `top_k` hits by descending score among points whose document is in
    /// `allowed_document_ids`. An empty set never reaches the backend.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        allowed_document_ids: &BTreeSet<i64>,
    ) -> Result<Vec<SearchHit>> {
        if allowed_document_ids.is_empty() || top_k == 0 {
            debug!("Search scope is empty, skipping index query");
            return Ok(Vec::new());
        }
        self.search_filtered(query, top_k, allowed_document_ids)
            .await
    }
}

/// Reject vectors whose length differs from the index dimension
#[inline]
pub fn check_dimensions(points: &[VectorPoint], dimension: usize) -> Result<()> {
    match points.iter().find(|p| p.vector.len() != dimension) {
        Some(point) => Err(RagError::Config(format!(
            "Vector of dimension {} does not match index dimension {}",
            point.vector.len(),
            dimension
        ))),
        None => Ok(()),
    }
}

/// Embed `chunks` and add them to the index as points of `document_id`.
///
/// Embedding runs on the blocking pool. Returns the number of points written.
pub async fn upsert_chunks(
    index: &dyn VectorIndex,
    embedder: Arc<dyn Embedder>,
    document_id: i64,
    chunks: Vec<String>,
    source: &str,
    embed_batch_size: usize,
) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let (chunks, vectors) = tokio::task::spawn_blocking(move || {
        let vectors = embedder.embed(&chunks, embed_batch_size);
        (chunks, vectors)
    })
    .await
    .map_err(|e| RagError::Embedding(format!("Embedding task failed: {e}")))?;
    let vectors = vectors?;

    if vectors.len() != chunks.len() {
        return Err(RagError::Embedding(format!(
            "Embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    let points: Vec<VectorPoint> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(text, vector)| {
            VectorPoint::new(
                vector,
                PointPayload {
                    text,
                    source: source.to_string(),
                    document_id,
                },
            )
        })
        .collect();

    let written = points.len();
    debug!(
        "Storing batch of {} points for document {}",
        written, document_id
    );
    index.upsert(points).await?;
    Ok(written)
}
