
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{SearchHit, VectorIndex, VectorPoint, check_dimensions};
use crate::Result;

/// Brute-force cosine index held in memory.
///
/// `None` models an absent collection, so purge and re-create behave like the
/// on-disk backend.
#[derive(Debug)]
pub struct MemoryIndex {
    dimension: usize,
    points: RwLock<Option<Vec<VectorPoint>>>,
}

impl MemoryIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            points: RwLock::new(None),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn ensure_collection(&self) -> Result<()> {
        let mut points = self.points.write().await;
        if points.is_none() {
            info!("Creating in-memory collection with {} dimensions", self.dimension);
            *points = Some(Vec::new());
        }
        Ok(())
    }

    async fn upsert(&self, new_points: Vec<VectorPoint>) -> Result<()> {
        if new_points.is_empty() {
            return Ok(());
        }
        check_dimensions(&new_points, self.dimension)?;

        let mut points = self.points.write().await;
        points.get_or_insert_with(Vec::new).extend(new_points);
        Ok(())
    }

    async fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        allowed_document_ids: &BTreeSet<i64>,
    ) -> Result<Vec<SearchHit>> {
        let points = self.points.read().await;
        let Some(points) = points.as_ref() else {
            debug!("Collection absent, returning no hits");
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|p| allowed_document_ids.contains(&p.payload.document_id))
            .map(|p| SearchHit {
                text: p.payload.text.clone(),
                score: cosine_similarity(query, &p.vector),
                source: p.payload.source.clone(),
                point_id: p.id.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_by_document(&self, document_id: i64) -> Result<()> {
        let mut points = self.points.write().await;
        if let Some(points) = points.as_mut() {
            points.retain(|p| p.payload.document_id != document_id);
        }
        Ok(())
    }

    async fn purge_all(&self) -> Result<()> {
        info!("Dropping in-memory collection");
        *self.points.write().await = None;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self
            .points
            .read()
            .await
            .as_ref()
            .map_or(0, |points| points.len() as u64))
    }
}
