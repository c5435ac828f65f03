// Indexer module
// Background ingestion of one document's text into the vector index


pub mod queue;

pub use queue::{IngestionQueue, JobHandle, JobStatus};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{DocumentRegistry, VectorIndex, upsert_chunks};
use crate::embeddings::{ChunkingConfig, Embedder, chunk_text};
use crate::extract::TextSource;
use crate::{RagError, Result};

pub const DEFAULT_INGESTION_BATCH_SIZE: usize = 256;
pub const DEFAULT_LIVENESS_CHECK_EVERY: usize = 100;

/// Tunables for a single ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionSettings {
    /// Chunks buffered before one embed + upsert flush
    pub batch_size: usize,
    /// Consumed chunks between two checks that the document still exists
    pub liveness_check_every: usize,
    pub chunking: ChunkingConfig,
    /// Texts per embedding model call
    pub embed_batch_size: usize,
}

impl Default for IngestionSettings {
    #[inline]
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_INGESTION_BATCH_SIZE,
            liveness_check_every: DEFAULT_LIVENESS_CHECK_EVERY,
            chunking: ChunkingConfig::default(),
            embed_batch_size: 128,
        }
    }
}

impl IngestionSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.ingestion.batch_size.max(1),
            liveness_check_every: config.ingestion.liveness_check_every.max(1),
            chunking: config.chunking,
            embed_batch_size: config.ollama.batch_size.max(1) as usize,
        }
    }
}

/// What to ingest
#[derive(Clone)]
pub struct IngestionRequest {
    pub document_id: i64,
    /// Display name stored as the `source` of every point
    pub source_name: String,
    pub text: Arc<dyn TextSource>,
}

impl std::fmt::Debug for IngestionRequest {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionRequest")
            .field("document_id", &self.document_id)
            .field("source_name", &self.source_name)
            .field("pages", &self.text.page_count())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The liveness check found the document gone
    DocumentDeleted,
    /// The cancel flag was raised
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            AbortReason::DocumentDeleted => write!(f, "document deleted"),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionOutcome {
    Completed {
        chunks_indexed: usize,
        batches: usize,
    },
    Aborted {
        chunks_indexed: usize,
        reason: AbortReason,
    },
}

impl IngestionOutcome {
    #[inline]
    pub fn chunks_indexed(&self) -> usize {
        match *self {
            IngestionOutcome::Completed { chunks_indexed, .. }
            | IngestionOutcome::Aborted { chunks_indexed, .. } => chunks_indexed,
        }
    }
}

/// Streams one document's chunks into the vector index in bounded batches.
///
/// At most one batch is buffered. The job stops early when the document
/// disappears from the registry or when its cancel flag is raised; the
/// unflushed batch is then discarded.
pub struct IngestionJob {
    request: IngestionRequest,
    registry: Arc<dyn DocumentRegistry>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    settings: IngestionSettings,
    cancel: Arc<AtomicBool>,
}

impl std::fmt::Debug for IngestionJob {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionJob")
            .field("request", &self.request)
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Counters while the job is running
#[derive(Debug, Default)]
struct Progress {
    consumed: usize,
    indexed: usize,
    batches: usize,
}

impl IngestionJob {
    #[inline]
    pub fn new(
        request: IngestionRequest,
        registry: Arc<dyn DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            request,
            registry,
            embedder,
            index,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn document_id(&self) -> i64 {
        self.request.document_id
    }

    /// Flag that stops the job at its next chunk once set
    #[inline]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    async fn document_exists(&self) -> Result<bool> {
        self.registry.exists(self.request.document_id).await
    }

    fn aborted(&self, progress: &Progress, reason: AbortReason) -> IngestionOutcome {
        warn!(
            "Ingestion of document {} aborted ({}) after {} chunks",
            self.request.document_id, reason, progress.indexed
        );
        IngestionOutcome::Aborted {
            chunks_indexed: progress.indexed,
            reason,
        }
    }

    async fn flush(&self, batch: &mut Vec<String>, progress: &mut Progress) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let chunks = std::mem::replace(batch, Vec::with_capacity(self.settings.batch_size));
        let written = upsert_chunks(
            self.index.as_ref(),
            Arc::clone(&self.embedder),
            self.request.document_id,
            chunks,
            &self.request.source_name,
            self.settings.embed_batch_size,
        )
        .await?;

        progress.indexed += written;
        progress.batches += 1;
        debug!(
            "Flushed batch {} ({} chunks) for document {}",
            progress.batches, written, self.request.document_id
        );
        Ok(())
    }

    async fn page_text(&self, page_index: usize) -> Result<String> {
        let source = Arc::clone(&self.request.text);
        tokio::task::spawn_blocking(move || source.page_text(page_index))
            .await
            .map_err(|e| RagError::Ingestion(format!("Text extraction task failed: {e}")))?
    }

    /// Run to completion, abort, or the first upstream error
    pub async fn run(self) -> Result<IngestionOutcome> {
        let document_id = self.request.document_id;
        let page_count = self.request.text.page_count();
        let batch_size = self.settings.batch_size.max(1);
        let check_every = self.settings.liveness_check_every.max(1);

        info!(
            "Starting ingestion of document {} ({}, {} pages)",
            document_id, self.request.source_name, page_count
        );

        let mut progress = Progress::default();

        if self.is_cancelled() {
            return Ok(self.aborted(&progress, AbortReason::Cancelled));
        }
        if !self.document_exists().await? {
            return Ok(self.aborted(&progress, AbortReason::DocumentDeleted));
        }

        let mut batch: Vec<String> = Vec::with_capacity(batch_size);

        for page_index in 0..page_count {
            let text = self.page_text(page_index).await?;

            for window in chunk_text(&text, &self.settings.chunking) {
                if self.is_cancelled() {
                    return Ok(self.aborted(&progress, AbortReason::Cancelled));
                }

                progress.consumed += 1;
                if progress.consumed % check_every == 0 && !self.document_exists().await? {
                    return Ok(self.aborted(&progress, AbortReason::DocumentDeleted));
                }

                let chunk = window.trim();
                if chunk.is_empty() {
                    continue;
                }
                batch.push(chunk.to_string());

                if batch.len() >= batch_size {
                    self.flush(&mut batch, &mut progress).await?;
                }
            }
        }

        self.flush(&mut batch, &mut progress).await?;

        info!(
            "Completed ingestion of document {}: {} chunks in {} batches",
            document_id, progress.indexed, progress.batches
        );

        Ok(IngestionOutcome::Completed {
            chunks_indexed: progress.indexed,
            batches: progress.batches,
        })
    }
}
