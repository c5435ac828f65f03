// Service module
// Use cases over the registry, the vector index and the ingestion queue


use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{
    ChatMessage, ChatRole, Database, Document, DocumentRegistry, LanceIndex, NewChatMessage,
    VectorIndex,
};
use crate::embeddings::{Embedder, OllamaClient};
use crate::extract::{PdfText, TextSource};
use crate::indexer::{
    IngestionJob, IngestionQueue, IngestionRequest, IngestionSettings, JobHandle, JobStatus,
};
use crate::llm::{LanguageModel, MistralClient};
use crate::rag::{Answer, RetrievalOrchestrator, RetrievalSettings};
use crate::{RagError, Result};

pub const DEFAULT_SESSION_ID: &str = "default";
const PDF_MAGIC: &[u8] = b"%PDF";

/// What an upload returns once ingestion has been scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub id: i64,
    pub pages: i64,
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: bool,
    pub already_gone: bool,
    pub file_removed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub documents: i64,
    pub points: u64,
    pub active_jobs: usize,
}

/// Stored file name for a document id
#[inline]
pub fn stored_filename(document_id: i64) -> String {
    format!("doc_{document_id}.pdf")
}

pub struct RagService {
    database: Arc<Database>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    queue: IngestionQueue,
    orchestrator: RetrievalOrchestrator,
    ingestion: IngestionSettings,
    storage_dir: PathBuf,
}

impl std::fmt::Debug for RagService {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("storage_dir", &self.storage_dir)
            .field("ingestion", &self.ingestion)
            .finish_non_exhaustive()
    }
}

impl RagService {
    /// Build every component from `config`, in dependency order.
    ///
    /// An existing vector collection with a different dimension fails here.
    pub async fn open(config: &Config) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let database = Database::initialize_from_config(config)
            .await
            .map_err(|e| RagError::Database(format!("{e:#}")))?;

        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| RagError::Config(format!("{e:#}")))?;

        let index = LanceIndex::open(config.vector_database_path(), embedder.dimension()).await?;
        let model = MistralClient::new(&config.llm);

        info!(
            "Opened service at {} (embedding model {}, chat model {})",
            config.get_base_dir().display(),
            embedder.model(),
            model.model_name()
        );

        Self::from_parts(
            config,
            Arc::new(database),
            Arc::new(embedder),
            Arc::new(index),
            Arc::new(model),
        )
        .await
    }

    /// Assemble a service from ready-made components
    pub async fn from_parts(
        config: &Config,
        database: Arc<Database>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(RagError::Config(format!(
                "Embedding dimension {} does not match index dimension {}",
                embedder.dimension(),
                index.dimension()
            )));
        }
        index.ensure_collection().await?;

        let storage_dir = config.storage_dir();
        std::fs::create_dir_all(&storage_dir)?;

        let orchestrator = RetrievalOrchestrator::new(
            Arc::clone(&database) as Arc<dyn DocumentRegistry>,
            Arc::clone(&embedder),
            Arc::clone(&index),
            model,
            RetrievalSettings::from_config(config),
        );

        Ok(Self {
            database,
            embedder,
            index,
            queue: IngestionQueue::start(),
            orchestrator,
            ingestion: IngestionSettings::from_config(config),
            storage_dir,
        })
    }

    #[inline]
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Register a PDF, store it and schedule its ingestion.
    ///
    /// Returns as soon as the job is queued; the handle resolves when it ends.
    pub async fn upload(&self, bytes: &[u8], name: &str) -> Result<(UploadReceipt, JobHandle)> {
        if bytes.is_empty() {
            return Err(RagError::InvalidInput("Empty file".to_string()));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(RagError::InvalidInput("Only PDF accepted".to_string()));
        }
        let name = Path::new(name.trim())
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("upload.pdf")
            .to_string();

        let document_id = self.database.create(&name, bytes.len() as i64).await?;
        let filename = stored_filename(document_id);
        let path = self.storage_dir.join(&filename);
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            warn!("Failed to store upload {} at {}: {}", name, path.display(), e);
            self.database.delete(document_id).await?;
            return Err(e.into());
        }

        let opened = open_pdf(path.clone()).await.and_then(|text| {
            if text.page_count() == 0 {
                Err(RagError::InvalidInput("PDF has no pages".to_string()))
            } else {
                Ok(text)
            }
        });
        let text = match opened {
            Ok(text) => text,
            Err(e) => {
                warn!("Rejecting upload {}: {}", name, e);
                remove_file_quietly(&path).await;
                self.database.delete(document_id).await?;
                return Err(e);
            }
        };
        let pages = text.page_count() as i64;

        if !self
            .database
            .attach_file(document_id, &filename, pages)
            .await?
        {
            remove_file_quietly(&path).await;
            return Err(RagError::NotFound(format!(
                "Document {document_id} disappeared during upload"
            )));
        }

        let job = IngestionJob::new(
            IngestionRequest {
                document_id,
                source_name: name.clone(),
                text: Arc::new(text),
            },
            Arc::clone(&self.database) as Arc<dyn DocumentRegistry>,
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            self.ingestion,
        );
        let handle = match self.queue.schedule(job).await {
            Ok(handle) => handle,
            Err(e) => {
                remove_file_quietly(&path).await;
                self.database.delete(document_id).await?;
                return Err(e);
            }
        };

        info!(
            "Uploaded {} as document {} ({} pages)",
            name, document_id, pages
        );
        Ok((
            UploadReceipt {
                id: document_id,
                pages,
                filename: name,
                status: "ingesting".to_string(),
            },
            handle,
        ))
    }

    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.database.list_documents().await
    }

    /// Remove a document, its points and its file. Idempotent.
    pub async fn delete(&self, document_id: i64) -> Result<DeleteReport> {
        self.queue.forget(document_id).await;

        if let Err(e) = self.index.delete_by_document(document_id).await {
            warn!(
                "Failed to delete points of document {}: {}",
                document_id, e
            );
        }

        let Some(document) = self.database.get(document_id).await? else {
            let guessed = self.storage_dir.join(stored_filename(document_id));
            let file_removed = remove_file_quietly(&guessed).await;
            debug!("Document {} was already gone", document_id);
            return Ok(DeleteReport {
                deleted: false,
                already_gone: true,
                file_removed,
            });
        };

        let file_removed = if document.has_file() {
            remove_file_quietly(&self.storage_dir.join(&document.filename)).await
        } else {
            false
        };
        let deleted = self.database.delete(document_id).await?;

        info!("Deleted document {} ({})", document_id, document.original_name);
        Ok(DeleteReport {
            deleted,
            already_gone: !deleted,
            file_removed,
        })
    }

    /// Drop every vector point and recreate the empty collection.
    ///
    /// Registered documents are kept.
    pub async fn purge(&self) -> Result<()> {
        let purged = self.index.purge_all().await;
        self.index.ensure_collection().await?;
        purged?;
        info!("Purged vector collection");
        Ok(())
    }

    /// Answer `query` and log both turns under `session_id`
    pub async fn chat(&self, session_id: &str, query: &str) -> Result<Answer> {
        let session_id = match session_id.trim() {
            "" => DEFAULT_SESSION_ID,
            trimmed => trimmed,
        };
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("Empty query".to_string()));
        }

        let answer = self.orchestrator.answer(query).await?;
        let sources = serde_json::to_string(&answer.citations)
            .map_err(|e| RagError::Other(anyhow::Error::new(e)))?;

        let question = NewChatMessage {
            session_id: session_id.to_string(),
            role: ChatRole::User,
            content: query.to_string(),
            sources: None,
        };
        let reply = NewChatMessage {
            session_id: session_id.to_string(),
            role: ChatRole::Assistant,
            content: answer.text.clone(),
            sources: Some(sources),
        };
        self.database
            .append_chat_exchange(&question, &reply)
            .await?;

        Ok(answer)
    }

    #[inline]
    pub async fn history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.database.chat_history(session_id).await
    }

    #[inline]
    pub async fn job_status(&self, document_id: i64) -> Option<JobStatus> {
        self.queue.status(document_id).await
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        Ok(ServiceStatus {
            documents: self.database.count_documents().await?,
            points: self.index.count().await?,
            active_jobs: self.queue.active_jobs().await,
        })
    }

    /// Stop accepting uploads and wait for running ingestion to finish
    #[inline]
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

async fn open_pdf(path: PathBuf) -> Result<PdfText> {
    tokio::task::spawn_blocking(move || PdfText::open(path))
        .await
        .map_err(|e| RagError::Ingestion(format!("PDF parsing task failed: {e}")))?
}

/// Returns whether a file was removed
async fn remove_file_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}
