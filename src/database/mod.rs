// Database module
// SQLite for document metadata and the chat log, a vector index for embeddings

pub mod lancedb;
pub mod sqlite;
pub mod vector;

pub use self::lancedb::LanceIndex;
pub use sqlite::Database;
pub use sqlite::models::{ChatMessage, ChatRole, Document, NewChatMessage};
pub use vector::{
    MemoryIndex, PointPayload, SearchHit, VectorIndex, VectorPoint, upsert_chunks,
};

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::Result;

/// The set of known documents.
///
/// Document ids tag every vector point, and the live id set decides which
/// points a search may return.
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// Insert an empty record and return its id
    async fn create(&self, original_name: &str, bytes_size: i64) -> Result<i64>;

    async fn get(&self, id: i64) -> Result<Option<Document>>;

    async fn list_ids(&self) -> Result<BTreeSet<i64>>;

    /// Returns false when no such document existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Record the saved file; false when the document was deleted meanwhile
    async fn attach_file(&self, id: i64, filename: &str, pages: i64) -> Result<bool>;

    async fn exists(&self, id: i64) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }
}
