#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};
use tracing::debug;

const DOCUMENT_COLUMNS: &str = "id, original_name, filename, pages, bytes_size, created_at";
const CHAT_COLUMNS: &str = "id, session_id, role, content, sources, created_at";

pub struct DocumentQueries;

impl DocumentQueries {
    /// Insert an empty record; the file is attached once it has been saved
    #[inline]
    pub async fn create(pool: &SqlitePool, original_name: &str, bytes_size: i64) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO documents (original_name, filename, pages, bytes_size, created_at) VALUES (?, '', 0, ?, ?)",
        )
        .bind(original_name)
        .bind(bytes_size)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?
        .last_insert_rowid();

        debug!("Created document {} ({})", id, original_name);

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?");
        sqlx::query_as::<_, Document>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get document by id")
    }

    /// All documents, newest first
    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Document>> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, Document>(&query)
            .fetch_all(pool)
            .await
            .context("Failed to list documents")
    }

    #[inline]
    pub async fn list_ids(pool: &SqlitePool) -> Result<Vec<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM documents ORDER BY id")
            .fetch_all(pool)
            .await
            .context("Failed to list document ids")
    }

    /// Record the stored file name and page count. Returns false if the row is gone.
    #[inline]
    pub async fn attach_file(
        pool: &SqlitePool,
        id: i64,
        filename: &str,
        pages: i64,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE documents SET filename = ?, pages = ? WHERE id = ?")
            .bind(filename)
            .bind(pages)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to attach file to document")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM documents")
            .fetch_one(pool)
            .await
            .context("Failed to count documents")
    }
}

pub struct ChatQueries;

impl ChatQueries {
    async fn insert<'e, E>(executor: E, message: &NewChatMessage) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO chat_messages (session_id, role, content, sources, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id)
        .bind(message.role)
        .bind(&message.content)
        .bind(&message.sources)
        .bind(now)
        .execute(executor)
        .await
        .context("Failed to append chat message")?;

        Ok(())
    }

    /// Write a question and its answer together; neither is kept if either insert fails
    #[inline]
    pub async fn append_exchange(
        pool: &SqlitePool,
        question: &NewChatMessage,
        answer: &NewChatMessage,
    ) -> Result<()> {
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin chat transaction")?;

        Self::insert(&mut *tx, question).await?;
        Self::insert(&mut *tx, answer).await?;

        tx.commit()
            .await
            .context("Failed to commit chat transaction")?;
        debug!("Logged exchange in session {}", question.session_id);
        Ok(())
    }

    /// Turns of one session in the order they were written
    #[inline]
    pub async fn history(pool: &SqlitePool, session_id: &str) -> Result<Vec<ChatMessage>> {
        let query = format!(
            "SELECT {CHAT_COLUMNS} FROM chat_messages WHERE session_id = ? ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, ChatMessage>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
            .context("Failed to load chat history")
    }
}
