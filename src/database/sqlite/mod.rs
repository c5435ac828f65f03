use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::RagError;
use crate::config::Config;
use crate::database::DocumentRegistry;
use crate::database::sqlite::models::{ChatMessage, Document, NewChatMessage};
use crate::database::sqlite::queries::{ChatQueries, DocumentQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

fn database_error(error: anyhow::Error) -> RagError {
    RagError::Database(format!("{error:#}"))
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config(config: &Config) -> Result<Self> {
        let config_dir = config.get_base_dir();
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config.database_path()).await
    }

    // Document operations
    #[inline]
    pub async fn list_documents(&self) -> crate::Result<Vec<Document>> {
        DocumentQueries::list_all(&self.pool)
            .await
            .map_err(database_error)
    }

    #[inline]
    pub async fn count_documents(&self) -> crate::Result<i64> {
        DocumentQueries::count(&self.pool)
            .await
            .map_err(database_error)
    }

    // Chat log operations
    /// Log a user turn and the assistant reply in one transaction
    #[inline]
    pub async fn append_chat_exchange(
        &self,
        question: &NewChatMessage,
        answer: &NewChatMessage,
    ) -> crate::Result<()> {
        ChatQueries::append_exchange(&self.pool, question, answer)
            .await
            .map_err(database_error)
    }

    #[inline]
    pub async fn chat_history(&self, session_id: &str) -> crate::Result<Vec<ChatMessage>> {
        ChatQueries::history(&self.pool, session_id)
            .await
            .map_err(database_error)
    }
}

#[async_trait]
impl DocumentRegistry for Database {
    async fn create(&self, original_name: &str, bytes_size: i64) -> crate::Result<i64> {
        DocumentQueries::create(&self.pool, original_name, bytes_size)
            .await
            .map(|document| document.id)
            .map_err(database_error)
    }

    async fn get(&self, id: i64) -> crate::Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id)
            .await
            .map_err(database_error)
    }

    async fn list_ids(&self) -> crate::Result<BTreeSet<i64>> {
        DocumentQueries::list_ids(&self.pool)
            .await
            .map(|ids| ids.into_iter().collect())
            .map_err(database_error)
    }

    async fn delete(&self, id: i64) -> crate::Result<bool> {
        DocumentQueries::delete(&self.pool, id)
            .await
            .map_err(database_error)
    }

    async fn attach_file(&self, id: i64, filename: &str, pages: i64) -> crate::Result<bool> {
        DocumentQueries::attach_file(&self.pool, id, filename, pages)
            .await
            .map_err(database_error)
    }
}
