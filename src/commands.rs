use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{Database, LanceIndex, VectorIndex};
use crate::embeddings::OllamaClient;
use crate::indexer::IngestionOutcome;
use crate::llm::{LanguageModel, MistralClient};
use crate::service::RagService;

/// Upload a PDF and wait for its ingestion to finish
#[inline]
pub async fn upload_document(config: &Config, file: &Path, name: Option<String>) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let service = RagService::open(config).await?;
    let (receipt, handle) = service.upload(&bytes, &name).await?;

    println!(
        "Uploaded {} (ID: {}, {} pages)",
        receipt.filename, receipt.id, receipt.pages
    );

    let bar = if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("Indexing {}", receipt.filename));

    let outcome = handle.wait().await;
    bar.finish_and_clear();
    service.shutdown().await;

    match outcome? {
        IngestionOutcome::Completed {
            chunks_indexed,
            batches,
        } => {
            println!(
                "{} Indexed {} chunks in {} batches",
                style("✓").green(),
                chunks_indexed,
                batches
            );
        }
        IngestionOutcome::Aborted {
            chunks_indexed,
            reason,
        } => {
            println!(
                "{} Ingestion aborted: {} ({} chunks indexed)",
                style("⚠").yellow(),
                reason,
                chunks_indexed
            );
        }
    }

    Ok(())
}

/// List registered documents, newest first
#[inline]
pub async fn list_documents(config: &Config) -> Result<()> {
    let database = Database::initialize_from_config(config)
        .await
        .context("Failed to initialize database")?;
    let documents = database.list_documents().await?;

    if documents.is_empty() {
        println!("No documents have been uploaded yet.");
        println!("Use 'pdf-rag upload <file>' to add one.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    println!();

    for document in &documents {
        println!("📄 {} (ID: {})", document.original_name, document.id);
        println!(
            "   Pages: {}  Size: {} bytes",
            document.pages, document.bytes_size
        );
        if document.has_file() {
            println!("   Stored as: {}", document.filename);
        } else {
            println!("   Stored as: {}", style("(not saved)").dim());
        }
        println!(
            "   Uploaded: {}",
            document.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}

#[inline]
pub async fn delete_document(config: &Config, document_id: i64) -> Result<()> {
    let service = RagService::open(config).await?;
    let report = service.delete(document_id).await?;
    service.shutdown().await;

    if report.deleted {
        println!("Deleted document {}", document_id);
    } else {
        println!("Document {} was already gone", document_id);
    }
    if report.file_removed {
        println!("Removed stored file");
    }

    Ok(())
}

/// Drop every vector point. Asks first on an attended terminal unless `yes`.
#[inline]
pub async fn purge_index(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        if !console::user_attended() {
            anyhow::bail!("Refusing to purge without confirmation; pass --yes");
        }
        let confirmed = Confirm::new()
            .with_prompt("Delete every indexed chunk? Documents stay registered.")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Purge cancelled.");
            return Ok(());
        }
    }

    let service = RagService::open(config).await?;
    service.purge().await?;
    service.shutdown().await;

    println!("{} Vector index purged", style("✓").green());
    Ok(())
}

#[inline]
pub async fn ask(config: &Config, query: &str, session: &str) -> Result<()> {
    let service = RagService::open(config).await?;
    let result = service.chat(session, query).await;
    service.shutdown().await;
    let answer = result?;

    println!("{}", answer.text);
    if !answer.citations.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for citation in &answer.citations {
            println!(
                "  {} {} (score={:.3})",
                citation.label, citation.source, citation.score
            );
        }
    }

    Ok(())
}

#[inline]
pub async fn show_history(config: &Config, session: &str) -> Result<()> {
    let database = Database::initialize_from_config(config)
        .await
        .context("Failed to initialize database")?;
    let messages = database.chat_history(session).await?;

    if messages.is_empty() {
        println!("No messages in session '{}'.", session);
        return Ok(());
    }

    for message in &messages {
        println!(
            "[{}] {}: {}",
            message.created_at.format("%Y-%m-%d %H:%M:%S"),
            style(message.role).bold(),
            message.content
        );
    }

    Ok(())
}

/// Report the health of every backing component
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 PDF RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    match Database::initialize_from_config(config).await {
        Ok(database) => {
            println!("   ✅ SQLite: Connected");
            match database.count_documents().await {
                Ok(count) => println!("   📄 Documents: {}", count),
                Err(e) => println!("   ⚠️  Could not count documents - {}", e),
            }
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {}", e);
        }
    }

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let checked = tokio::task::spawn_blocking(move || client.health_check())
                .await
                .context("Ollama health check task failed")?;
            match checked {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.ollama.host, config.ollama.port
                    );
                    println!("   📋 Model: {}", config.ollama.model);
                    println!("   🔢 Dimension: {}", config.ollama.embedding_dimension);
                }
                Err(e) => {
                    warn!("Ollama health check failed: {:#}", e);
                    println!("   ⚠️  Ollama: Unhealthy - {}", e);
                }
            }
        }
        Err(e) => {
            println!("   ❌ Ollama: Invalid configuration - {}", e);
        }
    }

    println!("🔍 Vector Database Status:");
    let dimension = config.ollama.embedding_dimension as usize;
    match LanceIndex::open(config.vector_database_path(), dimension).await {
        Ok(index) => match index.count().await {
            Ok(points) => println!("   ✅ LanceDB: {} points", points),
            Err(e) => println!("   ⚠️  LanceDB: Connected but unreadable - {}", e),
        },
        Err(e) => {
            println!("   ❌ LanceDB: Failed to open - {}", e);
        }
    }

    println!("💬 Language Model Status:");
    let model = MistralClient::new(&config.llm);
    match model.ensure_configured() {
        Ok(()) => println!("   ✅ {}: API key configured", model.model_name()),
        Err(e) => println!("   ❌ {}: {}", model.model_name(), e),
    }

    info!("Status report complete");
    Ok(())
}
