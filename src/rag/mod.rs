// Retrieval-augmented answering
// Query -> live-scoped search -> numbered context -> language model -> cited answer


use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{DocumentRegistry, SearchHit, VectorIndex};
use crate::embeddings::Embedder;
use crate::llm::{ChatTurn, LanguageModel};
use crate::{RagError, Result};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Instruction sent ahead of every question
pub const SYSTEM_PROMPT: &str = "You are a concise assistant. Use CONTEXT to answer. \
If not in context, say you don't know. Cite sources as [1], [2] using provided blocks.";

/// Context text used when retrieval finds nothing
pub const NO_CONTEXT: &str = "(no context)";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub temperature: f32,
}

impl Default for RetrievalSettings {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl RetrievalSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            temperature: config.llm.temperature,
        }
    }
}

/// Numbered reference back to one retrieved chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// `[1]`, `[2]`, ... in retrieval order
    pub label: String,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// Render hits as `[i] (score=0.123) source=name` blocks separated by blank lines
#[inline]
pub fn format_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_CONTEXT.to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] (score={:.3}) source={}\n{}",
                i + 1,
                hit.score,
                hit.source,
                hit.text
            )
        })
        .join("\n\n")
}

#[inline]
pub fn citations_for(hits: &[SearchHit]) -> Vec<Citation> {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| Citation {
            label: format!("[{}]", i + 1),
            source: hit.source.clone(),
            score: hit.score,
        })
        .collect()
}

/// The system and user messages for one question
#[inline]
pub fn build_prompt(query: &str, context: &str) -> Vec<ChatTurn> {
    vec![
        ChatTurn::system(SYSTEM_PROMPT),
        ChatTurn::user(format!("QUESTION:\n{query}\n\nCONTEXT:\n{context}")),
    ]
}

pub struct RetrievalOrchestrator {
    registry: Arc<dyn DocumentRegistry>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn LanguageModel>,
    settings: RetrievalSettings,
}

impl RetrievalOrchestrator {
    #[inline]
    pub fn new(
        registry: Arc<dyn DocumentRegistry>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn LanguageModel>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            registry,
            embedder,
            index,
            model,
            settings,
        }
    }

    #[inline]
    pub fn settings(&self) -> RetrievalSettings {
        self.settings
    }

    /// Top hits for `query`, restricted to documents registered right now
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("Query must not be empty".to_string()));
        }

        let allowed = self.registry.list_ids().await?;
        if allowed.is_empty() || self.settings.top_k == 0 {
            debug!("No registered documents, skipping retrieval");
            return Ok(Vec::new());
        }

        let embedder = Arc::clone(&self.embedder);
        let texts = vec![query.to_string()];
        let vectors = tokio::task::spawn_blocking(move || embedder.embed(&texts, 1))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {e}")))??;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("Embedder returned no vector".to_string()))?;

        let hits = self
            .index
            .search(&query_vector, self.settings.top_k, &allowed)
            .await?;
        debug!(
            "Retrieved {} hits across {} live documents",
            hits.len(),
            allowed.len()
        );
        Ok(hits)
    }

    /// Answer `query` from retrieved context, citing every hit in order.
    ///
    /// A missing credential is reported before anything is embedded or sent.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("Query must not be empty".to_string()));
        }
        self.model.ensure_configured()?;

        let hits = self.retrieve(query).await?;
        let context = format_context(&hits);
        let turns = build_prompt(query.trim(), &context);

        let model = Arc::clone(&self.model);
        let temperature = self.settings.temperature;
        let text = tokio::task::spawn_blocking(move || model.complete(&turns, temperature))
            .await
            .map_err(|e| RagError::LanguageModel(format!("Completion task failed: {e}")))??;

        info!(
            "Answered query with {} ({} citations)",
            self.model.model_name(),
            hits.len()
        );

        Ok(Answer {
            text,
            citations: citations_for(&hits),
        })
    }
}
