// Deterministic stand-ins for the model backends

use async_trait::async_trait;
use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::database::{Document, DocumentRegistry};
use crate::embeddings::{Embedder, l2_normalize};
use crate::extract::TextSource;
use crate::llm::{ChatTurn, LanguageModel};
use crate::{RagError, Result};

/// Bag-of-words embedder: every lowercase word lands in one hashed bucket
#[derive(Debug)]
pub struct WordHashEmbedder {
    dimension: usize,
    pub calls: AtomicUsize,
}

impl WordHashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }
}

fn bucket(word: &str, dimension: usize) -> usize {
    let hash = word
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    (hash % dimension as u64) as usize
}

impl Embedder for WordHashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String], _batch_size: usize) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimension];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    vector[bucket(&word.to_lowercase(), self.dimension)] += 1.0;
                }
                l2_normalize(&mut vector);
                vector
            })
            .collect())
    }
}

/// Language model that records its prompts and answers with a fixed reply
#[derive(Debug)]
pub struct ScriptedModel {
    reply: String,
    configured: bool,
    pub prompts: Mutex<Vec<Vec<ChatTurn>>>,
}

impl ScriptedModel {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            configured: true,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new("")
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map_or(0, |p| p.len())
    }
}

impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(RagError::Config("missing API key".to_string()))
        }
    }

    fn complete(&self, turns: &[ChatTurn], _temperature: f32) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(turns.to_vec());
        }
        Ok(self.reply.clone())
    }
}

/// Registry kept in a map, with a synchronous delete for simulating races
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    documents: Mutex<BTreeMap<i64, Document>>,
    next_id: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_now(&self, id: i64) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.remove(&id);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<i64, Document>>> {
        self.documents
            .lock()
            .map_err(|_| RagError::Database("registry lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentRegistry for MemoryRegistry {
    async fn create(&self, original_name: &str, bytes_size: i64) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        self.lock()?.insert(
            id,
            Document {
                id,
                original_name: original_name.to_string(),
                filename: String::new(),
                pages: 0,
                bytes_size,
                created_at: Utc::now().naive_utc(),
            },
        );
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<Document>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn list_ids(&self) -> Result<BTreeSet<i64>> {
        Ok(self.lock()?.keys().copied().collect())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.lock()?.remove(&id).is_some())
    }

    async fn attach_file(&self, id: i64, filename: &str, pages: i64) -> Result<bool> {
        let mut documents = self.lock()?;
        let Some(document) = documents.get_mut(&id) else {
            return Ok(false);
        };
        document.filename = filename.to_string();
        document.pages = pages;
        Ok(true)
    }
}

/// Embedder that removes a document from the registry during its first call
pub struct DeletingEmbedder {
    inner: WordHashEmbedder,
    registry: Arc<MemoryRegistry>,
    document_id: i64,
}

impl DeletingEmbedder {
    pub fn new(dimension: usize, registry: Arc<MemoryRegistry>, document_id: i64) -> Self {
        Self {
            inner: WordHashEmbedder::new(dimension),
            registry,
            document_id,
        }
    }
}

impl Embedder for DeletingEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        self.registry.remove_now(self.document_id);
        self.inner.embed(texts, batch_size)
    }
}

/// Pages of filler text that take a while to extract
#[derive(Debug)]
pub struct SlowPages {
    pages: usize,
    delay: Duration,
}

impl SlowPages {
    pub fn new(pages: usize, delay: Duration) -> Self {
        Self { pages, delay }
    }
}

impl TextSource for SlowPages {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_text(&self, page_index: usize) -> Result<String> {
        std::thread::sleep(self.delay);
        Ok(format!("page {page_index} filler text"))
    }
}

/// Build a PDF with one page per entry, each drawing its text in Helvetica
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("PDF serializes");
    bytes
}
