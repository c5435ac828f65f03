#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests over SQLite, LanceDB and mocked Ollama/Mistral servers

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_rag::RagError;
use pdf_rag::config::Config;
use pdf_rag::database::ChatRole;
use pdf_rag::indexer::IngestionOutcome;
use pdf_rag::service::RagService;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const DIMENSION: u32 = 64;

/// Hashed bag-of-words vectors, one per input text
fn embed_words(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).expect("request body is JSON");
    let embeddings: Vec<Vec<f32>> = body["input"]
        .as_array()
        .expect("input is an array")
        .iter()
        .map(|text| {
            let mut vector = vec![0.0_f32; DIMENSION as usize];
            for word in text
                .as_str()
                .unwrap_or_default()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let hash = word.to_lowercase().bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
                vector[(hash % u64::from(DIMENSION)) as usize] += 1.0;
            }
            vector
        })
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
}

fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
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
        kids.push(
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            })
            .into(),
        );
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

struct Harness {
    temp_dir: TempDir,
    ollama: MockServer,
    mistral: MockServer,
}

impl Harness {
    async fn start(reply: &str) -> Self {
        let ollama = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(embed_words)
            .mount(&ollama)
            .await;

        let mistral = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": reply } }]
            })))
            .mount(&mistral)
            .await;

        Self {
            temp_dir: TempDir::new().expect("tempdir"),
            ollama,
            mistral,
        }
    }

    fn config(&self, dimension: u32) -> Config {
        let mut config = Config::with_base_dir(self.temp_dir.path());
        config.ollama.host = self.ollama.address().ip().to_string();
        config.ollama.port = self.ollama.address().port();
        config.ollama.embedding_dimension = dimension;
        config.llm.api_url = format!("{}/v1/chat/completions", self.mistral.uri());
        config.llm.api_key = Some("test-key".to_string());
        config
    }

    async fn open(&self) -> RagService {
        RagService::open(&self.config(DIMENSION))
            .await
            .expect("service opens")
    }

    /// User messages sent to the chat model so far
    async fn prompts(&self) -> Vec<String> {
        self.mistral
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| {
                let body: Value = serde_json::from_slice(&request.body).expect("JSON body");
                body["messages"][1]["content"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

async fn upload(service: &RagService, name: &str, pages: &[&str]) -> i64 {
    let (receipt, handle) = service
        .upload(&pdf_with_pages(pages), name)
        .await
        .expect("upload");
    let outcome = handle.wait().await.expect("ingestion");
    assert!(matches!(outcome, IngestionOutcome::Completed { .. }));
    receipt.id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refund_question_is_answered_with_one_citation() {
    let harness = Harness::start("Refunds are processed within 14 days [1].").await;
    let service = harness.open().await;
    upload(&service, "policy.pdf", &["Refunds are processed within 14 days."]).await;

    let answer = service
        .chat("s1", "What is the refund policy?")
        .await
        .expect("chat");

    assert!(answer.text.contains("[1]"));
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].label, "[1]");
    assert_eq!(answer.citations[0].source, "policy.pdf");

    let prompts = harness.prompts().await;
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("QUESTION:\nWhat is the refund policy?\n\nCONTEXT:\n[1] (score="));
    assert!(prompts[0].contains("source=policy.pdf\nRefunds are processed within 14 days."));

    let history = service.history("s1").await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[1].role, ChatRole::Assistant);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deleted_document_is_never_cited() {
    let harness = Harness::start("ok").await;
    let service = harness.open().await;
    let removed = upload(&service, "old.pdf", &["Shipping costs ten euros."]).await;
    upload(&service, "new.pdf", &["Shipping is free."]).await;

    let report = service.delete(removed).await.expect("delete");
    assert!(report.deleted);
    assert!(report.file_removed);

    let answer = service.chat("s", "How much is shipping?").await.expect("chat");
    assert_eq!(answer.citations.len(), 1);
    assert!(answer.citations.iter().all(|c| c.source == "new.pdf"));
    assert!(!harness.prompts().await[0].contains("old.pdf"));

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn purge_leaves_an_empty_queryable_index() {
    let harness = Harness::start("I don't know.").await;
    let service = harness.open().await;
    upload(&service, "policy.pdf", &["Refunds are processed within 14 days."]).await;
    assert!(service.status().await.expect("status").points > 0);

    service.purge().await.expect("purge");

    let status = service.status().await.expect("status");
    assert_eq!(status.points, 0);
    assert_eq!(status.documents, 1);

    let answer = service.chat("s", "refund policy?").await.expect("chat");
    assert!(answer.citations.is_empty());
    assert!(harness.prompts().await[0].ends_with("CONTEXT:\n(no context)"));

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reopening_with_another_dimension_fails_fast() {
    let harness = Harness::start("ok").await;
    let service = harness.open().await;
    upload(&service, "policy.pdf", &["Refunds are processed within 14 days."]).await;
    service.shutdown().await;
    drop(service);

    let result = RagService::open(&harness.config(DIMENSION * 2)).await;
    assert!(matches!(result, Err(RagError::Config(_))));

    // the original dimension still works
    let service = harness.open().await;
    assert_eq!(service.list_documents().await.expect("list").len(), 1);
    service.shutdown().await;
}
