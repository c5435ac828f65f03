use super::*;
use crate::database::vector::PointPayload;
use tempfile::TempDir;

const DIMENSION: usize = 4;

async fn create_test_index(dir: &TempDir) -> LanceIndex {
    let index = LanceIndex::open(dir.path().join("vectors"), DIMENSION)
        .await
        .expect("should open index");
    index.ensure_collection().await.expect("should ensure collection");
    index
}

fn point(document_id: i64, text: &str, vector: [f32; DIMENSION]) -> VectorPoint {
    VectorPoint::new(
        vector.to_vec(),
        PointPayload {
            text: text.to_string(),
            source: format!("doc{document_id}.pdf"),
            document_id,
        },
    )
}

fn sample_points() -> Vec<VectorPoint> {
    vec![
        point(1, "alpha", [1.0, 0.0, 0.0, 0.0]),
        point(1, "alpha-beta", [0.7071, 0.7071, 0.0, 0.0]),
        point(2, "beta", [0.0, 1.0, 0.0, 0.0]),
        point(3, "gamma", [0.0, 0.0, 1.0, 0.0]),
    ]
}

#[tokio::test]
async fn ensure_collection_is_idempotent() {
    let dir = TempDir::new().expect("should create temp dir");
    let index = create_test_index(&dir).await;

    index.ensure_collection().await.expect("second ensure");
    assert_eq!(index.count().await.expect("count"), 0);
}

#[tokio::test]
async fn store_and_search_points() {
    let dir = TempDir::new().expect("should create temp dir");
    let index = create_test_index(&dir).await;
    index.upsert(sample_points()).await.expect("upsert");
    assert_eq!(index.count().await.expect("count"), 4);

    let hits = index
        .search(&[1.0, 0.0, 0.0, 0.0], 2, &BTreeSet::from([1, 2, 3]))
        .await
        .expect("search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].text, "alpha");
    assert_eq!(hits[1].text, "alpha-beta");
    assert!((hits[0].score - 1.0).abs() < 1e-3);
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn search_is_scoped_to_allowed_documents() {
    let dir = TempDir::new().expect("should create temp dir");
    let index = create_test_index(&dir).await;
    index.upsert(sample_points()).await.expect("upsert");

    let hits = index
        .search(&[1.0, 0.0, 0.0, 0.0], 10, &BTreeSet::from([2, 3]))
        .await
        .expect("search");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.source != "doc1.pdf"));

    let none = index
        .search(&[1.0, 0.0, 0.0, 0.0], 10, &BTreeSet::new())
        .await
        .expect("search");
    assert!(none.is_empty());
}

#[tokio::test]
async fn delete_by_document_and_purge() {
    let dir = TempDir::new().expect("should create temp dir");
    let index = create_test_index(&dir).await;
    index.upsert(sample_points()).await.expect("upsert");

    index.delete_by_document(1).await.expect("delete");
    assert_eq!(index.count().await.expect("count"), 2);

    index.purge_all().await.expect("purge");
    assert_eq!(index.count().await.expect("count after purge"), 0);
    let hits = index
        .search(&[0.0, 1.0, 0.0, 0.0], 5, &BTreeSet::from([2]))
        .await
        .expect("search against absent collection");
    assert!(hits.is_empty());
    index.delete_by_document(2).await.expect("delete on absent collection");

    index.ensure_collection().await.expect("ensure after purge");
    assert_eq!(index.count().await.expect("count after ensure"), 0);
}

#[tokio::test]
async fn dimension_mismatch_fails_fast() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("vectors");
    let index = LanceIndex::open(&path, DIMENSION).await.expect("open");
    index.ensure_collection().await.expect("ensure");

    let wider = LanceIndex::open(&path, DIMENSION * 2).await.expect("open");
    assert!(matches!(
        wider.ensure_collection().await,
        Err(RagError::Config(_))
    ));
}

#[tokio::test]
async fn rejects_wrong_vector_length() {
    let dir = TempDir::new().expect("should create temp dir");
    let index = create_test_index(&dir).await;
    let bad = VectorPoint::new(
        vec![1.0, 0.0],
        PointPayload {
            text: "short".to_string(),
            source: "bad.pdf".to_string(),
            document_id: 1,
        },
    );
    assert!(matches!(
        index.upsert(vec![bad]).await,
        Err(RagError::Config(_))
    ));
}

#[tokio::test]
async fn reopened_index_sees_stored_points() {
    let dir = TempDir::new().expect("should create temp dir");
    {
        let index = create_test_index(&dir).await;
        index.upsert(sample_points()).await.expect("upsert");
    }

    let reopened = create_test_index(&dir).await;
    assert_eq!(reopened.count().await.expect("count"), 4);
}
