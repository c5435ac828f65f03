use super::*;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true)
                .foreign_keys(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::raw_sql(include_str!("../migrations/20250101000000_initial_schema.sql"))
        .execute(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

#[tokio::test]
async fn document_lifecycle() {
    let (_temp_dir, pool) = create_test_pool().await;

    let created = DocumentQueries::create(&pool, "handbook.pdf", 2048)
        .await
        .expect("create");
    assert_eq!(created.original_name, "handbook.pdf");
    assert_eq!(created.filename, "");
    assert_eq!(created.pages, 0);
    assert_eq!(created.bytes_size, 2048);

    let filename = format!("doc_{}.pdf", created.id);
    assert!(
        DocumentQueries::attach_file(&pool, created.id, &filename, 12)
            .await
            .expect("attach")
    );

    let fetched = DocumentQueries::get_by_id(&pool, created.id)
        .await
        .expect("get")
        .expect("document exists");
    assert_eq!(fetched.filename, filename);
    assert_eq!(fetched.pages, 12);
    assert!(fetched.has_file());

    assert!(DocumentQueries::delete(&pool, created.id).await.expect("delete"));
    assert!(!DocumentQueries::delete(&pool, created.id).await.expect("delete again"));
    assert!(
        DocumentQueries::get_by_id(&pool, created.id)
            .await
            .expect("get")
            .is_none()
    );
}

#[tokio::test]
async fn attach_to_missing_document_reports_false() {
    let (_temp_dir, pool) = create_test_pool().await;
    assert!(
        !DocumentQueries::attach_file(&pool, 999, "doc_999.pdf", 1)
            .await
            .expect("attach")
    );
}

#[tokio::test]
async fn ids_are_listed_and_counted() {
    let (_temp_dir, pool) = create_test_pool().await;

    let mut ids = Vec::new();
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        ids.push(DocumentQueries::create(&pool, name, 1).await.expect("create").id);
    }

    assert_eq!(DocumentQueries::list_ids(&pool).await.expect("ids"), ids);
    assert_eq!(DocumentQueries::count(&pool).await.expect("count"), 3);

    let listed = DocumentQueries::list_all(&pool).await.expect("list");
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].original_name, "c.pdf");
}

#[tokio::test]
async fn chat_history_is_ordered_per_session() {
    let (_temp_dir, pool) = create_test_pool().await;

    for (session, question, answer) in [
        ("s1", "first question", "first answer"),
        ("s2", "other session", "other answer"),
        ("s1", "second question", "second answer"),
    ] {
        ChatQueries::append_exchange(
            &pool,
            &turn(session, ChatRole::User, question),
            &turn(session, ChatRole::Assistant, answer),
        )
        .await
        .expect("append");
    }

    let history = ChatQueries::history(&pool, "s1").await.expect("history");
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["first question", "first answer", "second question", "second answer"]
    );
    assert_eq!(history[1].role, ChatRole::Assistant);
    assert_eq!(history[1].sources.as_deref(), Some("[]"));
    assert!(history[0].sources.is_none());
    assert_eq!(ChatQueries::history(&pool, "s2").await.expect("history").len(), 2);
}

fn turn(session: &str, role: ChatRole, content: &str) -> NewChatMessage {
    NewChatMessage {
        session_id: session.to_string(),
        role,
        content: content.to_string(),
        sources: (role == ChatRole::Assistant).then(|| "[]".to_string()),
    }
}

#[tokio::test]
async fn failed_answer_insert_drops_the_question() {
    let (_temp_dir, pool) = create_test_pool().await;
    sqlx::raw_sql(
        "CREATE TRIGGER reject_answers BEFORE INSERT ON chat_messages \
         WHEN NEW.role = 'assistant' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .execute(&pool)
    .await
    .expect("trigger");

    let result = ChatQueries::append_exchange(
        &pool,
        &turn("s1", ChatRole::User, "question"),
        &turn("s1", ChatRole::Assistant, "answer"),
    )
    .await;

    assert!(result.is_err());
    assert!(ChatQueries::history(&pool, "s1").await.expect("history").is_empty());
}
