
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    /// Display name given at upload
    pub original_name: String,
    /// Stored file name under the storage directory, empty until saved
    pub filename: String,
    pub pages: i64,
    pub bytes_size: i64,
    pub created_at: NaiveDateTime,
}

impl Document {
    /// Whether the uploaded file has been written and attached
    #[inline]
    pub fn has_file(&self) -> bool {
        !self.filename.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    /// JSON-encoded citation list, assistant turns only
    pub sources: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChatMessage {
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    pub sources: Option<String>,
}
