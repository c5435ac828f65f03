// Language model module
// Chat-completion backends used to phrase answers

pub mod mistral;

pub use mistral::MistralClient;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A hosted or local chat-completion model.
///
/// Calls block; async callers use `spawn_blocking`.
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Fail with a configuration error when credentials are missing.
    /// Must not touch the network.
    fn ensure_configured(&self) -> Result<()>;

    /// One completion for the ordered `turns`
    fn complete(&self, turns: &[ChatTurn], temperature: f32) -> Result<String>;
}
