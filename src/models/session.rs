use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

/// One conversation thread. Serialized with the field names the persisted
/// schema and older clients use, so every field that may be absent in old
/// data carries a backfill default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    #[serde(default = "new_session_id")]
    pub id: String,
    #[serde(default = "fallback_name")]
    pub name: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub const DEFAULT_NAME: &'static str = "New Chat";
    pub const FALLBACK_NAME: &'static str = "Chat";
    pub const DEFAULT_SYSTEM_PROMPT: &'static str = "You are a helpful AI assistant.";
    pub const GREETING: &'static str =
        "Hello! I am a helpful AI assistant. How can I help you today?";

    /// A fresh session, seeded with the model greeting so it is never empty.
    pub fn new() -> Self {
        Self {
            id: new_session_id(),
            name: Self::DEFAULT_NAME.to_string(),
            system_prompt: Self::DEFAULT_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::model(Self::GREETING)],
            is_pinned: false,
            created_at: Utc::now(),
        }
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == super::Role::User)
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

fn fallback_name() -> String {
    ChatSession::FALLBACK_NAME.to_string()
}

fn default_system_prompt() -> String {
    ChatSession::DEFAULT_SYSTEM_PROMPT.to_string()
}
