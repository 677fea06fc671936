//! Session management, persistence and Gemini transport core for AI chat
//! frontends.

pub mod config;
pub mod models;
pub mod providers;
pub mod services;

pub use config::{ClientConfig, DEFAULT_MODEL};
pub use models::{ChatSession, Message, Role};
pub use providers::{
    send_with_backoff, AiProvider, ChatMessage, ChatRequest, ChatResponse, GeminiProvider,
    ProviderError, RetryPolicy,
};
pub use services::{
    BlobStore, ChatController, ChatTurn, FileStore, MemoryStore, SessionStore, StorageService,
    TurnOutcome,
};
