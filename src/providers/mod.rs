pub mod gemini;
pub mod retry;
pub mod traits;
pub mod types;

pub use gemini::GeminiProvider;
pub use retry::{send_with_backoff, RetryPolicy};
pub use traits::AiProvider;
pub use types::{ChatMessage, ChatRequest, ChatResponse, ProviderError};
