pub mod adapter;
pub mod models;

pub use adapter::{GeminiProvider, DEFAULT_BASE_URL};
