pub mod chat;
pub mod export;
pub mod storage;
pub mod store;

pub use chat::{ChatController, ChatTurn, TurnOutcome};
pub use storage::{BlobStore, FileStore, MemoryStore, StorageService};
pub use store::SessionStore;
