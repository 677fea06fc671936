pub mod message;
pub mod session;

pub use message::{new_message_id, Message, Role};
pub use session::ChatSession;
