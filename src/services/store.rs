use std::cmp::Ordering;

use crate::models::{ChatSession, Message, Role};
use crate::services::storage::StorageService;

/// Display and replacement ordering: pinned sessions first, then newest
/// first within each group.
pub fn selection_order(a: &ChatSession, b: &ChatSession) -> Ordering {
    b.is_pinned
        .cmp(&a.is_pinned)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Derives a session name from the first user message.
pub fn derive_name(text: &str) -> String {
    if text.chars().count() > 30 {
        let prefix: String = text.chars().take(30).collect();
        format!("{}...", prefix)
    } else {
        text.to_string()
    }
}

/// Owns the session collection and the active selection. Every mutation is
/// written through to storage as it happens; storage failures are logged
/// and the in-memory state stays authoritative.
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    active_id: String,
    storage: StorageService,
}

impl SessionStore {
    /// Builds the store from persisted state. The saved active id wins when
    /// it still names a loaded session; otherwise the first session in
    /// selection order becomes active.
    pub fn load(storage: StorageService) -> Self {
        let (sessions, saved_active) = storage.load();

        let active_id = saved_active
            .filter(|id| sessions.iter().any(|s| &s.id == id))
            .or_else(|| {
                sessions
                    .iter()
                    .min_by(|a, b| selection_order(a, b))
                    .map(|s| s.id.clone())
            })
            .unwrap_or_default();

        Self {
            sessions,
            active_id,
            storage,
        }
    }

    fn persist(&self) {
        if let Err(e) = self.storage.save_sessions(&self.sessions) {
            tracing::error!("Failed to save sessions: {}", e);
        }
    }

    fn persist_active_id(&self) {
        if let Err(e) = self.storage.save_active_id(&self.active_id) {
            tracing::error!("Failed to save active session id: {}", e);
        }
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Sessions in display order.
    pub fn sorted_sessions(&self) -> Vec<&ChatSession> {
        let mut sorted: Vec<&ChatSession> = self.sessions.iter().collect();
        sorted.sort_by(|a, b| selection_order(a, b));
        sorted
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut ChatSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        self.session(&self.active_id)
    }

    /// Makes the identified session active. Returns false for unknown ids.
    pub fn select(&mut self, id: &str) -> bool {
        if self.session(id).is_none() {
            return false;
        }
        if self.active_id != id {
            self.active_id = id.to_string();
            self.persist_active_id();
        }
        true
    }

    /// Inserts a freshly seeded session at the front of the list and
    /// returns its id. The new session is not selected.
    pub fn create_session(&mut self) -> String {
        let session = ChatSession::new();
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.persist();
        id
    }

    /// Removes a session. The collection is never left empty and the
    /// active id always names an existing session afterwards.
    pub fn delete_session(&mut self, id: &str) {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return;
        }

        if self.sessions.is_empty() {
            self.sessions.push(ChatSession::new());
        }
        self.persist();

        if self.active_id == id {
            let replacement = self
                .sessions
                .iter()
                .min_by(|a, b| selection_order(a, b))
                .map(|s| s.id.clone());
            if let Some(replacement) = replacement {
                self.active_id = replacement;
                self.persist_active_id();
            }
        }
    }

    /// Flips the pinned flag. Pinning affects ordering only; the creation
    /// timestamp is untouched.
    pub fn toggle_pin(&mut self, id: &str) {
        if let Some(session) = self.session_mut(id) {
            session.is_pinned = !session.is_pinned;
            self.persist();
        }
    }

    /// Applies a user-entered name and system prompt. A name that is blank
    /// after trimming falls back to a placeholder rather than leaving the
    /// session unnamed.
    pub fn rename(&mut self, id: &str, new_name: &str, new_system_prompt: &str) {
        if let Some(session) = self.session_mut(id) {
            let trimmed = new_name.trim();
            session.name = if trimmed.is_empty() {
                ChatSession::FALLBACK_NAME.to_string()
            } else {
                trimmed.to_string()
            };
            session.system_prompt = new_system_prompt.to_string();
            self.persist();
        }
    }

    /// Sets the name exactly as given. Used for derived names, which are
    /// already normalized.
    pub fn set_name(&mut self, id: &str, name: &str) {
        if let Some(session) = self.session_mut(id) {
            session.name = name.to_string();
            self.persist();
        }
    }

    pub fn append_message(&mut self, id: &str, message: Message) {
        if let Some(session) = self.session_mut(id) {
            session.messages.push(message);
            self.persist();
        }
    }

    /// Replaces the text of the identified message and drops everything
    /// after it; replies to the old text are stale once a user turn
    /// changes. Returns false when the message is not found.
    pub fn truncate_and_edit(&mut self, id: &str, message_id: &str, new_text: &str) -> bool {
        let Some(session) = self.session_mut(id) else {
            return false;
        };
        let Some(index) = session.messages.iter().position(|m| m.id == message_id) else {
            return false;
        };
        session.messages[index].text = new_text.to_string();
        session.messages.truncate(index + 1);
        self.persist();
        true
    }

    /// Drops everything after the last user message so a fresh reply can be
    /// produced. Returns false when the session has no user message.
    pub fn truncate_for_regenerate(&mut self, id: &str) -> bool {
        let Some(session) = self.session_mut(id) else {
            return false;
        };
        let Some(index) = session.messages.iter().rposition(|m| m.role == Role::User) else {
            return false;
        };
        session.messages.truncate(index + 1);
        self.persist();
        true
    }

    /// Puts back a transcript snapshot, undoing truncation after a failed
    /// request.
    pub fn restore_messages(&mut self, id: &str, messages: Vec<Message>) {
        if let Some(session) = self.session_mut(id) {
            session.messages = messages;
            self.persist();
        }
    }

    /// Case-insensitive substring search within one session. An empty term
    /// matches every message.
    pub fn search_messages(&self, id: &str, term: &str) -> Vec<&Message> {
        let Some(session) = self.session(id) else {
            return Vec::new();
        };
        let needle = term.to_lowercase();
        session
            .messages
            .iter()
            .filter(|m| m.text.to_lowercase().contains(&needle))
            .collect()
    }
}
