use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::models::{ChatSession, Message, Role};
use crate::providers::{
    send_with_backoff, AiProvider, ChatMessage, ChatRequest, ChatResponse, ProviderError,
    RetryPolicy,
};
use crate::services::export;
use crate::services::store::{derive_name, SessionStore};

const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again.";
const BLOCKED_MESSAGE: &str = "*Response blocked due to safety settings.*";

/// An in-flight request: enough to match its outcome back up, cancel it,
/// and undo the transcript changes that preceded it.
struct Pending {
    seq: u64,
    session_id: String,
    token: CancellationToken,
    rollback: Option<Vec<Message>>,
}

/// A prepared model call. Intent methods on [`ChatController`] hand one of
/// these back; the embedder awaits [`ChatTurn::run`] on whatever task suits
/// it and feeds the outcome to [`ChatController::apply`].
pub struct ChatTurn {
    seq: u64,
    provider: Arc<dyn AiProvider>,
    request: ChatRequest,
    cancel: CancellationToken,
    policy: RetryPolicy,
}

impl ChatTurn {
    pub async fn run(self) -> TurnOutcome {
        let result = send_with_backoff(
            self.provider.as_ref(),
            self.request,
            &self.cancel,
            self.policy,
        )
        .await;
        TurnOutcome {
            seq: self.seq,
            result,
        }
    }
}

/// The result of a finished [`ChatTurn`].
#[derive(Debug)]
pub struct TurnOutcome {
    seq: u64,
    result: Result<ChatResponse, ProviderError>,
}

/// Drives the conversation flow over a [`SessionStore`]: submitting turns,
/// editing and regenerating, and reconciling request outcomes. At most one
/// request is in flight; starting a new one cancels its predecessor, and
/// outcomes from superseded turns are discarded.
pub struct ChatController {
    store: SessionStore,
    provider: Arc<dyn AiProvider>,
    config: ClientConfig,
    retry: RetryPolicy,
    pending: Option<Pending>,
    seq: u64,
    editing_message_id: Option<String>,
    last_error: Option<String>,
}

impl ChatController {
    pub fn new(store: SessionStore, provider: Arc<dyn AiProvider>, config: ClientConfig) -> Self {
        Self {
            store,
            provider,
            config,
            retry: RetryPolicy::default(),
            pending: None,
            seq: 0,
            editing_message_id: None,
            last_error: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Direct access for operations with no flow state of their own, such
    /// as pinning and renaming.
    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn is_sending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn editing_message_id(&self) -> Option<&str> {
        self.editing_message_id.as_deref()
    }

    /// Sends user input on the active session. Returns the turn to await,
    /// or None when the input is blank or an edit target has vanished.
    ///
    /// In edit mode the edited message takes the new text and the messages
    /// after it are dropped. Otherwise the text is appended, and a session
    /// still carrying its default name is named after this first message.
    pub fn submit(&mut self, text: &str) -> Option<ChatTurn> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.last_error = None;

        let session_id = self.store.active_id().to_string();

        if let Some(message_id) = self.editing_message_id.take() {
            if !self.store.truncate_and_edit(&session_id, &message_id, text) {
                return None;
            }
        } else {
            let should_name = {
                let session = self.store.session(&session_id)?;
                session.name == ChatSession::DEFAULT_NAME && !session.has_user_message()
            };
            self.store.append_message(&session_id, Message::user(text));
            if should_name {
                self.store.set_name(&session_id, &derive_name(text));
            }
        }

        Some(self.begin_turn(session_id, None))
    }

    /// Discards the replies after the last user message and requests a
    /// fresh one. Returns None while a request is in flight or when there
    /// is no user message to answer. A failed regeneration restores the
    /// discarded transcript.
    pub fn regenerate(&mut self) -> Option<ChatTurn> {
        if self.pending.is_some() {
            return None;
        }
        let session_id = self.store.active_id().to_string();
        let snapshot = self.store.session(&session_id)?.messages.clone();
        if !self.store.truncate_for_regenerate(&session_id) {
            return None;
        }
        self.last_error = None;
        Some(self.begin_turn(session_id, Some(snapshot)))
    }

    /// Cancels the in-flight request, if any. Not an error: nothing is
    /// reported and transcript changes already made are kept.
    pub fn stop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
        }
    }

    /// Reconciles a finished turn. Outcomes from superseded or stopped
    /// turns are ignored.
    pub fn apply(&mut self, outcome: TurnOutcome) {
        if self.pending.as_ref().map(|p| p.seq) != Some(outcome.seq) {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        match outcome.result {
            Ok(ChatResponse::Message(text)) => {
                self.store
                    .append_message(&pending.session_id, Message::model(text));
            }
            Ok(ChatResponse::Blocked { categories }) => {
                self.store
                    .append_message(&pending.session_id, Message::model(BLOCKED_MESSAGE));
                self.last_error = Some(format!(
                    "Response blocked due to safety settings. ({})",
                    categories.join(", ")
                ));
            }
            Err(ProviderError::Cancelled) => {}
            Err(e) => {
                tracing::error!("Chat request failed: {}", e);
                if let Some(snapshot) = pending.rollback {
                    self.store.restore_messages(&pending.session_id, snapshot);
                }
                self.last_error = Some(GENERIC_ERROR.to_string());
            }
        }
    }

    /// Creates a fresh session and makes it active.
    pub fn create_session(&mut self) -> String {
        self.stop();
        let id = self.store.create_session();
        self.store.select(&id);
        self.editing_message_id = None;
        self.last_error = None;
        id
    }

    /// Switches the active session, abandoning any in-flight request and
    /// pending edit. Selecting the already-active session changes nothing.
    pub fn select_session(&mut self, id: &str) -> bool {
        if id == self.store.active_id() {
            return true;
        }
        if !self.store.select(id) {
            return false;
        }
        self.stop();
        self.editing_message_id = None;
        self.last_error = None;
        true
    }

    pub fn delete_session(&mut self, id: &str) {
        let was_active = id == self.store.active_id();
        self.store.delete_session(id);
        if was_active {
            self.stop();
            self.editing_message_id = None;
            self.last_error = None;
        }
    }

    /// Enters edit mode for one of the user's own messages in the active
    /// session and returns its text for prefilling the composer. Rejected
    /// while a request is in flight.
    pub fn begin_edit(&mut self, message_id: &str) -> Option<String> {
        if self.pending.is_some() {
            return None;
        }
        let session = self.store.active_session()?;
        let message = session.messages.iter().find(|m| m.id == message_id)?;
        if message.role != Role::User {
            return None;
        }
        self.editing_message_id = Some(message_id.to_string());
        Some(message.text.clone())
    }

    pub fn cancel_edit(&mut self) {
        self.editing_message_id = None;
    }

    /// Serializes a session for sharing.
    pub fn share_session(&self, id: &str) -> Option<String> {
        let session = self.store.session(id)?;
        match export::session_to_json(session) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!("Failed to serialize session for sharing: {}", e);
                None
            }
        }
    }

    fn begin_turn(&mut self, session_id: String, rollback: Option<Vec<Message>>) -> ChatTurn {
        if let Some(previous) = self.pending.take() {
            previous.token.cancel();
        }

        self.seq += 1;
        let token = CancellationToken::new();
        let request = self.build_request(&session_id);

        self.pending = Some(Pending {
            seq: self.seq,
            session_id,
            token: token.clone(),
            rollback,
        });

        ChatTurn {
            seq: self.seq,
            provider: self.provider.clone(),
            request,
            cancel: token,
            policy: self.retry,
        }
    }

    fn build_request(&self, session_id: &str) -> ChatRequest {
        let session = self.store.session(session_id);
        let messages = session
            .map(|s| {
                s.messages
                    .iter()
                    .map(|m| ChatMessage {
                        role: m.role,
                        text: m.text.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let system_prompt = session
            .map(|s| s.system_prompt.clone())
            .filter(|p| !p.trim().is_empty());

        ChatRequest {
            api_key: self.config.api_key.clone(),
            model: self.config.model.clone(),
            messages,
            base_url: self.config.base_url.clone(),
            system_prompt,
        }
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending {
            pending.token.cancel();
        }
    }
}
