use crate::models::ChatSession;

/// Serializes a session to pretty-printed JSON for sharing or backup.
pub fn session_to_json(session: &ChatSession) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(session)
}
