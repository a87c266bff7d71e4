use crate::models::ResultRecord;

/// Conversation state threaded through otherwise independent CLI calls.
/// Owned by exactly one adapter; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    history_enabled: bool,
    current_session_id: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history_enabled(&self) -> bool {
        self.history_enabled
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    /// Records the call's history request and returns the session id to
    /// resume. History stays enabled once requested, until [`Self::clear`].
    pub fn begin_call(&mut self, use_history: Option<bool>) -> Option<String> {
        if use_history == Some(true) && !self.history_enabled {
            tracing::debug!("conversation history enabled");
            self.history_enabled = true;
        }
        if self.history_enabled {
            self.current_session_id.clone()
        } else {
            None
        }
    }

    /// Applies a reply decoded from the CLI's output.
    pub fn observe(&mut self, result: &ResultRecord) {
        if !self.history_enabled {
            return;
        }
        match &result.session_id {
            Some(session_id) => {
                if self.current_session_id.as_deref() != Some(session_id.as_str()) {
                    tracing::debug!(session_id = %session_id, "tracking CLI session");
                }
                self.current_session_id = Some(session_id.clone());
            }
            // An error without a session id gives no evidence the conversation survived.
            None if result.is_error() => {
                if let Some(previous) = self.current_session_id.take() {
                    tracing::warn!(session_id = %previous, "dropping CLI session after failed call");
                }
            }
            None => {}
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
