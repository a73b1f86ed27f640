//! Caller-facing turn API for front ends (CLI, web).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::context::ContextWindow;
use super::{ChatSession, Session, TurnOutcome};
use crate::config::ConfabConfig;
use crate::error::ConfabError;
use crate::provider::Provider;
use crate::transcript::TranscriptStore;
use crate::types::ParamMap;

/// Builds and owns [`ChatSession`]s keyed by session id.
///
/// Each session sits behind a fair `tokio::sync::Mutex`: a second turn
/// issued while one is in flight is queued and runs after the first
/// completes, so appends from two turns can never interleave.
pub struct SessionManager {
    provider: Arc<dyn Provider>,
    system_prompt: String,
    params: ParamMap,
    timeout: Duration,
    keep_partial_replies: bool,
    context: Option<ContextWindow>,
    store: Option<Arc<dyn TranscriptStore>>,
    sessions: std::sync::Mutex<HashMap<String, Arc<Mutex<ChatSession>>>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn Provider>, system_prompt: impl Into<String>) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            params: ParamMap::new(),
            timeout: Duration::from_secs(30),
            keep_partial_replies: false,
            context: None,
            store: None,
            sessions: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Wire session defaults from configuration.
    pub fn from_config(
        config: &ConfabConfig,
        provider: Arc<dyn Provider>,
        store: Option<Arc<dyn TranscriptStore>>,
    ) -> Self {
        let (_, descriptor) = config.active_provider();
        Self {
            provider,
            system_prompt: config.system_prompt.clone(),
            params: descriptor.params.clone(),
            timeout: config.call_timeout(),
            keep_partial_replies: config.runtime.keep_partial_replies,
            context: config.context_window(),
            store,
            sessions: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_params(mut self, params: ParamMap) -> Self {
        self.params = params;
        self
    }

    pub fn with_transcript_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Create a session, optionally resuming persisted history.
    pub fn create_session(&self, resume: Option<&str>) -> Result<String, ConfabError> {
        let session = match resume {
            Some(id) => {
                let store = self.store.as_ref().ok_or_else(|| {
                    ConfabError::Config("cannot resume without a transcript store".into())
                })?;
                let history = store.load_history(id)?;
                Session::resume(id, &self.system_prompt, history)
            }
            None => Session::new(self.system_prompt.clone()),
        };
        let id = session.id.clone();

        let mut chat = ChatSession::new(session, Arc::clone(&self.provider))
            .with_params(self.params.clone())
            .with_timeout(self.timeout)
            .keep_partial_replies(self.keep_partial_replies);
        if let Some(store) = &self.store {
            chat = chat.with_transcript_store(Arc::clone(store));
        }
        if let Some(window) = &self.context {
            chat = chat.with_context_window(window.clone());
        }

        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), Arc::new(Mutex::new(chat)));
        Ok(id)
    }

    /// The session handle, for callers that want `stream_turn`.
    pub fn session(&self, id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Run one whole-response turn on the named session, queueing behind
    /// any turn already in flight.
    pub async fn run_turn(
        &self,
        session_id: &str,
        user_text: &str,
    ) -> Result<TurnOutcome, ConfabError> {
        let chat = self
            .session(session_id)
            .ok_or_else(|| ConfabError::Config(format!("unknown session '{session_id}'")))?;
        let mut chat = chat.lock().await;
        chat.run_turn(user_text).await
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().unwrap().remove(session_id).is_some()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }
}
