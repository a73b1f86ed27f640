//! Conversation state and turn orchestration.

pub mod context;
pub mod manager;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConfabError;
use crate::provider::{CallRequest, Provider};
use crate::transcript::TranscriptStore;
use crate::types::{Message, Notice, ParamMap, Role, StreamEvent};
use context::ContextWindow;

/// Ordered, append-only conversation state for one conversation.
///
/// The first message is always the system prompt, inserted once at creation
/// and never removed or reordered.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// New session with a generated id, seeded with the system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: vec![Message::system(system_prompt)],
            created_at: Utc::now(),
        }
    }

    /// Resume from persisted history, re-seeding the system prompt if the
    /// stored history lost it.
    pub fn resume(id: impl Into<String>, system_prompt: &str, mut messages: Vec<Message>) -> Self {
        if messages.first().map(|m| m.role) != Some(Role::System) {
            messages.insert(0, Message::system(system_prompt));
        }
        Self {
            id: id.into(),
            messages,
            created_at: Utc::now(),
        }
    }
}

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The full assistant reply (post-stream-drain if streamed).
    pub reply: String,
    pub notices: Vec<Notice>,
    /// Best-effort problems that did not fail the turn (e.g. a transcript
    /// append failure).
    pub warnings: Vec<String>,
    pub session_id: String,
}

/// Event yielded by [`ChatSession::stream_turn`].
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Incremental reply text.
    Delta(String),
    /// Non-fatal observability record.
    Notice(Notice),
    /// Final event after the stream drained and history was updated.
    Completed(TurnOutcome),
}

/// Owns one conversation and sequences request/response exchanges.
///
/// Turn serialization: `run_turn` and `stream_turn` take `&mut self`, so a
/// second in-flight turn on the same session is unrepresentable. Callers
/// that share sessions across tasks queue turns through
/// [`manager::SessionManager`].
pub struct ChatSession {
    session: Session,
    provider: Arc<dyn Provider>,
    params: ParamMap,
    timeout: Duration,
    keep_partial_replies: bool,
    store: Option<Arc<dyn TranscriptStore>>,
    context: Option<ContextWindow>,
}

impl ChatSession {
    pub fn new(session: Session, provider: Arc<dyn Provider>) -> Self {
        Self {
            session,
            provider,
            params: ParamMap::new(),
            timeout: Duration::from_secs(30),
            keep_partial_replies: false,
            store: None,
            context: None,
        }
    }

    pub fn with_params(mut self, params: ParamMap) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep the partial assistant text in history when a stream is
    /// interrupted mid-reply. Off by default.
    pub fn keep_partial_replies(mut self, keep: bool) -> Self {
        self.keep_partial_replies = keep;
        self
    }

    pub fn with_transcript_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_context_window(mut self, window: ContextWindow) -> Self {
        self.context = Some(window);
        self
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn history(&self) -> &[Message] {
        &self.session.messages
    }

    /// Append to in-memory history, mirroring to the transcript store.
    /// A persistence failure becomes a warning, never blocks the append.
    fn append(&mut self, message: Message, warnings: &mut Vec<String>) {
        if let Some(store) = &self.store {
            if let Err(error) = store.append(&self.session.id, &message) {
                warn!(session = %self.session.id, error = %error, "transcript append failed");
                warnings.push(format!("transcript append failed: {error}"));
            }
        }
        self.session.messages.push(message);
    }

    fn build_request(&self) -> CallRequest {
        let messages = match &self.context {
            Some(window) => window.fit(&self.session.messages),
            None => self.session.messages.clone(),
        };
        CallRequest {
            messages,
            params: self.params.clone(),
            timeout: self.timeout,
        }
    }

    /// Run one whole-response turn.
    ///
    /// On failure, history retains exactly the user message appended at the
    /// start of the turn; no assistant message is appended and the session
    /// stays usable.
    pub async fn run_turn(&mut self, user_text: &str) -> Result<TurnOutcome, ConfabError> {
        let mut warnings = Vec::new();
        self.append(Message::user(user_text), &mut warnings);
        let request = self.build_request();

        debug!(session = %self.session.id, messages = request.messages.len(), "turn start");
        let completion = self.provider.complete(&request).await?;

        self.append(Message::assistant(completion.text.clone()), &mut warnings);
        Ok(TurnOutcome {
            reply: completion.text,
            notices: completion.notices,
            warnings,
            session_id: self.session.id.clone(),
        })
    }

    /// Run one streamed turn: deltas and notices as they arrive, then a
    /// final [`TurnEvent::Completed`].
    ///
    /// The assistant message is assembled only after the stream drains. If
    /// the stream is interrupted mid-reply the partial text is appended only
    /// when [`ChatSession::keep_partial_replies`] is set. Dropping the
    /// returned stream cancels the turn; at most the user message has been
    /// appended by then.
    pub fn stream_turn(
        &mut self,
        user_text: impl Into<String>,
    ) -> impl Stream<Item = Result<TurnEvent, ConfabError>> + Send + '_ {
        let user_text = user_text.into();
        async_stream::stream! {
            let mut warnings = Vec::new();
            self.append(Message::user(user_text), &mut warnings);
            let request = self.build_request();

            debug!(session = %self.session.id, messages = request.messages.len(), "stream turn start");
            let mut chunks = match self.provider.stream(&request).await {
                Ok(chunks) => chunks,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };

            let mut reply = String::new();
            let mut notices = Vec::new();
            while let Some(event) = chunks.next().await {
                match event {
                    Ok(StreamEvent::Delta(text)) => {
                        reply.push_str(&text);
                        yield Ok(TurnEvent::Delta(text));
                    }
                    Ok(StreamEvent::Notice(notice)) => {
                        notices.push(notice.clone());
                        yield Ok(TurnEvent::Notice(notice));
                    }
                    Err(error) => {
                        drop(chunks);
                        if self.keep_partial_replies {
                            if let ConfabError::StreamInterrupted { partial, .. } = &error {
                                if !partial.is_empty() {
                                    self.append(Message::assistant(partial.clone()), &mut warnings);
                                }
                            }
                        }
                        yield Err(error);
                        return;
                    }
                }
            }
            drop(chunks);

            self.append(Message::assistant(reply.clone()), &mut warnings);
            yield Ok(TurnEvent::Completed(TurnOutcome {
                reply,
                notices,
                warnings,
                session_id: self.session.id.clone(),
            }));
        }
    }
}
