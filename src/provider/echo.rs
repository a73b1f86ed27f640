//! Deterministic offline provider.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use super::params::ParamSpec;
use super::{CallRequest, Completion, Provider};
use crate::error::ConfabError;
use crate::types::{ReplyStream, Role, StreamEvent};

/// Offline stand-in that echoes the last user message.
///
/// `stream` emits the same text as `complete`, split into word chunks whose
/// concatenation equals the full reply. Accepts no tunable parameters.
pub struct EchoProvider {
    spec: ParamSpec,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self {
            spec: ParamSpec::new(),
        }
    }

    fn reply_for(request: &CallRequest) -> String {
        let user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        if user.is_empty() {
            "Okay.".to_string()
        } else {
            format!("You said: {user}")
        }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    fn supported_params(&self) -> &ParamSpec {
        &self.spec
    }

    async fn complete(&self, request: &CallRequest) -> Result<Completion, ConfabError> {
        Ok(Completion {
            text: Self::reply_for(request),
            notices: Vec::new(),
        })
    }

    async fn stream(&self, request: &CallRequest) -> Result<ReplyStream, ConfabError> {
        let text = Self::reply_for(request);
        let chunks: Vec<Result<StreamEvent, ConfabError>> = text
            .split_inclusive(' ')
            .map(|chunk| Ok(StreamEvent::Delta(chunk.to_string())))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}
