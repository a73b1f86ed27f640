//! Provider capability contract and adapters.

pub mod echo;
pub mod http;
pub mod openai;
pub mod params;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ConfabError;
use crate::types::{Message, Notice, ParamMap, ReplyStream};
use params::ParamSpec;

/// A request sent to a provider backend.
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// Full ordered conversation, system prompt first.
    pub messages: Vec<Message>,
    /// Requested call parameters. The resilient wrapper reconciles these
    /// against the adapter's declared support before the backend call.
    pub params: ParamMap,
    /// Absolute budget for the whole call, spanning retries.
    pub timeout: Duration,
}

/// A whole-response reply.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub notices: Vec<Notice>,
}

/// Core trait implemented by every provider adapter.
///
/// Implementations must be safe for concurrent invocation from multiple
/// sessions; the resilient wrapper relies on that and adds no locking.
/// Failures are classified through [`ConfabError::class`]; that
/// classification is the contract the retry policy depends on.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g. "openai", "echo").
    fn name(&self) -> &str;

    /// Parameters this adapter accepts, with valid ranges for numeric ones.
    fn supported_params(&self) -> &ParamSpec;

    /// Whether [`Provider::stream`] is available.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Return the full reply, or fail.
    async fn complete(&self, request: &CallRequest) -> Result<Completion, ConfabError>;

    /// Return a lazy sequence of reply chunks.
    ///
    /// Failing before the first chunk is equivalent to [`Provider::complete`]
    /// failing; a mid-sequence failure reaches the consumer as an `Err` item.
    async fn stream(&self, request: &CallRequest) -> Result<ReplyStream, ConfabError>;
}
