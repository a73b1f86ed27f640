//! OpenAI-compatible Chat Completions adapter.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_error};
use super::params::ParamSpec;
use super::{CallRequest, Completion, Provider};
use crate::error::ConfabError;
use crate::types::{Message, ReplyStream, StreamEvent};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for any backend speaking the Chat Completions wire format.
pub struct OpenAiProvider {
    model: String,
    api_key: String,
    base_url: String,
    spec: ParamSpec,
    supports_stream: bool,
}

impl OpenAiProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            spec: default_param_spec(),
            supports_stream: true,
        }
    }

    /// Mark the backend as non-streaming (some proxies reject `stream: true`).
    pub fn without_streaming(mut self) -> Self {
        self.supports_stream = false;
        self
    }

    fn build_request_body(&self, request: &CallRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> =
            request.messages.iter().map(message_to_wire).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
        });
        let obj = body.as_object_mut().unwrap();
        // Params are already effective: reconciled upstream by the wrapper.
        for (name, value) in &request.params {
            obj.insert(name.clone(), value.clone());
        }
        body
    }
}

fn default_param_spec() -> ParamSpec {
    ParamSpec::new()
        .numeric("temperature", 0.0, 2.0)
        .numeric("top_p", 0.0, 1.0)
        .numeric("presence_penalty", -2.0, 2.0)
        .numeric("frequency_penalty", -2.0, 2.0)
        .numeric("max_tokens", 1.0, 128_000.0)
        .allow("seed")
        .allow("stop")
        .allow("user")
}

fn message_to_wire(message: &Message) -> serde_json::Value {
    serde_json::json!({
        "role": message.role,
        "content": message.content,
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supported_params(&self) -> &ParamSpec {
        &self.spec
    }

    fn supports_streaming(&self) -> bool {
        self.supports_stream
    }

    async fn complete(&self, request: &CallRequest) -> Result<Completion, ConfabError> {
        let body = self.build_request_body(request, false);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, "openai complete");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: ChatResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ConfabError::Fatal("no choices in response".to_string()))?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            notices: Vec::new(),
        })
    }

    async fn stream(&self, request: &CallRequest) -> Result<ReplyStream, ConfabError> {
        if !self.supports_stream {
            return Err(ConfabError::Unsupported(format!(
                "provider '{}' does not support streaming",
                self.name()
            )));
        }

        let body = self.build_request_body(request, true);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, "openai stream");

        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ConfabError::Network(e));
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = parse_sse_data(&line) {
                        match serde_json::from_str::<StreamChunk>(data) {
                            Ok(chunk) => {
                                if let Some(choice) = chunk.choices.into_iter().next() {
                                    if let Some(text) = choice.delta.content {
                                        if !text.is_empty() {
                                            yield Ok(StreamEvent::Delta(text));
                                        }
                                    }
                                }
                            }
                            Err(_) => {} // skip unparseable chunks
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
