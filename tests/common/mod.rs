//! Shared test doubles.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use confab::error::ConfabError;
use confab::provider::params::ParamSpec;
use confab::provider::{CallRequest, Completion, Provider};
use confab::types::{ReplyStream, StreamEvent};

/// One scripted behavior per call, consumed in order.
pub enum Step {
    /// Succeed with this text; `stream` splits it into word chunks.
    Reply(&'static str),
    /// Fail with a transient error.
    TransientFail,
    /// Fail with an auth error.
    AuthFail,
    /// Fail with a fatal error.
    FatalFail,
    /// Stream these chunks, then fail with a transient error mid-stream.
    StreamThenFail(Vec<&'static str>),
}

/// A provider that plays back a script, counting calls and capturing the
/// requests it actually received.
pub struct ScriptedProvider {
    steps: Mutex<Vec<Step>>,
    calls: AtomicUsize,
    captured: Mutex<Vec<CallRequest>>,
    spec: ParamSpec,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps),
            calls: AtomicUsize::new(0),
            captured: Mutex::new(Vec::new()),
            spec: ParamSpec::new(),
        }
    }

    pub fn with_spec(mut self, spec: ParamSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Total number of `complete`/`stream` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests as the provider saw them (post-reconciliation).
    pub fn captured_requests(&self) -> Vec<CallRequest> {
        self.captured.lock().unwrap().clone()
    }

    fn next_step(&self, request: &CallRequest) -> Step {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.captured.lock().unwrap().push(request.clone());
        let mut steps = self.steps.lock().unwrap();
        assert!(!steps.is_empty(), "scripted provider ran out of steps");
        steps.remove(0)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supported_params(&self) -> &ParamSpec {
        &self.spec
    }

    async fn complete(&self, request: &CallRequest) -> Result<Completion, ConfabError> {
        match self.next_step(request) {
            Step::Reply(text) => Ok(Completion {
                text: text.to_string(),
                notices: Vec::new(),
            }),
            Step::TransientFail => Err(ConfabError::Transient("scripted transient failure".into())),
            Step::AuthFail => Err(ConfabError::Auth("scripted auth failure".into())),
            Step::FatalFail => Err(ConfabError::Fatal("scripted fatal failure".into())),
            Step::StreamThenFail(_) => panic!("streaming step used with complete"),
        }
    }

    async fn stream(&self, request: &CallRequest) -> Result<ReplyStream, ConfabError> {
        match self.next_step(request) {
            Step::Reply(text) => {
                let chunks: Vec<Result<StreamEvent, ConfabError>> = text
                    .split_inclusive(' ')
                    .map(|c| Ok(StreamEvent::Delta(c.to_string())))
                    .collect();
                Ok(stream::iter(chunks).boxed())
            }
            Step::TransientFail => Err(ConfabError::Transient("scripted transient failure".into())),
            Step::AuthFail => Err(ConfabError::Auth("scripted auth failure".into())),
            Step::FatalFail => Err(ConfabError::Fatal("scripted fatal failure".into())),
            Step::StreamThenFail(chunks) => {
                let items: Vec<Result<StreamEvent, ConfabError>> = chunks
                    .into_iter()
                    .map(|c| Ok(StreamEvent::Delta(c.to_string())))
                    .chain(std::iter::once(Err(ConfabError::Transient(
                        "scripted mid-stream failure".into(),
                    ))))
                    .collect();
                Ok(stream::iter(items).boxed())
            }
        }
    }
}
