//! Retry, backoff, deadline, and streaming-failure handling around any
//! provider.
//!
//! [`ResilientProvider`] implements [`Provider`] itself, so callers cannot
//! distinguish a wrapped from an unwrapped adapter and wrappers compose.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ConfabError, ErrorClass};
use crate::provider::params::{reconcile, ParamSpec};
use crate::provider::{CallRequest, Completion, Provider};
use crate::types::{Notice, ReplyStream, StreamEvent};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Cap on any single backoff delay.
    pub max_backoff: Duration,
    /// Backoff multiplier per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Suspend for `delay`, then run attempt `next_attempt`.
    Retry { next_attempt: u32, delay: Duration },
    /// Stop retrying.
    Fail(FailReason),
}

/// Why the attempt loop terminated without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The error class is `Auth` or `Fatal`; propagate on first occurrence.
    NotRetryable,
    /// `max_attempts` attempts were made.
    AttemptsExhausted,
    /// The per-call deadline would pass before the next attempt.
    DeadlineExceeded,
}

impl RetryPolicy {
    /// Decide what follows attempt `attempt` (1-based) failing with an error
    /// of class `class`, given `remaining` time until the call deadline.
    ///
    /// Pure: the whole terminal-condition logic lives here so it can be
    /// exercised without a backend.
    pub fn decide(&self, attempt: u32, class: ErrorClass, remaining: Duration) -> RetryDecision {
        if class != ErrorClass::Transient {
            return RetryDecision::Fail(FailReason::NotRetryable);
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Fail(FailReason::AttemptsExhausted);
        }
        let delay = self.backoff_delay(attempt);
        if delay >= remaining {
            return RetryDecision::Fail(FailReason::DeadlineExceeded);
        }
        RetryDecision::Retry {
            next_attempt: attempt + 1,
            delay,
        }
    }

    /// Jittered exponential delay after attempt `attempt` (1-based):
    /// `initial * multiplier^(attempt-1)`, capped, then 75%-125% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = self.initial_backoff.as_secs_f64() * exp;
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter = 0.75 + rand_factor() * 0.5;
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in the rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}

/// Decorates any [`Provider`] with retry, backoff, deadline, and
/// streaming-failure handling.
///
/// Holds no mutable state beyond configuration; safe for concurrent use by
/// many sessions, provided the wrapped adapter is (a contractual requirement
/// on adapters, not enforced here).
pub struct ResilientProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Reconcile requested params against the inner adapter's support.
    /// Dropped keys never reach the backend call.
    fn prepared_request(&self, request: &CallRequest) -> (CallRequest, Option<Notice>) {
        let (effective, notice) =
            reconcile(&request.params, self.inner.supported_params(), self.inner.name());
        if let Some(n) = &notice {
            warn!(provider = self.inner.name(), message = %n.message, "parameter reconciliation");
        }
        (
            CallRequest {
                messages: request.messages.clone(),
                params: effective,
                timeout: request.timeout,
            },
            notice,
        )
    }

    fn retry_notice(&self, attempts: u32, total_delay: Duration) -> Notice {
        Notice::info(
            self.inner.name(),
            format!(
                "succeeded after {attempts} attempts ({}ms total backoff)",
                total_delay.as_millis()
            ),
        )
    }
}

/// Next step after a failure, with the deadline already folded in.
enum NextStep {
    Backoff { delay: Duration, next_attempt: u32 },
    Give(ConfabError),
}

fn next_step(
    policy: &RetryPolicy,
    attempt: u32,
    error: ConfabError,
    deadline: Instant,
    timeout: Duration,
) -> NextStep {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match policy.decide(attempt, error.class(), remaining) {
        RetryDecision::Retry {
            next_attempt,
            delay,
        } => NextStep::Backoff {
            delay,
            next_attempt,
        },
        RetryDecision::Fail(FailReason::DeadlineExceeded) => {
            NextStep::Give(ConfabError::Timeout(timeout.as_millis() as u64))
        }
        RetryDecision::Fail(_) => NextStep::Give(error),
    }
}

#[async_trait]
impl Provider for ResilientProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supported_params(&self) -> &ParamSpec {
        self.inner.supported_params()
    }

    fn supports_streaming(&self) -> bool {
        self.inner.supports_streaming()
    }

    async fn complete(&self, request: &CallRequest) -> Result<Completion, ConfabError> {
        let (inner_request, reconcile_notice) = self.prepared_request(request);
        let deadline = Instant::now() + request.timeout;
        let mut attempt: u32 = 1;
        let mut total_delay = Duration::ZERO;

        loop {
            debug!(provider = self.inner.name(), attempt, "complete attempt");
            let remaining = deadline.saturating_duration_since(Instant::now());
            let result = match tokio::time::timeout(remaining, self.inner.complete(&inner_request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ConfabError::Timeout(request.timeout.as_millis() as u64)),
            };

            match result {
                Ok(mut completion) => {
                    let mut notices: Vec<Notice> = reconcile_notice.iter().cloned().collect();
                    notices.append(&mut completion.notices);
                    if attempt > 1 {
                        notices.push(self.retry_notice(attempt, total_delay));
                    }
                    return Ok(Completion {
                        text: completion.text,
                        notices,
                    });
                }
                Err(error) => match next_step(&self.policy, attempt, error, deadline, request.timeout) {
                    NextStep::Backoff {
                        delay,
                        next_attempt,
                    } => {
                        warn!(
                            provider = self.inner.name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after transient error"
                        );
                        tokio::time::sleep(delay).await;
                        total_delay += delay;
                        attempt = next_attempt;
                    }
                    NextStep::Give(error) => return Err(error),
                },
            }
        }
    }

    async fn stream(&self, request: &CallRequest) -> Result<ReplyStream, ConfabError> {
        let (inner_request, reconcile_notice) = self.prepared_request(request);
        let inner = Arc::clone(&self.inner);
        let policy = self.policy.clone();
        let timeout = request.timeout;
        let name = self.inner.name().to_string();

        let stream = async_stream::stream! {
            if let Some(notice) = reconcile_notice {
                yield Ok(StreamEvent::Notice(notice));
            }

            let deadline = Instant::now() + timeout;
            let mut attempt: u32 = 1;
            let mut total_delay = Duration::ZERO;
            let mut delivered = String::new();

            'attempts: loop {
                debug!(provider = %name, attempt, "stream attempt");
                let remaining = deadline.saturating_duration_since(Instant::now());
                let opened = match tokio::time::timeout(remaining, inner.stream(&inner_request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ConfabError::Timeout(timeout.as_millis() as u64)),
                };

                let mut chunks = match opened {
                    Ok(chunks) => chunks,
                    Err(error) => match next_step(&policy, attempt, error, deadline, timeout) {
                        NextStep::Backoff { delay, next_attempt } => {
                            warn!(provider = %name, attempt, delay_ms = delay.as_millis() as u64, "retrying stream before first chunk");
                            tokio::time::sleep(delay).await;
                            total_delay += delay;
                            attempt = next_attempt;
                            continue 'attempts;
                        }
                        NextStep::Give(error) => {
                            yield Err(error);
                            return;
                        }
                    },
                };

                while let Some(event) = chunks.next().await {
                    match event {
                        Ok(StreamEvent::Delta(text)) => {
                            if delivered.is_empty() && attempt > 1 {
                                yield Ok(StreamEvent::Notice(Notice::info(
                                    name.clone(),
                                    format!(
                                        "succeeded after {attempt} attempts ({}ms total backoff)",
                                        total_delay.as_millis()
                                    ),
                                )));
                            }
                            delivered.push_str(&text);
                            yield Ok(StreamEvent::Delta(text));
                        }
                        Ok(StreamEvent::Notice(notice)) => {
                            yield Ok(StreamEvent::Notice(notice));
                        }
                        Err(error) => {
                            if delivered.is_empty() {
                                // Nothing reached the caller yet: same policy
                                // as a failed complete call.
                                drop(chunks);
                                match next_step(&policy, attempt, error, deadline, timeout) {
                                    NextStep::Backoff { delay, next_attempt } => {
                                        warn!(provider = %name, attempt, delay_ms = delay.as_millis() as u64, "retrying stream before first chunk");
                                        tokio::time::sleep(delay).await;
                                        total_delay += delay;
                                        attempt = next_attempt;
                                        continue 'attempts;
                                    }
                                    NextStep::Give(error) => {
                                        yield Err(error);
                                        return;
                                    }
                                }
                            }
                            // Partial output was delivered: retrying would
                            // splice two independent generations together.
                            warn!(provider = %name, delivered = delivered.len(), "stream interrupted mid-reply");
                            yield Err(ConfabError::StreamInterrupted {
                                partial: delivered.clone(),
                                message: error.to_string(),
                            });
                            return;
                        }
                    }
                }
                return; // drained fully
            }
        };

        Ok(Box::pin(stream))
    }
}
