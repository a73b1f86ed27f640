//! Confab: resilient multi-provider chat sessions.
//!
//! One capability contract ([`provider::Provider`]) covers whole-response
//! and incrementally streamed replies. [`resilience::ResilientProvider`]
//! adds retry, backoff, per-call deadlines, and mid-stream failure handling
//! behind the same contract, so wrapped and unwrapped adapters are
//! indistinguishable to callers. [`session::ChatSession`] owns the ordered
//! conversation history and sequences one turn at a time.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use confab::provider::echo::EchoProvider;
//! use confab::resilience::{ResilientProvider, RetryPolicy};
//! use confab::session::{ChatSession, Session};
//!
//! # async fn example() -> confab::error::Result<()> {
//! let provider = Arc::new(ResilientProvider::new(
//!     Arc::new(EchoProvider::new()),
//!     RetryPolicy::default(),
//! ));
//! let mut chat = ChatSession::new(Session::new("You are terse."), provider);
//! let outcome = chat.run_turn("hello").await?;
//! println!("{}", outcome.reply);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod resilience;
pub mod secrets;
pub mod session;
pub mod transcript;
pub mod types;
