//! Convenience re-exports for the common path.

pub use crate::config::ConfabConfig;
pub use crate::error::{ConfabError, ErrorClass, Result};
pub use crate::provider::registry::ProviderRegistry;
pub use crate::provider::{CallRequest, Completion, Provider};
pub use crate::resilience::{ResilientProvider, RetryPolicy};
pub use crate::session::manager::SessionManager;
pub use crate::session::{ChatSession, Session, TurnEvent, TurnOutcome};
pub use crate::types::{Message, Notice, ParamMap, ReplyStream, Role, StreamEvent};
