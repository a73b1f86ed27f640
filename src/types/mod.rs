//! Core data types.

pub mod message;
pub mod notice;
pub mod stream;

pub use message::{Message, Role};
pub use notice::Notice;
pub use stream::{ReplyStream, StreamEvent};

use std::collections::BTreeMap;

/// Call parameters keyed by provider parameter name.
///
/// A `BTreeMap` keeps iteration order stable so notices about dropped or
/// clamped parameters are deterministic.
pub type ParamMap = BTreeMap<String, serde_json::Value>;
