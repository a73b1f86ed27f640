//! Streaming reply types.

use futures::stream::BoxStream;

use super::notice::Notice;
use crate::error::ConfabError;

/// An event emitted while a reply streams in.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text chunk. Concatenating every delta of a stream yields
    /// exactly the full reply text, in order, with nothing skipped or
    /// duplicated.
    Delta(String),
    /// Non-fatal record attached to the call (parameter drops, retries).
    Notice(Notice),
}

/// A lazy, finite, non-restartable sequence of reply events.
///
/// Dropping the stream cancels the underlying backend call.
pub type ReplyStream = BoxStream<'static, Result<StreamEvent, ConfabError>>;
