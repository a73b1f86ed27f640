//! Transcript persistence.
//!
//! Best-effort collaborator of [`crate::session::ChatSession`]: an append
//! failure is reported as a turn warning, never retried or buffered, and
//! never blocks the in-memory history update.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;

use crate::error::ConfabError;
use crate::types::Message;

/// Archives messages as they are appended; `load_history` supports resuming
/// a prior session before its first turn.
pub trait TranscriptStore: Send + Sync {
    fn append(&self, session_id: &str, message: &Message) -> Result<(), ConfabError>;
    fn load_history(&self, session_id: &str) -> Result<Vec<Message>, ConfabError>;
}

/// One `<session_id>.jsonl` file per session, one JSON message per line.
pub struct JsonlTranscriptStore {
    root: PathBuf,
}

impl JsonlTranscriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{session_id}.jsonl"))
    }
}

impl TranscriptStore for JsonlTranscriptStore {
    fn append(&self, session_id: &str, message: &Message) -> Result<(), ConfabError> {
        fs::create_dir_all(&self.root)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(session_id))?;
        let line = serde_json::to_string(message)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn load_history(&self, session_id: &str) -> Result<Vec<Message>, ConfabError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(path)?;
        let mut messages = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(&line) {
                Ok(message) => messages.push(message),
                Err(error) => {
                    debug!(session = session_id, error = %error, "skipping malformed transcript line");
                }
            }
        }
        Ok(messages)
    }
}

/// In-memory store, for tests and for resume support without a disk backend.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    entries: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranscriptStore for MemoryTranscriptStore {
    fn append(&self, session_id: &str, message: &Message) -> Result<(), ConfabError> {
        self.entries
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    fn load_history(&self, session_id: &str) -> Result<Vec<Message>, ConfabError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}
