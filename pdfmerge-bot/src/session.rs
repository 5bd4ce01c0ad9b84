//! Per-chat merge sessions.
//!
//! Each chat owns one [`Session`] guarded by its own async mutex. Holding the
//! mutex across a validate-then-mutate pair keeps the sequence consistent
//! under concurrent event handling, and `drain` hands the sequence to the
//! merge before any blocking I/O begins.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No active collection
    Idle,
    /// Accumulating attachments
    Collecting,
}

/// Reference to an accepted attachment.
///
/// Immutable once recorded. Position in the session sequence is the merge
/// order and equals arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Opaque file identifier
    pub file_id: String,
    /// Declared size in bytes
    pub size_bytes: u64,
}

/// Read-only view of a session for validation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub count: usize,
    pub cumulative_bytes: u64,
}

/// One chat's collection state.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    refs: Vec<AttachmentRef>,
    cumulative_bytes: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            refs: Vec::new(),
            cumulative_bytes: 0,
        }
    }

    /// Reset to an empty collecting session, discarding any prior in-flight
    /// collection.
    pub fn begin(&mut self) {
        self.state = SessionState::Collecting;
        self.refs.clear();
        self.cumulative_bytes = 0;
    }

    /// Append an accepted attachment and return the new count.
    ///
    /// Precondition: the validator returned `Accept` for this attachment
    /// against the current snapshot.
    pub fn accept(&mut self, attachment: AttachmentRef) -> usize {
        self.cumulative_bytes += attachment.size_bytes;
        self.refs.push(attachment);
        self.refs.len()
    }

    /// Read-only view for validation.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            count: self.refs.len(),
            cumulative_bytes: self.cumulative_bytes,
        }
    }

    /// Take the ordered sequence and reset to Idle/empty.
    ///
    /// Called exactly once per merge attempt, before any external I/O, so a
    /// concurrently arriving attachment cannot be folded into an in-progress
    /// merge.
    pub fn drain(&mut self) -> Vec<AttachmentRef> {
        self.state = SessionState::Idle;
        self.cumulative_bytes = 0;
        std::mem::take(&mut self.refs)
    }
}

/// Holds sessions keyed by chat ID.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Get (or lazily create) the session cell for a chat.
    ///
    /// The caller locks the returned cell for the duration of one logical
    /// operation (validate+accept, or drain).
    pub fn session(&self, chat_id: &str) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new())))
            .clone()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
