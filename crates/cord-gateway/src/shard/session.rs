//! Per-shard session state
//!
//! The only shard state that survives a reconnect.

use serde::{Deserialize, Serialize};

/// Session id and last sequence of one shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub last_sequence: Option<u64>,
    /// Host the server asked resumes to go to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the last sequence from a dispatch payload
    pub fn record_sequence(&mut self, sequence: u64) {
        self.last_sequence = Some(sequence);
    }

    /// Start tracking a new session from `READY`
    pub fn set_session(&mut self, session_id: impl Into<String>, resume_url: Option<String>) {
        self.session_id = Some(session_id.into());
        self.resume_url = resume_url;
    }

    /// Forget the session; the next handshake identifies from scratch
    pub fn clear(&mut self) {
        self.session_id = None;
        self.last_sequence = None;
        self.resume_url = None;
    }

    /// Session id and sequence to resume with, if both are known
    #[must_use]
    pub fn resume_info(&self) -> Option<(&str, u64)> {
        match (&self.session_id, self.last_sequence) {
            (Some(id), Some(seq)) => Some((id.as_str(), seq)),
            _ => None,
        }
    }

    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.resume_info().is_some()
    }
}
