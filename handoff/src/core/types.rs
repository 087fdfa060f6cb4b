//! Shared deterministic types for delegated sessions.
//!
//! These types define the persisted session record and the ephemeral result of
//! one engine invocation. They carry no I/O and no clock or id generation; the
//! session store supplies those.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hard cap on caller-triggered continuations per session.
pub const MAX_CONTINUE_ATTEMPTS: u32 = 5;

/// Lifecycle status of a delegated session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    NeedsContinue,
    Complete,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::NeedsContinue => "needs_continue",
            SessionStatus::Complete => "complete",
            SessionStatus::Error => "error",
        }
    }

    /// `complete` and `error` accept no further writes.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Error)
    }

    /// Legal status changes:
    ///
    /// - `running -> {complete, error, needs_continue}`
    /// - `needs_continue -> {running, complete, error}`
    ///
    /// A non-terminal status may also be kept while other fields change.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::{Complete, Error, NeedsContinue, Running};
        match (self, next) {
            (Complete | Error, _) => false,
            (Running, Running) | (NeedsContinue, NeedsContinue) => true,
            (Running, Complete | Error | NeedsContinue) => true,
            (NeedsContinue, Running | Complete | Error) => true,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured engine text stored on a session.
///
/// Serialized as `{"partial_output": "..."}` or `{"output": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionOutput {
    Partial { partial_output: String },
    Final { output: String },
}

impl SessionOutput {
    pub fn partial(text: impl Into<String>) -> Self {
        SessionOutput::Partial {
            partial_output: text.into(),
        }
    }

    pub fn complete(text: impl Into<String>) -> Self {
        SessionOutput::Final {
            output: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            SessionOutput::Partial { partial_output } => partial_output,
            SessionOutput::Final { output } => output,
        }
    }

    pub fn partial_text(&self) -> Option<&str> {
        match self {
            SessionOutput::Partial { partial_output } => Some(partial_output),
            SessionOutput::Final { .. } => None,
        }
    }
}

/// Persisted record of one delegated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub tool: String,
    pub status: SessionStatus,
    /// Caller arguments, stored verbatim for replay during continuation.
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<SessionOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub continue_count: u32,
}

impl Session {
    /// Fresh `running` session with no output.
    pub fn new(id: String, tool: &str, input: Value, now: DateTime<Utc>) -> Self {
        Self {
            id,
            tool: tool.to_string(),
            status: SessionStatus::Running,
            input,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
            continue_count: 0,
        }
    }

    /// Text captured by the last interrupted invocation, if any.
    pub fn partial_output(&self) -> Option<&str> {
        self.output.as_ref().and_then(SessionOutput::partial_text)
    }
}

/// Partial update applied to a stored session (read-modify-write).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub output: Option<SessionOutput>,
    pub error: Option<String>,
    pub continue_count: Option<u32>,
}

/// Result of a single engine invocation, bound to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub needs_continue: bool,
    pub session_id: String,
}
