//! Domain error taxonomy for delegated execution.
//!
//! Plumbing uses `anyhow`; these variants are attached as the root cause when
//! a caller needs to branch on the kind (`err.downcast_ref::<DelegateError>()`).
//! Parse failures and validation warnings never surface as errors.

use thiserror::Error;

use crate::core::types::SessionStatus;

#[derive(Debug, Error)]
pub enum DelegateError {
    /// Engine binary missing or unusable. Terminal.
    #[error("Failed to execute {binary}: {reason}")]
    SpawnFailure { binary: String, reason: String },

    /// Engine exited non-zero. Terminal; carries stderr or the exit code.
    #[error("{0}")]
    ExitFailure(String),

    /// Timed out after producing output. The session can be resumed.
    #[error("Operation timed out - use gemini_continue to resume")]
    TimeoutRecoverable,

    /// Timed out before producing any output. Terminal.
    #[error("Operation timed out")]
    TimeoutFatal,

    /// Continuation cap reached. Terminal.
    #[error("Maximum continue attempts ({max}) reached")]
    ContinuationExhausted { max: u32 },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("illegal session transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidInput { tool: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}
