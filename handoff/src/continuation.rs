//! Resuming sessions whose last invocation was interrupted.
//!
//! A resume re-runs the engine against the same session with a prompt built
//! from the original tool, its input, and the tail of the partial output.
//! Terminal sessions are answered from the record without side effects, and a
//! session that has already been continued [`MAX_CONTINUE_ATTEMPTS`] times is
//! failed without spawning anything.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::parse::parse_structured;
use crate::core::prompt::{build_prompt, tail_chars};
use crate::core::types::{MAX_CONTINUE_ATTEMPTS, Session, SessionOutput, SessionStatus};
use crate::delegate::{DelegateOptions, Delegator};
use crate::error::DelegateError;
use crate::io::engine::ProcessRunner;
use crate::templates;

/// Every continuation gets a fresh bound of this length.
pub const CONTINUE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How much of the previous partial output is echoed back to the engine.
pub const PREVIOUS_OUTPUT_TAIL_CHARS: usize = 5_000;

/// Stored on the session when the continuation budget runs out.
const EXHAUSTED_SESSION_ERROR: &str = "Maximum continue attempts reached";

/// What a resume request came to.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    NotFound {
        session_id: String,
    },
    /// Terminal success; the stored output is returned unchanged.
    AlreadyComplete {
        session_id: String,
        output: Option<SessionOutput>,
    },
    /// Terminal failure recorded by an earlier invocation.
    Failed {
        session_id: String,
        original_error: Option<String>,
    },
    Exhausted {
        session_id: String,
        partial_output: Option<SessionOutput>,
    },
    /// The continuation itself was cut short; resume again. Covers both a
    /// timeout with output and a clean but truncated answer, and either way
    /// the reply reports `success: false` with `needs_continue: true`.
    StillIncomplete {
        session_id: String,
        continue_count: u32,
        partial_output: String,
    },
    EngineFailed {
        session_id: String,
        error: String,
    },
    Completed {
        session_id: String,
        continue_count: u32,
        /// Parsed combined output, or the combined text when `raw`.
        output: Value,
        raw: bool,
    },
}

impl ResumeOutcome {
    pub fn success(&self) -> bool {
        matches!(
            self,
            ResumeOutcome::AlreadyComplete { .. } | ResumeOutcome::Completed { .. }
        )
    }

    pub fn needs_continue(&self) -> bool {
        matches!(self, ResumeOutcome::StillIncomplete { .. })
    }

    /// Response body returned to callers.
    pub fn to_json(&self) -> Value {
        match self {
            ResumeOutcome::NotFound { session_id } => json!({
                "success": false,
                "error": DelegateError::SessionNotFound(session_id.clone()).to_string(),
            }),
            ResumeOutcome::AlreadyComplete { session_id, output } => json!({
                "success": true,
                "message": "Session already complete",
                "output": output,
                "session_id": session_id,
            }),
            ResumeOutcome::Failed {
                session_id,
                original_error,
            } => json!({
                "success": false,
                "error": "Session ended in error",
                "original_error": original_error,
                "session_id": session_id,
            }),
            ResumeOutcome::Exhausted {
                session_id,
                partial_output,
            } => json!({
                "success": false,
                "error": exhausted_message(),
                "partial_output": partial_output,
                "session_id": session_id,
            }),
            ResumeOutcome::StillIncomplete {
                session_id,
                continue_count,
                partial_output,
            } => json!({
                "success": false,
                "error": "Operation still incomplete after continuation",
                "needs_continue": true,
                "continue_count": continue_count,
                "partial_output": partial_output,
                "session_id": session_id,
            }),
            ResumeOutcome::EngineFailed { session_id, error } => json!({
                "success": false,
                "error": error,
                "session_id": session_id,
            }),
            ResumeOutcome::Completed {
                session_id,
                continue_count,
                output,
                raw,
            } => json!({
                "success": true,
                "output": output,
                "raw": raw,
                "continue_count": continue_count,
                "session_id": session_id,
            }),
        }
    }
}

fn exhausted_message() -> String {
    let err = DelegateError::ContinuationExhausted {
        max: MAX_CONTINUE_ATTEMPTS,
    };
    err.to_string()
}

/// Resume `session_id`, spawning the engine at most once.
#[instrument(skip(delegator))]
pub fn resume<R: ProcessRunner>(
    delegator: &Delegator<R>,
    session_id: &str,
) -> Result<ResumeOutcome> {
    let store = delegator.store();
    let Some(session) = store.load(session_id) else {
        warn!("resume for unknown session");
        return Ok(ResumeOutcome::NotFound {
            session_id: session_id.to_string(),
        });
    };

    match session.status {
        SessionStatus::Complete => {
            debug!("session already complete");
            return Ok(ResumeOutcome::AlreadyComplete {
                session_id: session.id,
                output: session.output,
            });
        }
        SessionStatus::Error => {
            return Ok(ResumeOutcome::Failed {
                session_id: session.id,
                original_error: session.error,
            });
        }
        SessionStatus::Running | SessionStatus::NeedsContinue => {}
    }

    if session.continue_count >= MAX_CONTINUE_ATTEMPTS {
        warn!(
            continue_count = session.continue_count,
            "continuation budget exhausted"
        );
        store.mark_error(&session.id, EXHAUSTED_SESSION_ERROR)?;
        return Ok(ResumeOutcome::Exhausted {
            session_id: session.id,
            partial_output: session.output,
        });
    }

    store
        .increment_continue(&session.id)?
        .with_context(|| format!("session {} vanished during resume", session.id))?;
    let continue_count = session.continue_count + 1;
    info!(continue_count, tool = %session.tool, "continuing session");

    let prompt = continuation_prompt(&session)?;
    let options = DelegateOptions::new(&session.tool, session.input.clone())
        .with_timeout(CONTINUE_TIMEOUT)
        .with_carry_over(session.partial_output().map(str::to_string));
    let result = delegator.execute_in_session(&session.id, &prompt, &options)?;

    if result.needs_continue {
        return Ok(ResumeOutcome::StillIncomplete {
            session_id: session.id,
            continue_count,
            partial_output: result.output,
        });
    }
    if !result.success {
        return Ok(ResumeOutcome::EngineFailed {
            session_id: session.id,
            error: result.error.unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    let combined = options.recorded_output(&result.output);
    let parsed: Option<Value> = parse_structured(&combined);
    let raw = parsed.is_none();
    Ok(ResumeOutcome::Completed {
        session_id: session.id,
        continue_count,
        output: parsed.unwrap_or(Value::String(combined)),
        raw,
    })
}

/// Prompt asking the engine to pick up where `session` stopped.
pub fn continuation_prompt(session: &Session) -> Result<String> {
    let input = serde_json::to_string_pretty(&session.input).context("serialize session input")?;
    let previous = session
        .partial_output()
        .filter(|text| !text.is_empty())
        .map(|text| tail_chars(text, PREVIOUS_OUTPUT_TAIL_CHARS));
    let text = templates::render(
        "continue",
        &json!({
            "tool": session.tool,
            "input": input,
            "previous": previous,
        }),
    )?;
    Ok(build_prompt(&text.task, &Map::new(), Some(&text.output_format)))
}
