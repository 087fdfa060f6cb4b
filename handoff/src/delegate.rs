//! Delegated execution: one engine invocation tracked as a durable session.
//!
//! Every invocation is bound to a session that is persisted before the engine
//! is spawned, so a crash mid-call still leaves a record behind. The outcome
//! is classified and written back to that session:
//!
//! | observation                           | session          | result                         |
//! |---------------------------------------|------------------|--------------------------------|
//! | exit 0                                | `complete`       | success                        |
//! | exit 0, output at limit or marked     | `needs_continue` | success, `needs_continue`      |
//! | exit != 0                             | `error`          | failure                        |
//! | timeout with output                   | `needs_continue` | failure, `needs_continue`      |
//! | timeout without output / spawn failure| `error`          | failure                        |

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::{Outcome, ProcessObservation, TruncationRules, classify};
use crate::core::types::ExecutionResult;
use crate::error::DelegateError;
use crate::io::config::HandoffConfig;
use crate::io::engine::{CliRunner, EngineInvocation, ProcessRunner};
use crate::io::session_store::SessionStore;

/// Default bound for an invocation when the caller supplies none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Per-call options for a delegated execution.
#[derive(Debug, Clone)]
pub struct DelegateOptions {
    /// Tool name recorded on the session.
    pub tool: String,
    /// Caller arguments, stored verbatim on the session.
    pub input: Value,
    pub timeout: Duration,
    /// Paths passed to the engine as `@path` markers.
    pub file_refs: Vec<String>,
    /// Ask the engine to read every file instead of `file_refs`.
    pub all_files: bool,
    /// Earlier partial output of the same session. Recorded output is this
    /// text newline-joined with the new capture.
    pub carry_over: Option<String>,
}

impl DelegateOptions {
    pub fn new(tool: &str, input: Value) -> Self {
        Self {
            tool: tool.to_string(),
            input,
            timeout: DEFAULT_TIMEOUT,
            file_refs: Vec::new(),
            all_files: false,
            carry_over: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_file_refs(mut self, file_refs: Vec<String>) -> Self {
        self.file_refs = file_refs;
        self
    }

    pub fn with_carry_over(mut self, previous: Option<String>) -> Self {
        self.carry_over = previous.filter(|text| !text.is_empty());
        self
    }

    /// Text to record on the session for a capture of `output`.
    pub fn recorded_output(&self, output: &str) -> String {
        match &self.carry_over {
            Some(previous) => format!("{previous}\n{output}"),
            None => output.to_string(),
        }
    }
}

/// Seam between tool handlers and the execution engine.
pub trait Delegate {
    /// Run `prompt` in a fresh session and classify the outcome.
    fn delegate(&self, prompt: &str, options: &DelegateOptions) -> Result<ExecutionResult>;
}

/// Execution engine backed by a session store and a process runner.
#[derive(Debug)]
pub struct Delegator<R> {
    store: SessionStore,
    runner: R,
    rules: TruncationRules,
}

impl Delegator<CliRunner> {
    /// Build the production engine from configuration.
    pub fn from_config(config: &HandoffConfig, session_dir: impl Into<std::path::PathBuf>) -> Self {
        Delegator::new(
            SessionStore::new(session_dir),
            CliRunner::new(&config.engine),
            config.engine.truncation_rules(),
        )
    }
}

impl<R: ProcessRunner> Delegator<R> {
    pub fn new(store: SessionStore, runner: R, rules: TruncationRules) -> Self {
        Self {
            store,
            runner,
            rules,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Create a session, then run the engine against it.
    #[instrument(skip_all, fields(tool = %options.tool))]
    pub fn execute_delegated(
        &self,
        prompt: &str,
        options: &DelegateOptions,
    ) -> Result<ExecutionResult> {
        let session = self
            .store
            .create(&options.tool, options.input.clone())
            .context("create session")?;
        self.execute_in_session(&session.id, prompt, options)
    }

    /// Run the engine against an existing session and record the outcome on it.
    #[instrument(skip(self, prompt, options), fields(tool = %options.tool))]
    pub fn execute_in_session(
        &self,
        session_id: &str,
        prompt: &str,
        options: &DelegateOptions,
    ) -> Result<ExecutionResult> {
        let invocation = EngineInvocation::new(
            prompt,
            &options.file_refs,
            options.all_files,
            options.timeout,
        );
        info!(
            timeout_ms = options.timeout.as_millis() as u64,
            file_refs = options.file_refs.len(),
            "delegating to engine"
        );

        let output = match self.runner.run(&invocation) {
            Ok(output) => output,
            Err(err) => {
                let failure = DelegateError::SpawnFailure {
                    binary: self.runner.engine_name().to_string(),
                    reason: format!("{:#}", err),
                };
                warn!(err = %failure, "engine failed to start");
                self.store.mark_error(session_id, &failure.to_string())?;
                return Ok(failed(session_id, String::new(), failure.to_string()));
            }
        };

        let stdout = output.stdout_text();
        let stderr = output.stderr_text();
        let observation = ProcessObservation {
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            stdout: &stdout,
            stderr: &stderr,
            dropped_bytes: output.stdout_truncated,
        };
        let outcome = classify(&observation, &self.rules);
        debug!(?outcome, output_chars = stdout.chars().count(), "engine outcome");

        match outcome {
            Outcome::Complete => {
                self.store
                    .mark_complete(session_id, &options.recorded_output(&stdout))?;
                Ok(ExecutionResult {
                    success: true,
                    output: stdout,
                    error: None,
                    needs_continue: false,
                    session_id: session_id.to_string(),
                })
            }
            Outcome::Truncated => {
                self.store
                    .mark_needs_continue(session_id, &options.recorded_output(&stdout))?;
                Ok(ExecutionResult {
                    success: true,
                    output: stdout,
                    error: None,
                    needs_continue: true,
                    session_id: session_id.to_string(),
                })
            }
            Outcome::TimeoutRecoverable => {
                self.store
                    .mark_needs_continue(session_id, &options.recorded_output(&stdout))?;
                Ok(ExecutionResult {
                    success: false,
                    output: stdout,
                    error: Some(DelegateError::TimeoutRecoverable.to_string()),
                    needs_continue: true,
                    session_id: session_id.to_string(),
                })
            }
            Outcome::TimeoutFatal => {
                self.store
                    .mark_error(session_id, "Operation timed out with no output")?;
                Ok(failed(
                    session_id,
                    String::new(),
                    DelegateError::TimeoutFatal.to_string(),
                ))
            }
            Outcome::ExitFailure { message } => {
                self.store.mark_error(session_id, &message)?;
                let error = DelegateError::ExitFailure(message).to_string();
                Ok(failed(session_id, stdout, error))
            }
        }
    }
}

impl<R: ProcessRunner> Delegate for Delegator<R> {
    fn delegate(&self, prompt: &str, options: &DelegateOptions) -> Result<ExecutionResult> {
        self.execute_delegated(prompt, options)
    }
}

fn failed(session_id: &str, output: String, error: String) -> ExecutionResult {
    ExecutionResult {
        success: false,
        output,
        error: Some(error),
        needs_continue: false,
        session_id: session_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SessionStatus;
    use crate::test_support::{ScriptedRunner, TestSessions, completed, exited, timed_out};
    use anyhow::anyhow;
    use serde_json::json;

    fn options() -> DelegateOptions {
        DelegateOptions::new("gemini_research", json!({"query": "q"}))
    }

    fn execute(delegator: &Delegator<ScriptedRunner>, opts: &DelegateOptions) -> ExecutionResult {
        delegator
            .execute_delegated("prompt", opts)
            .expect("execute")
    }

    #[test]
    fn clean_exit_completes_session() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(completed("{\"a\":1}"))]));

        let result = execute(&delegator, &options());
        assert!(result.success);
        assert!(!result.needs_continue);
        assert_eq!(result.output, "{\"a\":1}");

        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(session.status, SessionStatus::Complete);
        assert_eq!(session.input, json!({"query": "q"}));
        assert_eq!(session.tool, "gemini_research");
    }

    #[test]
    fn output_at_limit_needs_continue() {
        let sessions = TestSessions::new();
        let text = "y".repeat(100_000);
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(completed(&text))]));

        let result = execute(&delegator, &options());
        assert!(result.success);
        assert!(result.needs_continue);

        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(session.status, SessionStatus::NeedsContinue);
        assert_eq!(session.partial_output().map(str::len), Some(100_000));
    }

    #[test]
    fn non_zero_exit_records_stderr() {
        let sessions = TestSessions::new();
        let runner = ScriptedRunner::new(vec![Ok(exited(1, "", "quota exceeded"))]);
        let delegator = sessions.delegator(runner);

        let result = execute(&delegator, &options());
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("quota exceeded"));

        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(session.status, SessionStatus::Error);
        assert_eq!(session.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn non_zero_exit_without_stderr_records_code() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(exited(7, "", ""))]));

        let result = execute(&delegator, &options());
        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(session.error.as_deref(), Some("Exit code: 7"));
    }

    #[test]
    fn timeout_with_output_is_resumable() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(timed_out("partial"))]));

        let result = execute(&delegator, &options());
        assert!(!result.success);
        assert!(result.needs_continue);
        assert_eq!(result.output, "partial");

        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(session.status, SessionStatus::NeedsContinue);
        assert_eq!(session.partial_output(), Some("partial"));
    }

    #[test]
    fn timeout_without_output_is_fatal() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(timed_out(""))]));

        let result = execute(&delegator, &options());
        assert!(!result.success);
        assert!(!result.needs_continue);
        assert_eq!(result.error.as_deref(), Some("Operation timed out"));

        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(session.status, SessionStatus::Error);
    }

    #[test]
    fn spawn_failure_marks_error_immediately() {
        let sessions = TestSessions::new();
        let runner = ScriptedRunner::new(vec![Err(anyhow!("No such file or directory"))]);
        let delegator = sessions.delegator(runner);

        let result = execute(&delegator, &options());
        assert!(!result.success);
        let error = result.error.expect("error");
        assert!(error.starts_with("Failed to execute gemini:"), "{error}");

        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(session.status, SessionStatus::Error);
    }

    #[test]
    fn session_exists_before_engine_runs() {
        let sessions = TestSessions::new();
        let store = sessions.store().clone();
        let runner = ScriptedRunner::new(vec![Ok(completed("ok"))]).on_run(move |_| {
            let listed = store.list().expect("list");
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].status, SessionStatus::Running);
        });
        let delegator = sessions.delegator(runner);
        execute(&delegator, &options());
    }

    #[test]
    fn carry_over_is_joined_into_recorded_output() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(completed("second"))]));
        let opts = options().with_carry_over(Some("first".to_string()));

        let result = execute(&delegator, &opts);
        assert_eq!(result.output, "second");
        let session = sessions.store().load(&result.session_id).expect("session");
        assert_eq!(
            session.output.as_ref().map(|o| o.text()),
            Some("first\nsecond")
        );
    }

    #[test]
    fn invocation_carries_files_and_timeout() {
        let sessions = TestSessions::new();
        let delegator = sessions.delegator(ScriptedRunner::new(vec![Ok(completed("ok"))]));
        let opts = options()
            .with_timeout(Duration::from_secs(42))
            .with_file_refs(vec!["src/".to_string()]);

        execute(&delegator, &opts);
        let invocations = delegator.runner().invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].args, vec!["@src/", "-p", "prompt"]);
        assert_eq!(invocations[0].timeout, Duration::from_secs(42));
    }
}
