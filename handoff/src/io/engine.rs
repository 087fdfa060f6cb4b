//! Process runner abstraction for the reasoning engine.
//!
//! The [`ProcessRunner`] trait decouples delegation from the actual engine
//! binary (by default `gemini`). Tests use scripted runners that return
//! predetermined outputs without spawning processes.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::io::config::EngineConfig;
use crate::io::process::{CommandOutput, ConcurrencyGate, run_command_with_timeout};

/// Flag carrying the prompt text.
pub const PROMPT_FLAG: &str = "-p";
/// Flag asking the engine to read the whole working tree.
pub const ALL_FILES_FLAG: &str = "--all_files";

/// One engine invocation: command-line arguments plus a wall-clock bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl EngineInvocation {
    pub fn new(prompt: &str, file_refs: &[String], all_files: bool, timeout: Duration) -> Self {
        Self {
            args: build_engine_args(prompt, file_refs, all_files),
            timeout,
        }
    }

    /// Prompt text carried after [`PROMPT_FLAG`], if present.
    pub fn prompt(&self) -> Option<&str> {
        let idx = self.args.iter().position(|arg| arg == PROMPT_FLAG)?;
        self.args.get(idx + 1).map(String::as_str)
    }
}

/// Build `[@path ... | --all_files] -p <prompt>`.
///
/// File markers keep the order they were requested in and always precede the
/// prompt flag. `all_files` wins over individual markers.
pub fn build_engine_args(prompt: &str, file_refs: &[String], all_files: bool) -> Vec<String> {
    let mut args = Vec::with_capacity(file_refs.len() + 2);
    if all_files {
        args.push(ALL_FILES_FLAG.to_string());
    } else {
        args.extend(
            file_refs
                .iter()
                .map(|path| format!("@{}", path.trim_start_matches('@'))),
        );
    }
    args.push(PROMPT_FLAG.to_string());
    args.push(prompt.to_string());
    args
}

/// Abstraction over engine process backends.
pub trait ProcessRunner {
    /// Name reported in spawn-failure messages.
    fn engine_name(&self) -> &str;

    /// Run the engine once. `Err` means the process could not be started or
    /// supervised; exit codes and timeouts are reported in [`CommandOutput`].
    fn run(&self, invocation: &EngineInvocation) -> Result<CommandOutput>;
}

/// Runner that spawns the configured engine binary.
///
/// The child inherits the caller's environment unchanged so engine
/// authentication flows through.
#[derive(Debug, Clone)]
pub struct CliRunner {
    binary: String,
    output_limit_bytes: usize,
    gate: Option<Arc<ConcurrencyGate>>,
}

impl CliRunner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            output_limit_bytes: config.output_limit_bytes,
            gate: config
                .max_concurrent_processes
                .map(|limit| Arc::new(ConcurrencyGate::new(limit))),
        }
    }
}

impl ProcessRunner for CliRunner {
    fn engine_name(&self) -> &str {
        &self.binary
    }

    #[instrument(skip_all, fields(binary = %self.binary, timeout = ?invocation.timeout))]
    fn run(&self, invocation: &EngineInvocation) -> Result<CommandOutput> {
        let _permit = self.gate.as_deref().map(|gate| {
            debug!(active = gate.active(), "waiting for engine slot");
            gate.acquire()
        });

        info!(arg_count = invocation.args.len(), "starting engine");
        let mut cmd = Command::new(&self.binary);
        cmd.args(&invocation.args);

        run_command_with_timeout(cmd, invocation.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {}", self.binary))
    }
}
