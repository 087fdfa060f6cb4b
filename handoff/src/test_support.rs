//! Test-only runners, delegates, and stub engines.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::classifier::TruncationRules;
use crate::core::types::ExecutionResult;
use crate::delegate::{Delegate, DelegateOptions, Delegator};
use crate::io::engine::{EngineInvocation, ProcessRunner};
use crate::io::process::CommandOutput;
use crate::io::session_store::SessionStore;

type RunHook = Box<dyn Fn(&EngineInvocation) + Send + Sync>;

/// Process runner that replays scripted outputs in order and records every
/// invocation it receives. Running past the script is an error.
pub struct ScriptedRunner {
    outputs: Mutex<VecDeque<Result<CommandOutput>>>,
    invocations: Mutex<Vec<EngineInvocation>>,
    hook: Option<RunHook>,
}

impl ScriptedRunner {
    pub fn new(outputs: Vec<Result<CommandOutput>>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            invocations: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    /// Call `hook` before each scripted output is returned.
    pub fn on_run(mut self, hook: impl Fn(&EngineInvocation) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn invocations(&self) -> Vec<EngineInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn engine_name(&self) -> &str {
        "gemini"
    }

    fn run(&self, invocation: &EngineInvocation) -> Result<CommandOutput> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());
        if let Some(hook) = &self.hook {
            hook(invocation);
        }
        self.outputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted runner has no output left")))
    }
}

/// Clean exit with `stdout`.
pub fn completed(stdout: &str) -> CommandOutput {
    exited(0, stdout, "")
}

pub fn exited(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        ..CommandOutput::default()
    }
}

/// Killed at the deadline after writing `stdout`.
pub fn timed_out(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: None,
        stdout: stdout.as_bytes().to_vec(),
        timed_out: true,
        ..CommandOutput::default()
    }
}

/// Session store rooted in a temporary directory that lives as long as this value.
pub struct TestSessions {
    temp: TempDir,
    store: SessionStore,
}

impl TestSessions {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path().join("sessions"));
        Self { temp, store }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Delegator over this store with default truncation rules.
    pub fn delegator<R: ProcessRunner>(&self, runner: R) -> Delegator<R> {
        Delegator::new(self.store.clone(), runner, TruncationRules::default())
    }
}

impl Default for TestSessions {
    fn default() -> Self {
        Self::new()
    }
}

/// One call observed by [`ScriptedDelegate`].
#[derive(Debug, Clone)]
pub struct DelegateCall {
    pub prompt: String,
    pub options: DelegateOptions,
}

/// Delegate that returns scripted results without touching disk.
pub struct ScriptedDelegate {
    results: Mutex<VecDeque<ExecutionResult>>,
    calls: Mutex<Vec<DelegateCall>>,
}

impl ScriptedDelegate {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delegate answering once with a successful `output`.
    pub fn answering(output: &str) -> Self {
        Self::new(vec![success("sess-1", output)])
    }

    pub fn calls(&self) -> Vec<DelegateCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The single recorded call; panics if there was not exactly one.
    pub fn only_call(&self) -> DelegateCall {
        let calls = self.calls();
        assert_eq!(calls.len(), 1, "expected exactly one delegate call");
        calls[0].clone()
    }
}

impl Delegate for ScriptedDelegate {
    fn delegate(&self, prompt: &str, options: &DelegateOptions) -> Result<ExecutionResult> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(DelegateCall {
                prompt: prompt.to_string(),
                options: options.clone(),
            });
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| anyhow!("scripted delegate has no result left"))
    }
}

pub fn success(session_id: &str, output: &str) -> ExecutionResult {
    ExecutionResult {
        success: true,
        output: output.to_string(),
        error: None,
        needs_continue: false,
        session_id: session_id.to_string(),
    }
}

pub fn failure(session_id: &str, error: &str, needs_continue: bool) -> ExecutionResult {
    ExecutionResult {
        success: false,
        output: String::new(),
        error: Some(error.to_string()),
        needs_continue,
        session_id: session_id.to_string(),
    }
}

/// Write an executable `sh` script standing in for the engine binary.
#[cfg(unix)]
pub fn write_stub_engine(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))
        .with_context(|| format!("write stub {}", path.display()))?;
    let mut perms = fs::metadata(&path)
        .with_context(|| format!("stat stub {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms)
        .with_context(|| format!("chmod stub {}", path.display()))?;
    Ok(path)
}
