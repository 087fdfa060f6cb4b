//! Configuration loaded from `handoff.toml`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::TruncationRules;

/// Environment variable that overrides the session directory.
pub const SESSION_DIR_ENV: &str = "SCW_SESSION_DIR";

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "handoff.toml";

/// Top-level configuration (TOML).
///
/// Missing fields default to the values the engine wrapper has always used.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HandoffConfig {
    pub engine: EngineConfig,
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Reasoning engine executable, resolved through `PATH`.
    pub binary: String,

    /// Clean output at or above this many characters needs continuation.
    pub max_output_chars: usize,

    /// Substring the engine prints when it cuts its own answer short.
    pub truncation_marker: String,

    /// Bound on captured stdout/stderr kept in memory per invocation.
    pub output_limit_bytes: usize,

    /// Upper bound on concurrently running engine processes. Unset means no
    /// limit beyond what the host enforces.
    pub max_concurrent_processes: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let rules = TruncationRules::default();
        Self {
            binary: "gemini".to_string(),
            max_output_chars: rules.max_output_chars,
            truncation_marker: rules.marker,
            output_limit_bytes: 8 * 1024 * 1024,
            max_concurrent_processes: None,
        }
    }
}

impl EngineConfig {
    pub fn truncation_rules(&self) -> TruncationRules {
        TruncationRules {
            max_output_chars: self.max_output_chars,
            marker: self.truncation_marker.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Session directory. Relative paths resolve against the working directory.
    pub dir: Option<PathBuf>,

    /// Default age threshold for `sessions cleanup`.
    pub max_age_hours: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_age_hours: 24,
        }
    }
}

impl HandoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.engine.binary.trim().is_empty() {
            return Err(anyhow!("engine.binary must be non-empty"));
        }
        if self.engine.max_output_chars == 0 {
            return Err(anyhow!("engine.max_output_chars must be > 0"));
        }
        if self.engine.output_limit_bytes == 0 {
            return Err(anyhow!("engine.output_limit_bytes must be > 0"));
        }
        if self.engine.max_concurrent_processes == Some(0) {
            return Err(anyhow!("engine.max_concurrent_processes must be > 0 when set"));
        }
        Ok(())
    }

    /// Resolve the session directory from the process environment.
    pub fn session_dir(&self, cwd: &Path) -> PathBuf {
        self.session_dir_with(std::env::var_os(SESSION_DIR_ENV), cwd)
    }

    /// Resolve the session directory: `env_override`, then `sessions.dir`,
    /// then `<cwd>/.claude/sessions`.
    pub fn session_dir_with(&self, env_override: Option<OsString>, cwd: &Path) -> PathBuf {
        let configured = env_override
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.sessions.dir.clone());
        match configured {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => cwd.join(dir),
            None => cwd.join(".claude").join("sessions"),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HandoffConfig::default()`.
pub fn load_config(path: &Path) -> Result<HandoffConfig> {
    if !path.exists() {
        let cfg = HandoffConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HandoffConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Render config as TOML, as `handoff config` prints it.
pub fn render_config(cfg: &HandoffConfig) -> Result<String> {
    toml::to_string_pretty(cfg).context("serialize config toml")
}
