//! File-per-session persistence (`<dir>/gemini-<id>.json`).
//!
//! Writes are atomic per record (temp file + rename) but there is no locking:
//! the last writer wins. Concurrent continuation of the same id must be
//! serialized by the caller. Distinct ids never touch the same file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::core::session_state::apply_patch;
use crate::core::types::{Session, SessionOutput, SessionPatch, SessionStatus};

const FILE_PREFIX: &str = "gemini-";
const FILE_SUFFIX: &str = ".json";

/// Durable session records in one directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path for `id`, or `None` if `id` cannot name a record file.
    pub fn path_for(&self, id: &str) -> Option<PathBuf> {
        is_valid_id(id).then(|| self.dir.join(format!("{FILE_PREFIX}{id}{FILE_SUFFIX}")))
    }

    /// Create and persist a fresh `running` session.
    #[instrument(skip(self, input))]
    pub fn create(&self, tool: &str, input: Value) -> Result<Session> {
        let now = Utc::now();
        let mut session = Session::new(Uuid::new_v4().to_string(), tool, input, now);
        self.save(&mut session)?;
        debug!(session_id = %session.id, "session created");
        Ok(session)
    }

    /// Load a session. Missing, unreadable, or corrupt records yield `None`.
    pub fn load(&self, id: &str) -> Option<Session> {
        let path = self.path_for(id)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %path.display(), err = %err, "session record not readable");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(path = %path.display(), err = %err, "ignoring corrupt session record");
                None
            }
        }
    }

    /// Persist the full record, refreshing `updated_at`.
    ///
    /// This is a raw write; lifecycle rules are enforced by [`SessionStore::update`].
    pub fn save(&self, session: &mut Session) -> Result<()> {
        session.updated_at = Utc::now();
        self.write_record(session)
    }

    /// Read-modify-write. Returns `Ok(None)` if the session does not exist and
    /// an error if the patch violates the session lifecycle.
    #[instrument(skip(self, patch), fields(status = ?patch.status))]
    pub fn update(&self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        let Some(mut session) = self.load(id) else {
            warn!("update for unknown session");
            return Ok(None);
        };
        apply_patch(&mut session, patch)?;
        self.save(&mut session)?;
        Ok(Some(session))
    }

    pub fn mark_needs_continue(&self, id: &str, partial_output: &str) -> Result<Option<Session>> {
        self.update(
            id,
            SessionPatch {
                status: Some(SessionStatus::NeedsContinue),
                output: Some(SessionOutput::partial(partial_output)),
                ..SessionPatch::default()
            },
        )
    }

    pub fn mark_complete(&self, id: &str, output: &str) -> Result<Option<Session>> {
        self.update(
            id,
            SessionPatch {
                status: Some(SessionStatus::Complete),
                output: Some(SessionOutput::complete(output)),
                ..SessionPatch::default()
            },
        )
    }

    pub fn mark_error(&self, id: &str, error: &str) -> Result<Option<Session>> {
        self.update(
            id,
            SessionPatch {
                status: Some(SessionStatus::Error),
                error: Some(error.to_string()),
                ..SessionPatch::default()
            },
        )
    }

    /// Bump `continue_count` and put the session back to `running`.
    pub fn increment_continue(&self, id: &str) -> Result<Option<Session>> {
        let Some(session) = self.load(id) else {
            return Ok(None);
        };
        self.update(
            id,
            SessionPatch {
                status: Some(SessionStatus::Running),
                continue_count: Some(session.continue_count + 1),
                ..SessionPatch::default()
            },
        )
    }

    /// All readable sessions, most recently updated first.
    pub fn list(&self) -> Result<Vec<Session>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read session dir {}", self.dir.display()));
            }
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read entry in {}", self.dir.display()))?;
            let name = entry.file_name();
            let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_prefix(FILE_PREFIX))
                .and_then(|n| n.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            if let Some(session) = self.load(id) {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Delete sessions not updated within `max_age_hours`. Returns the count removed.
    pub fn cleanup(&self, max_age_hours: u64) -> Result<usize> {
        let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX);
        let cutoff = Duration::try_hours(hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.cleanup_before(cutoff)
    }

    /// Delete sessions whose `updated_at` predates `cutoff`.
    #[instrument(skip(self))]
    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for session in self.list()? {
            if session.updated_at >= cutoff {
                continue;
            }
            let Some(path) = self.path_for(&session.id) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), err = %err, "failed to remove session"),
            }
        }
        debug!(removed, "session cleanup finished");
        Ok(removed)
    }

    fn write_record(&self, session: &Session) -> Result<()> {
        let path = self
            .path_for(&session.id)
            .with_context(|| format!("invalid session id {:?}", session.id))?;
        let mut buf = serde_json::to_string_pretty(session).context("serialize session")?;
        buf.push('\n');
        write_atomic(&path, &buf)
    }
}

/// Ids come from callers; only allow characters that cannot escape the directory.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}
