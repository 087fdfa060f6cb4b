//! End-to-end delegation against stub engine scripts.
//!
//! Each test writes a small `sh` script standing in for the engine binary and
//! drives the real process runner through delegation and continuation.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};

use handoff::continuation::{ResumeOutcome, resume};
use handoff::core::classifier::TruncationRules;
use handoff::core::parse::parse_structured;
use handoff::core::types::SessionStatus;
use handoff::delegate::{DelegateOptions, Delegator};
use handoff::io::config::EngineConfig;
use handoff::io::engine::CliRunner;
use handoff::test_support::{TestSessions, write_stub_engine};

fn delegator_for(sessions: &TestSessions, binary: &Path) -> Delegator<CliRunner> {
    let config = EngineConfig {
        binary: binary.display().to_string(),
        ..EngineConfig::default()
    };
    Delegator::new(
        sessions.store().clone(),
        CliRunner::new(&config),
        TruncationRules::default(),
    )
}

fn options(timeout: Duration) -> DelegateOptions {
    DelegateOptions::new("gemini_research", json!({"query": "q"})).with_timeout(timeout)
}

#[test]
fn clean_json_answer_completes() {
    let sessions = TestSessions::new();
    let stub = write_stub_engine(sessions.root(), "engine", "printf '{\"a\":1}'").expect("stub");
    let delegator = delegator_for(&sessions, &stub);

    let result = delegator
        .execute_delegated("prompt", &options(Duration::from_secs(5)))
        .expect("execute");
    assert!(result.success);
    assert!(!result.needs_continue);
    assert_eq!(
        parse_structured::<Value>(&result.output),
        Some(json!({"a": 1}))
    );

    let session = sessions.store().load(&result.session_id).expect("session");
    assert_eq!(session.status, SessionStatus::Complete);
}

#[test]
fn killed_engine_leaves_resumable_partial_output() {
    let sessions = TestSessions::new();
    let stub = write_stub_engine(sessions.root(), "engine", "printf partial; exec sleep 5")
        .expect("stub");
    let delegator = delegator_for(&sessions, &stub);

    let result = delegator
        .execute_delegated("prompt", &options(Duration::from_millis(300)))
        .expect("execute");
    assert!(!result.success);
    assert!(result.needs_continue);
    assert_eq!(result.output, "partial");

    let session = sessions.store().load(&result.session_id).expect("session");
    assert_eq!(session.status, SessionStatus::NeedsContinue);
    assert_eq!(session.partial_output(), Some("partial"));
}

#[test]
fn failing_engine_records_stderr() {
    let sessions = TestSessions::new();
    let stub = write_stub_engine(sessions.root(), "engine", "echo 'rate limited' >&2; exit 3")
        .expect("stub");
    let delegator = delegator_for(&sessions, &stub);

    let result = delegator
        .execute_delegated("prompt", &options(Duration::from_secs(5)))
        .expect("execute");
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("rate limited\n"));

    let session = sessions.store().load(&result.session_id).expect("session");
    assert_eq!(session.status, SessionStatus::Error);
}

#[test]
fn missing_engine_is_a_spawn_failure() {
    let sessions = TestSessions::new();
    let delegator = delegator_for(&sessions, &sessions.root().join("no-such-engine"));

    let result = delegator
        .execute_delegated("prompt", &options(Duration::from_secs(5)))
        .expect("execute");
    assert!(!result.success);
    assert!(!result.needs_continue);
    let error = result.error.expect("error");
    assert!(error.starts_with("Failed to execute"), "{error}");

    let session = sessions.store().load(&result.session_id).expect("session");
    assert_eq!(session.status, SessionStatus::Error);
}

#[test]
fn engine_sees_markers_then_prompt() {
    let sessions = TestSessions::new();
    let stub = write_stub_engine(
        sessions.root(),
        "engine",
        "for arg in \"$@\"; do printf '%s\\n' \"$arg\"; done",
    )
    .expect("stub");
    let delegator = delegator_for(&sessions, &stub);

    let opts = options(Duration::from_secs(5))
        .with_file_refs(vec!["src/".to_string(), "Cargo.toml".to_string()]);
    let result = delegator
        .execute_delegated("multi word prompt", &opts)
        .expect("execute");
    let args: Vec<&str> = result.output.lines().collect();
    assert_eq!(
        args,
        vec!["@src/", "@Cargo.toml", "-p", "multi word prompt"]
    );
}

/// Full cycle: the first run is killed mid-answer, the resume finishes it, and
/// a second resume is answered from the record without spawning.
#[test]
fn interrupted_call_is_finished_by_resume() {
    let sessions = TestSessions::new();
    let marker = sessions.root().join("resumed");
    let body = format!(
        "if [ -f '{marker}' ]; then printf '\"b\":2}}'; \
         else touch '{marker}'; printf '{{\"a\":1,'; exec sleep 5; fi",
        marker = marker.display()
    );
    let stub = write_stub_engine(sessions.root(), "engine", &body).expect("stub");
    let delegator = delegator_for(&sessions, &stub);

    let first = delegator
        .execute_delegated("prompt", &options(Duration::from_millis(300)))
        .expect("execute");
    assert!(first.needs_continue);

    let outcome = resume(&delegator, &first.session_id).expect("resume");
    assert_eq!(
        outcome,
        ResumeOutcome::Completed {
            session_id: first.session_id.clone(),
            continue_count: 1,
            output: json!({"a": 1, "b": 2}),
            raw: false,
        }
    );

    let session = sessions.store().load(&first.session_id).expect("session");
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.continue_count, 1);

    std::fs::remove_file(&stub).expect("remove stub");
    let again = resume(&delegator, &first.session_id).expect("resume again");
    assert!(matches!(again, ResumeOutcome::AlreadyComplete { .. }));
}
