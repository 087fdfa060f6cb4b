//! Deterministic classification of a finished engine invocation.

/// Rules that decide when clean output is actually cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncationRules {
    /// Captured output at or above this many characters is treated as truncated.
    pub max_output_chars: usize,
    /// Substring the engine emits when it cuts its own response short.
    pub marker: String,
}

impl Default for TruncationRules {
    fn default() -> Self {
        Self {
            max_output_chars: 100_000,
            marker: "[Output truncated]".to_string(),
        }
    }
}

/// What the process layer observed about a child that did start.
#[derive(Debug, Clone, Copy)]
pub struct ProcessObservation<'a> {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: &'a str,
    pub stderr: &'a str,
    /// Bytes dropped because the capture buffer was full.
    pub dropped_bytes: usize,
}

/// Classified outcome. Spawn failures never reach the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Clean exit, but output is cut short and can be continued.
    Truncated,
    ExitFailure { message: String },
    TimeoutRecoverable,
    TimeoutFatal,
}

/// Classify an invocation. Timeout takes precedence over the exit status
/// because the child was killed by the timer.
pub fn classify(observation: &ProcessObservation<'_>, rules: &TruncationRules) -> Outcome {
    if observation.timed_out {
        return if observation.stdout.is_empty() {
            Outcome::TimeoutFatal
        } else {
            Outcome::TimeoutRecoverable
        };
    }

    match observation.exit_code {
        Some(0) => {
            if is_truncated(observation.stdout, observation.dropped_bytes, rules) {
                Outcome::Truncated
            } else {
                Outcome::Complete
            }
        }
        code => Outcome::ExitFailure {
            message: exit_failure_message(code, observation.stderr),
        },
    }
}

fn is_truncated(stdout: &str, dropped_bytes: usize, rules: &TruncationRules) -> bool {
    dropped_bytes > 0
        || stdout.chars().count() >= rules.max_output_chars
        || (!rules.marker.is_empty() && stdout.contains(&rules.marker))
}

fn exit_failure_message(code: Option<i32>, stderr: &str) -> String {
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("Exit code: {code}"),
        None => "Exit code: terminated by signal".to_string(),
    }
}
