//! Diagnostics for delegation, written to stderr.
//!
//! Session records are the durable trail of every call; tracing only helps
//! while debugging. stdout stays clean because it carries tool responses and
//! the `serve` protocol.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crate-specific filter variable, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "HANDOFF_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the stderr subscriber.
///
/// ```bash
/// HANDOFF_LOG=handoff=debug handoff call gemini_research --args '{"query": "..."}'
/// ```
///
/// A second call (or a subscriber installed by an embedding host) is ignored.
pub fn init() {
    let filter = filter_from(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

/// First parseable directive of `handoff_log`, `rust_log`, then `warn`.
fn filter_from(handoff_log: Option<String>, rust_log: Option<String>) -> EnvFilter {
    [handoff_log, rust_log]
        .into_iter()
        .flatten()
        .filter(|directive| !directive.trim().is_empty())
        .find_map(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_variable_wins() {
        let filter = filter_from(Some("debug".to_string()), Some("error".to_string()));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn falls_back_to_rust_log_then_warn() {
        let filter = filter_from(Some("  ".to_string()), Some("info".to_string()));
        assert_eq!(filter.to_string(), "info");
        assert_eq!(filter_from(None, None).to_string(), "warn");
    }
}
