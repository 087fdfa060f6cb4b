//! Delegation and continuation layer for a large-context reasoning engine.
//!
//! Each tool call becomes a durable session: the engine (the `gemini` CLI by
//! default) runs as a bounded subprocess, its outcome is classified as
//! complete, needing continuation, or failed, and interrupted sessions can be
//! resumed a bounded number of times. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (session lifecycle, outcome
//!   classification, prompt assembly, output parsing, structural validation).
//! - **[`io`]**: Side-effecting operations (config, session files, process
//!   execution). Isolated behind [`io::engine::ProcessRunner`] for tests.
//!
//! [`delegate`] and [`continuation`] combine the two; [`tools`] exposes them
//! as named tools and [`serve`] speaks line-delimited JSON to a host.

pub mod continuation;
pub mod core;
pub mod delegate;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod serve;
pub mod templates;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
