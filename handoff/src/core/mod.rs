//! Deterministic, pure logic shared by the delegation layer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod parse;
pub mod prompt;
pub mod session_state;
pub mod types;
pub mod validation;
