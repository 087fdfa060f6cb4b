//! I/O helpers: configuration, session persistence, and engine processes.

pub mod config;
pub mod engine;
pub mod process;
pub mod session_store;
