//! Library crate for the GDB-over-MCP bridge.
//!
//! Exposes the error taxonomy, the structured-value tree, the MI parser,
//! configuration, observability, the per-session supervisor, the session
//! manager, and the MCP server itself so both the binary and the
//! integration tests can drive them directly.

pub mod config;
pub mod error;
pub mod manager;
pub mod mi;
pub mod observability;
pub mod output;
pub mod server;
pub mod session;
pub mod structured_value;
