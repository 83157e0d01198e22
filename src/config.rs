//! Environment-variable-driven configuration.
//!
//! Mirrors the teacher's `stripped_env_vars()` pattern in `process.rs`: read
//! once, lazily, with a documented default. There is no config-file layer --
//! this is a single bridge process, not a multi-tenant service.

/// Default post-command settle delay (§4.4 step 3), overridden by
/// `GDB_MCP_POST_COMMAND_DELAY_MS`.
pub const DEFAULT_POST_COMMAND_DELAY_MS: u64 = 2000;

/// Default per-command timeout (§4.4 step 5), overridden by
/// `GDB_MCP_COMMAND_TIMEOUT_MS`.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Default maximum concurrent sessions (§4.7), overridden by
/// `GDB_MCP_MAX_SESSIONS`.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// Default GDB binary, overridden by `GDB_MCP_GDB_PATH`.
pub const DEFAULT_GDB_PATH: &str = "gdb";

/// Grace period the termination protocol waits for a graceful `quit` before
/// force-killing the subprocess (§4.6). Not currently env-overridable -- the
/// spec fixes it at 500ms.
pub const TERMINATION_GRACE_MS: u64 = 500;

pub fn post_command_delay_ms() -> u64 {
    env_u64("GDB_MCP_POST_COMMAND_DELAY_MS", DEFAULT_POST_COMMAND_DELAY_MS)
}

pub fn command_timeout_ms() -> u64 {
    env_u64("GDB_MCP_COMMAND_TIMEOUT_MS", DEFAULT_COMMAND_TIMEOUT_MS)
}

pub fn max_sessions() -> usize {
    env_u64("GDB_MCP_MAX_SESSIONS", DEFAULT_MAX_SESSIONS as u64) as usize
}

pub fn gdb_path() -> String {
    std::env::var("GDB_MCP_GDB_PATH").unwrap_or_else(|_| DEFAULT_GDB_PATH.to_string())
}

/// Read an unsigned-integer env var, falling back to `default` if it's
/// absent or not a valid `u64`. Never panics on a malformed value.
fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_used_when_env_absent() {
        // SAFETY-relevant only in that these are process-wide env vars;
        // tests run in the same process, so avoid vars other tests set.
        unsafe {
            std::env::remove_var("GDB_MCP_COMMAND_TIMEOUT_MS_TEST_UNSET");
        }
        assert_eq!(
            env_u64("GDB_MCP_COMMAND_TIMEOUT_MS_TEST_UNSET", 10_000),
            10_000
        );
    }

    #[test]
    fn malformed_env_value_falls_back_to_default() {
        unsafe {
            std::env::set_var("GDB_MCP_TEST_MALFORMED", "not-a-number");
        }
        assert_eq!(env_u64("GDB_MCP_TEST_MALFORMED", 42), 42);
        unsafe {
            std::env::remove_var("GDB_MCP_TEST_MALFORMED");
        }
    }
}
