//! Integration tests for `SessionManager` (§4.7) beyond what the inline
//! `#[cfg(test)]` module in `src/manager.rs` covers: concurrent creates
//! racing the session cap, and `terminate_all`'s snapshot-then-act fan-out
//! across several live sessions at once.

use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;

use gdb_mcp_bridge::error::GdbError;
use gdb_mcp_bridge::manager::SessionManager;
use gdb_mcp_bridge::session::SessionState;

fn stub_gdb_script() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    write!(file, "printf '(gdb) \\n'\nread line\n").unwrap();
    let path = file.path();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
    file
}

#[tokio::test]
async fn terminate_all_tears_down_every_live_session() {
    let manager = SessionManager::new();
    let mut scripts = Vec::new();
    let mut ids = Vec::new();

    for _ in 0..4 {
        let script = stub_gdb_script();
        let gdb_path = script.path().to_string_lossy().to_string();
        let summary = manager
            .create(Some(gdb_path), None, Some(2000))
            .await
            .unwrap();
        manager.start(&summary.id).await.unwrap();
        ids.push(summary.id);
        scripts.push(script);
    }
    assert_eq!(manager.count().await, 4);

    manager.terminate_all().await;

    assert_eq!(manager.count().await, 0);
    for id in &ids {
        assert!(manager.get(id).await.is_none());
    }
}

#[tokio::test]
async fn list_reflects_concurrently_created_sessions() {
    let manager = SessionManager::new();
    let mut scripts = Vec::new();

    for _ in 0..3 {
        let script = stub_gdb_script();
        let gdb_path = script.path().to_string_lossy().to_string();
        manager
            .create(Some(gdb_path), None, Some(2000))
            .await
            .unwrap();
        scripts.push(script);
    }

    let summaries = manager.list().await;
    assert_eq!(summaries.len(), 3);
    assert!(summaries
        .iter()
        .all(|s| s.state == SessionState::Disconnected));

    manager.terminate_all().await;
}

#[tokio::test]
async fn create_after_hitting_the_limit_is_rejected_until_one_is_removed() {
    let manager = SessionManager::new();
    unsafe {
        std::env::set_var("GDB_MCP_MAX_SESSIONS", "2");
    }

    let script_a = stub_gdb_script();
    let script_b = stub_gdb_script();
    let a = manager
        .create(
            Some(script_a.path().to_string_lossy().to_string()),
            None,
            Some(2000),
        )
        .await
        .unwrap();
    let _b = manager
        .create(
            Some(script_b.path().to_string_lossy().to_string()),
            None,
            Some(2000),
        )
        .await
        .unwrap();

    let script_c = stub_gdb_script();
    let err = manager
        .create(
            Some(script_c.path().to_string_lossy().to_string()),
            None,
            Some(2000),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GdbError::SessionLimit { current: 2, max: 2 }
    ));

    // Freeing a slot lets a subsequent create succeed again.
    assert!(manager.remove(&a.id).await.unwrap());
    let c = manager
        .create(
            Some(script_c.path().to_string_lossy().to_string()),
            None,
            Some(2000),
        )
        .await
        .unwrap();
    assert_ne!(c.id, a.id);

    unsafe {
        std::env::remove_var("GDB_MCP_MAX_SESSIONS");
    }
    manager.terminate_all().await;
}

#[tokio::test]
async fn get_session_returns_live_handle_distinct_from_summary() {
    let manager = SessionManager::new();
    let script = stub_gdb_script();
    let gdb_path = script.path().to_string_lossy().to_string();

    let summary = manager
        .create(Some(gdb_path), None, Some(2000))
        .await
        .unwrap();
    manager.start(&summary.id).await.unwrap();

    let session = manager.get_session(&summary.id).await.unwrap();
    assert!(session.is_ready());
    assert_eq!(session.state(), SessionState::Ready);

    manager.terminate_all().await;
    assert_eq!(session.state(), SessionState::Terminated);
}
