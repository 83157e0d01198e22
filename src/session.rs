//! The per-session supervisor: owns one GDB subprocess, its pipes, its
//! state, and its in-flight command (§3, §4.3-§4.6).
//!
//! Generalized from the teacher's `ShellSession` (a PTY-backed bash process
//! delimited by UUID markers) to a GDB subprocess delimited by MI's own
//! `(gdb)` prompt and result/async records -- no markers are needed because
//! MI already tells us where a command's output ends.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config;
use crate::error::{GdbError, GdbResult};
use crate::mi::{self, MiRecord, ResultClass, StopReason};
use crate::observability::{self, Observation};

/// Session lifecycle state (§3, §4.3). `Ready` and `Stopped` are the only
/// states that accept new commands; `Terminated` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Starting,
    Ready,
    Running,
    Stopped,
    Terminated,
    Error,
}

/// The stdin/stdout side of the subprocess, present only while a session has
/// been started and not yet terminated. Held behind the session's single
/// `io` mutex for the duration of one command, which doubles as the
/// "one command in flight" serialization point (§4.4 concurrency note).
///
/// The `Child` handle itself is deliberately kept out of this struct (see
/// `Session::child`) so that `terminate()` can force-kill the subprocess
/// even while a command is mid-flight and holding this lock (§4.6: "must be
/// callable... at any time, including during a pending command").
struct SessionIo {
    stdin: ChildStdin,
    /// stdout and stderr, merged at the application level into one ordered
    /// line stream -- the same approach the teacher's `process::run` uses
    /// for its two reader tasks, generalized from "append to a shared
    /// buffer" to "forward into one channel the drain loop consumes".
    lines_rx: mpsc::UnboundedReceiver<String>,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

/// Summary information about a session, suitable for `list()`/`get()` and
/// for serializing straight into an MCP tool result.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    pub gdb_path: String,
    pub working_directory: Option<String>,
    pub program_path: Option<String>,
    pub uptime_seconds: f64,
}

/// Owns one GDB subprocess end to end: spawning it, driving its MI prompt
/// protocol, serializing command execution, and tearing it down.
pub struct Session {
    id: String,
    gdb_path: String,
    working_directory: Option<String>,
    timeout_ms: u64,
    created_at: Instant,
    state: StdMutex<SessionState>,
    program_path: StdMutex<Option<String>>,
    io: Mutex<Option<SessionIo>>,
    /// The subprocess handle, guarded independently of `io` so
    /// [`Self::terminate`] can force-kill it without waiting behind a
    /// command that currently holds the `io` lock.
    child: Mutex<Option<Child>>,
    /// Set the instant `terminate()` begins, so a concurrently-running
    /// `drain()` that observes EOF as a result of the kill can report the
    /// session as deliberately `Terminated` rather than `Error` (§4.6/§9).
    terminating: AtomicBool,
    obs_tx: broadcast::Sender<Observation>,
}

impl Session {
    pub fn new(
        id: String,
        gdb_path: String,
        working_directory: Option<String>,
        timeout_ms: u64,
    ) -> Self {
        let (obs_tx, _rx) = observability::channel();
        Session {
            id,
            gdb_path,
            working_directory,
            timeout_ms,
            created_at: Instant::now(),
            state: StdMutex::new(SessionState::Disconnected),
            program_path: StdMutex::new(None),
            io: Mutex::new(None),
            child: Mutex::new(None),
            terminating: AtomicBool::new(false),
            obs_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// `Ready` and `Stopped` accept new commands; every other state does not.
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), SessionState::Ready | SessionState::Stopped)
    }

    pub fn set_program_path(&self, path: Option<String>) {
        *self.program_path.lock().unwrap() = path;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Observation> {
        self.obs_tx.subscribe()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            state: self.state(),
            gdb_path: self.gdb_path.clone(),
            working_directory: self.working_directory.clone(),
            program_path: self.program_path.lock().unwrap().clone(),
            uptime_seconds: self.created_at.elapsed().as_secs_f64(),
        }
    }

    /// Monotonic, non-blocking transition. A no-op once a terminal state
    /// (`Terminated`/`Error`) is reached (invariant, §3) and a no-op if
    /// `new` equals the current state (no spurious observation).
    fn transition_state(&self, new: SessionState) {
        let old = {
            let mut guard = self.state.lock().unwrap();
            let old = *guard;
            if matches!(old, SessionState::Terminated | SessionState::Error) || old == new {
                return;
            }
            *guard = new;
            old
        };
        observability::publish(
            &self.obs_tx,
            Observation::StateChanged {
                session_id: self.id.clone(),
                old,
                new,
            },
        );
    }

    /// Spawn the GDB subprocess per §4.5: exactly two arguments (the binary
    /// path and `--interpreter=mi`), stdin/stdout/stderr piped.
    fn spawn_io(&self) -> GdbResult<(Child, SessionIo)> {
        let mut cmd = tokio::process::Command::new(&self.gdb_path);
        cmd.arg("--interpreter=mi");
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| GdbError::SpawnFailed(e.to_string()))?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (tx, rx) = mpsc::unbounded_channel::<String>();

        let tx_stdout = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx_stdout.send(line).is_err() {
                    break;
                }
            }
        });

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok((
            child,
            SessionIo {
                stdin,
                lines_rx: rx,
                stdout_task,
                stderr_task,
            },
        ))
    }

    /// Startup protocol (§4.5): spawn, transition to `Starting`, read until
    /// the first `(gdb)` prompt (which alone completes startup -- GDB's own
    /// init chatter is not sufficient), transition to `Ready`.
    pub async fn start(&self) -> GdbResult<()> {
        {
            let state = *self.state.lock().unwrap();
            if state != SessionState::Disconnected {
                return Err(GdbError::AlreadyRunning(self.id.clone()));
            }
        }
        self.transition_state(SessionState::Starting);

        let (child, mut io) = match self.spawn_io() {
            Ok(pair) => pair,
            Err(e) => {
                self.transition_state(SessionState::Error);
                return Err(e);
            }
        };

        let timeout_dur = Duration::from_millis(self.timeout_ms);
        let wait_for_prompt = async {
            loop {
                match io.lines_rx.recv().await {
                    Some(line) => {
                        if let Ok(MiRecord::Prompt) = mi::parse_line(&line) {
                            return Ok(());
                        }
                        // Startup banner / version text before the first
                        // prompt -- expected, keep draining.
                    }
                    None => {
                        return Err(GdbError::SpawnFailed(
                            "gdb exited before producing a prompt".to_string(),
                        ));
                    }
                }
            }
        };

        match tokio::time::timeout(timeout_dur, wait_for_prompt).await {
            Ok(Ok(())) => {
                *self.child.lock().await = Some(child);
                *self.io.lock().await = Some(io);
                self.transition_state(SessionState::Ready);
                observability::publish(
                    &self.obs_tx,
                    Observation::Ready {
                        session_id: self.id.clone(),
                    },
                );
                Ok(())
            }
            Ok(Err(e)) => {
                self.transition_state(SessionState::Error);
                Err(e)
            }
            Err(_) => {
                self.transition_state(SessionState::Error);
                Err(GdbError::Timeout(self.timeout_ms))
            }
        }
    }

    /// Execute a command and return the raw concatenated output (§4.4).
    pub async fn execute(&self, command: &str) -> GdbResult<String> {
        let (raw, _records) = self.execute_inner(command).await?;
        Ok(raw)
    }

    /// Execute a command and return the ordered list of parsed MI records
    /// observed while it was in flight, instead of raw text.
    pub async fn execute_mi(&self, command: &str) -> GdbResult<Vec<MiRecord>> {
        let (_raw, records) = self.execute_inner(command).await?;
        Ok(records)
    }

    async fn execute_inner(&self, command: &str) -> GdbResult<(String, Vec<MiRecord>)> {
        // Admission (§4.4 step 1).
        if !self.is_ready() {
            return Err(GdbError::SessionNotReady(self.id.clone()));
        }

        // Locking `io` for the whole command both gives us the subprocess
        // handles and serializes concurrent submissions in arrival order
        // (§4.4's queuing note, §5's ordering guarantee).
        let mut io_guard = self.io.lock().await;
        let io = io_guard
            .as_mut()
            .ok_or_else(|| GdbError::SessionNotReady(self.id.clone()))?;

        // The outer timer starts "the moment the command is submitted"
        // (§4.4 step 5), so it must bound the write, the post-command
        // settle sleep, and the drain loop together -- not just the drain.
        // Otherwise a long default settle delay (2000ms) would stall a
        // short session timeout before the timer ever gets a chance to
        // fire, breaking the S7 timeout-isolation scenario.
        let timeout_dur = Duration::from_millis(self.timeout_ms);
        let command_and_drain = async {
            // Write (§4.4 step 2).
            io.stdin
                .write_all(command.as_bytes())
                .await
                .map_err(GdbError::from)?;
            io.stdin.write_all(b"\n").await.map_err(GdbError::from)?;
            io.stdin.flush().await.map_err(GdbError::from)?;

            // Post-write settle (§4.4 step 3).
            tokio::time::sleep(Duration::from_millis(config::post_command_delay_ms())).await;

            // Drain loop (§4.4 step 4).
            self.drain(io).await
        };

        // `tokio::time::timeout` cancels `command_and_drain` -- and every
        // `.await` point inside it -- the instant it fires, so there is no
        // separate timer handle to track or leak.
        match tokio::time::timeout(timeout_dur, command_and_drain).await {
            Ok(result) => result,
            Err(_) => Err(GdbError::Timeout(self.timeout_ms)),
        }
    }

    async fn drain(&self, io: &mut SessionIo) -> GdbResult<(String, Vec<MiRecord>)> {
        let mut raw = String::new();
        let mut records = Vec::new();
        let mut saw_error = false;
        let mut error_msg = String::new();
        let mut saw_running = false;
        let mut saw_stopped = false;
        let mut exited = false;

        loop {
            let line = match io.lines_rx.recv().await {
                Some(line) => line,
                None => {
                    // Fatal I/O (§4.4 step 6, §4.6). If a `terminate()` call
                    // is the reason the subprocess (and thus this pipe)
                    // went away, the session ends in `Terminated`, not
                    // `Error` -- it died because we killed it, not because
                    // it misbehaved.
                    if self.terminating.load(Ordering::SeqCst) {
                        self.transition_state(SessionState::Terminated);
                    } else {
                        self.transition_state(SessionState::Error);
                    }
                    return Err(GdbError::CommandFailed {
                        msg: "gdb process exited unexpectedly".to_string(),
                    });
                }
            };

            raw.push_str(&line);
            raw.push('\n');

            let record = match mi::parse_line(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(session = %self.id, line = %line, error = %e, "skipping malformed MI line");
                    continue;
                }
            };

            let is_completion_line = matches!(
                record,
                MiRecord::Prompt
                    | MiRecord::Result {
                        class: ResultClass::Exit,
                        ..
                    }
            );

            match &record {
                MiRecord::ConsoleStream { text } => {
                    observability::publish(
                        &self.obs_tx,
                        Observation::ConsoleOutput {
                            session_id: self.id.clone(),
                            text: text.clone(),
                        },
                    );
                }
                MiRecord::Result {
                    class: ResultClass::Error,
                    ..
                } => {
                    saw_error = true;
                    error_msg = record
                        .error_message()
                        .unwrap_or_else(|| "unknown error".to_string());
                }
                MiRecord::Result {
                    class: ResultClass::Running,
                    ..
                } => {
                    saw_running = true;
                }
                MiRecord::ExecAsync { class, .. } if class == "running" => {
                    saw_running = true;
                }
                MiRecord::ExecAsync { class, body, .. } if class == "stopped" && !saw_stopped => {
                    // Only the first `*stopped` completes the command -- a
                    // second one isn't expected within a single command
                    // under standard MI and shouldn't re-trigger the
                    // transition.
                    saw_stopped = true;
                    let reason_str = body.get("reason").and_then(|v| v.as_str()).unwrap_or("");
                    let reason = StopReason::from_mi_reason(reason_str);
                    self.transition_state(SessionState::Stopped);
                    observability::publish(
                        &self.obs_tx,
                        Observation::Stopped {
                            session_id: self.id.clone(),
                            reason,
                            details: reason_str.to_string(),
                        },
                    );
                }
                _ => {}
            }

            let was_exit_result = matches!(
                record,
                MiRecord::Result {
                    class: ResultClass::Exit,
                    ..
                }
            );
            records.push(record);

            if is_completion_line {
                if saw_running && !saw_stopped {
                    // The program is still running; this prompt belongs to
                    // an earlier, still-in-flight execution event. Keep
                    // reading for the real boundary.
                    continue;
                }
                if was_exit_result {
                    exited = true;
                }
                break;
            }
        }

        if exited {
            self.transition_state(SessionState::Terminated);
            observability::publish(
                &self.obs_tx,
                Observation::Terminated {
                    session_id: self.id.clone(),
                    exit_code: -1,
                },
            );
        }

        if saw_error {
            return Err(GdbError::CommandFailed { msg: error_msg });
        }

        Ok((raw, records))
    }

    /// Termination protocol (§4.6): graceful `quit` with a grace period, or
    /// an immediate fast path if the session never became live.
    ///
    /// Callable at any time, including while a command is in flight and
    /// holding the `io` lock (§4.6): the graceful `quit` is only attempted
    /// if `io` can be locked immediately; otherwise this goes straight to
    /// force-killing the subprocess through the independent `child` lock,
    /// which the in-flight command's `drain()` then observes as EOF and
    /// fails with `CommandFailed` (see the `terminating` flag above).
    pub async fn terminate(&self) -> GdbResult<()> {
        self.terminating.store(true, Ordering::SeqCst);

        let state = self.state();
        if matches!(state, SessionState::Terminated | SessionState::Disconnected) {
            self.child.lock().await.take();
            if let Some(io) = self.io.lock().await.take() {
                io.stdout_task.abort();
                io.stderr_task.abort();
            }
            self.transition_state(SessionState::Terminated);
            return Ok(());
        }

        let sent_quit = match self.io.try_lock() {
            Ok(mut guard) => {
                if let Some(io) = guard.as_mut() {
                    let _ = io.stdin.write_all(b"quit\n").await;
                    let _ = io.stdin.flush().await;
                }
                true
            }
            Err(_) => false,
        };
        if sent_quit {
            tokio::time::sleep(Duration::from_millis(config::TERMINATION_GRACE_MS)).await;
        }

        let exit_code = {
            let mut child_guard = self.child.lock().await;
            let exit_code = if let Some(child) = child_guard.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => status.code().unwrap_or(-1),
                    Ok(None) => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        -1
                    }
                    Err(_) => -1,
                }
            } else {
                -1
            };
            child_guard.take();
            exit_code
        };

        // By now the killed subprocess has closed its pipes, so an
        // in-flight `drain()` blocked on `lines_rx.recv()` resolves to
        // `None` and releases this lock on its own; this wait is therefore
        // always short.
        if let Some(io) = self.io.lock().await.take() {
            io.stdout_task.abort();
            io.stderr_task.abort();
        }

        self.transition_state(SessionState::Terminated);
        observability::publish(
            &self.obs_tx,
            Observation::Terminated {
                session_id: self.id.clone(),
                exit_code,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;

    /// Write a tiny stub "gdb" (a shell script) that prints a canned MI
    /// transcript, so supervisor tests don't require a real `gdb` on the
    /// test machine.
    fn stub_gdb(script: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        write!(file, "{script}").unwrap();
        let path = file.path();
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).unwrap();
        file
    }

    #[tokio::test]
    async fn start_reaches_ready_on_first_prompt() {
        let script = stub_gdb("printf '(gdb) \\n'\nread line\n");
        let session = Session::new(
            "s1".to_string(),
            script.path().to_string_lossy().to_string(),
            None,
            2000,
        );
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        session.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn command_drain_discipline() {
        // step: ^running, *stopped, (gdb) -- must complete only after the
        // trailing prompt, with state Stopped, not on ^running alone.
        let script = stub_gdb(concat!(
            "printf '(gdb) \\n'\n",
            "read cmd\n",
            "printf '^running\\n'\n",
            "printf '*stopped,reason=\"end-stepping-range\"\\n'\n",
            "printf '(gdb) \\n'\n",
            "read cmd2\n",
        ));
        // Timeout must comfortably exceed the default post-command settle
        // delay (2000ms, §4.4 step 3) plus this stub's near-instant drain,
        // since the timeout now bounds settle+drain together.
        let session = Session::new(
            "s2".to_string(),
            script.path().to_string_lossy().to_string(),
            None,
            3000,
        );
        session.start().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let raw = session.execute("step").await.unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        // The stub's `printf '(gdb) \n'` emits the prompt with a trailing
        // space, and `execute` pushes each line verbatim into `raw` -- so
        // the third line is "(gdb) ", not "(gdb)".
        assert_eq!(
            lines,
            vec![
                "^running",
                "*stopped,reason=\"end-stepping-range\"",
                "(gdb) "
            ]
        );
        assert_eq!(session.state(), SessionState::Stopped);
        session.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn timeout_does_not_poison_later_commands() {
        let script = stub_gdb(concat!(
            "printf '(gdb) \\n'\n",
            "read cmd\n",
            "sleep 5\n",
            "printf '(gdb) \\n'\n",
        ));
        let session = Session::new(
            "s3".to_string(),
            script.path().to_string_lossy().to_string(),
            None,
            150,
        );
        session.start().await.unwrap();

        let start = Instant::now();
        let err = session.execute("next").await.unwrap_err();
        assert!(matches!(err, GdbError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_millis(1000));

        session.terminate().await.unwrap();
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn double_start_rejected() {
        let script = stub_gdb("printf '(gdb) \\n'\nread line\n");
        let session = Session::new(
            "s4".to_string(),
            script.path().to_string_lossy().to_string(),
            None,
            2000,
        );
        session.start().await.unwrap();
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, GdbError::AlreadyRunning(_)));
        session.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn execute_before_start_is_session_not_ready() {
        let session = Session::new("s5".to_string(), "gdb".to_string(), None, 2000);
        let err = session.execute("break main").await.unwrap_err();
        assert!(matches!(err, GdbError::SessionNotReady(_)));
    }
}
