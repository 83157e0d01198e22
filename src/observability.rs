//! Publish-only observation events (§2, §6, §9).
//!
//! Each session owns a `tokio::sync::broadcast` sender; observers (the MCP
//! server, tests, future dashboards) hold a cloned receiver rather than any
//! handle into the supervisor itself. Delivery is lossy by design -- a slow
//! or absent observer never blocks the session's own drain loop.

use tokio::sync::broadcast;

use crate::mi::StopReason;
use crate::session::SessionState;

/// Default channel capacity. Generous enough that a console-output-heavy
/// command (a test suite printing hundreds of lines) doesn't lag an
/// attentive observer under normal scheduling, while still bounding memory
/// if nobody is listening.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum Observation {
    StateChanged {
        session_id: String,
        old: SessionState,
        new: SessionState,
    },
    Stopped {
        session_id: String,
        reason: StopReason,
        details: String,
    },
    ConsoleOutput {
        session_id: String,
        text: String,
    },
    Ready {
        session_id: String,
    },
    Terminated {
        session_id: String,
        exit_code: i32,
    },
    SessionAdded {
        session_id: String,
    },
    SessionRemoved {
        session_id: String,
    },
}

/// Create a broadcast channel for a single session's observations.
pub fn channel() -> (broadcast::Sender<Observation>, broadcast::Receiver<Observation>) {
    broadcast::channel(CHANNEL_CAPACITY)
}

/// Publish an observation, logging it via `tracing`, and tolerating the case
/// where no receiver is currently subscribed (send returns an error, which we
/// deliberately ignore -- lossy delivery is the documented contract).
pub fn publish(sender: &broadcast::Sender<Observation>, observation: Observation) {
    match &observation {
        Observation::StateChanged {
            session_id,
            old,
            new,
        } => {
            tracing::info!(session = %session_id, ?old, ?new, "session state changed");
        }
        Observation::Stopped {
            session_id,
            reason,
            details,
        } => {
            tracing::info!(session = %session_id, ?reason, %details, "session stopped");
        }
        Observation::ConsoleOutput { session_id, text } => {
            tracing::debug!(session = %session_id, %text, "console output");
        }
        Observation::Ready { session_id } => {
            tracing::info!(session = %session_id, "session ready");
        }
        Observation::Terminated {
            session_id,
            exit_code,
        } => {
            tracing::info!(session = %session_id, exit_code, "session terminated");
        }
        Observation::SessionAdded { session_id } => {
            tracing::info!(session = %session_id, "session added");
        }
        Observation::SessionRemoved { session_id } => {
            tracing::info!(session = %session_id, "session removed");
        }
    }
    let _ = sender.send(observation);
}
