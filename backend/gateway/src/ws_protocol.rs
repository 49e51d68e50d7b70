//! Wire protocol for the terminal relay.
//!
//! Tagged JSON frames. `Join`, `Input`, `Leave`, and `Ping` flow from the
//! client; the rest flow back.

use serde::{Deserialize, Serialize};

use dockhand_core::SessionId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Start observing a session's terminal.
    Join { session_id: SessionId, token: String },
    /// Join acknowledged.
    Joined { session_id: SessionId },
    /// Run a command in the session's sandbox.
    Input { session_id: SessionId, command: String },
    /// One command's captured output, fanned out to every observer.
    Output {
        session_id: SessionId,
        output: String,
        exit_code: i64,
    },
    /// Stop observing.
    Leave { session_id: SessionId },
    /// A request failed; `session_id` is set when the failure is specific
    /// to one session.
    Error {
        session_id: Option<SessionId>,
        message: String,
    },
    Ping,
    Pong,
}
