use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle for a learner session. Generated server-side, never derived
/// from caller input.
pub type SessionId = Uuid;

/// The authenticated principal behind a bearer token, as reported by the
/// identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: i64,
    pub email: String,
}

/// Everything the orchestrator tracks about one live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub owner: UserIdentity,
    /// Tutorial step the session was opened for. Informational only.
    pub step_id: String,
    /// Provider-side handle for the backing sandbox.
    pub sandbox_id: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on meaningful activity; drives idle reclamation.
    pub last_active_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: SessionId, owner: UserIdentity, step_id: String, sandbox_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner,
            step_id,
            sandbox_id,
            created_at: now,
            last_active_at: now,
        }
    }

    /// Seconds since the last recorded activity, measured against `now`.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_active_at).num_seconds()
    }
}

/// Captured result of running one command inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
