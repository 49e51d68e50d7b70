//! Terminal relay: runs commands in a session's sandbox and fans the output
//! out to every observer.
//!
//! Each session gets a room with a broadcast channel. Commands for one
//! session run one at a time, so every observer sees output frames in
//! submission order.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, info};

use dockhand_core::{OrchestratorError, SandboxProvider, SessionId};
use dockhand_session::SessionManager;

/// Frames buffered per room before a slow observer starts missing output.
const ROOM_BUFFER: usize = 256;

/// One command's result as delivered to observers.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalFrame {
    pub output: String,
    pub exit_code: i64,
}

#[derive(Clone)]
struct Room {
    frames: broadcast::Sender<TerminalFrame>,
    exec_lock: Arc<Mutex<()>>,
}

impl Room {
    fn new() -> Self {
        let (frames, _) = broadcast::channel(ROOM_BUFFER);
        Self { frames, exec_lock: Arc::new(Mutex::new(())) }
    }
}

/// Shared fanout hub, one room per observed session.
#[derive(Clone)]
pub struct TerminalRelay {
    rooms: Arc<RwLock<HashMap<SessionId, Room>>>,
    manager: Arc<SessionManager>,
    provider: Arc<dyn SandboxProvider>,
}

impl TerminalRelay {
    pub fn new(manager: Arc<SessionManager>, provider: Arc<dyn SandboxProvider>) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            manager,
            provider,
        }
    }

    /// Subscribe to a session's terminal after proving ownership.
    pub async fn join(
        &self,
        id: &SessionId,
        token: &str,
    ) -> Result<broadcast::Receiver<TerminalFrame>, OrchestratorError> {
        self.manager.authorize(id, token).await?;
        let room = self.room(id).await;
        debug!(session = %id, observers = room.frames.receiver_count() + 1, "observer joined");
        Ok(room.frames.subscribe())
    }

    /// Run a command in the session's sandbox and broadcast the result.
    ///
    /// The room's exec lock is held for the whole run; a second submission
    /// for the same session waits its turn rather than interleaving output.
    pub async fn submit(
        &self,
        id: &SessionId,
        token: &str,
        command: &str,
    ) -> Result<(), OrchestratorError> {
        let record = self.manager.authorize(id, token).await?;
        let command = command.trim();
        if command.is_empty() {
            return Err(OrchestratorError::InvalidRequest("command is required".to_string()));
        }

        let room = self.room(id).await;
        let _guard = room.exec_lock.lock().await;

        let result = self
            .provider
            .exec(&record.sandbox_id, command)
            .await
            .map_err(|e| OrchestratorError::ExecutionFailed(e.to_string()))?;

        // The session may have been torn down mid-command; observers still
        // get the output either way.
        self.manager.touch(id).await;

        info!(session = %id, exit_code = result.exit_code, "command ran");
        let _ = room.frames.send(TerminalFrame {
            output: result.output,
            exit_code: result.exit_code,
        });
        Ok(())
    }

    /// Drop the session's room once its last observer is gone and no command
    /// is still running in it.
    pub async fn leave(&self, id: &SessionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(id) {
            // A submit in flight still holds a clone of the room. Pruning it
            // now would hand the next join a fresh exec lock and let two
            // commands for the session overlap.
            let busy = Arc::strong_count(&room.exec_lock) > 1;
            if room.frames.receiver_count() == 0 && !busy {
                rooms.remove(id);
                debug!(session = %id, "room closed");
            }
        }
    }

    async fn room(&self, id: &SessionId) -> Room {
        let mut rooms = self.rooms.write().await;
        rooms.entry(*id).or_insert_with(Room::new).clone()
    }

    #[cfg(test)]
    async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::async_trait;
    use dockhand_core::{ExecOutput, IdentityVerifier, UserIdentity};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct TokenVerifier;

    #[async_trait]
    impl IdentityVerifier for TokenVerifier {
        async fn verify(&self, token: &str) -> Result<UserIdentity, OrchestratorError> {
            let user_id: i64 = token
                .strip_prefix("user-")
                .and_then(|n| n.parse().ok())
                .ok_or(OrchestratorError::Unauthorized)?;
            Ok(UserIdentity { user_id, email: format!("user{user_id}@example.com") })
        }
    }

    #[derive(Default)]
    struct EchoProvider {
        execs: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_exec: AtomicBool,
    }

    #[async_trait]
    impl SandboxProvider for EchoProvider {
        async fn create(&self, session: &SessionId) -> anyhow::Result<String> {
            Ok(format!("sbx-{session}"))
        }

        async fn exec(&self, _sandbox: &str, command: &str) -> anyhow::Result<ExecOutput> {
            if self.fail_exec.load(Ordering::SeqCst) {
                anyhow::bail!("docker exec failed: daemon unreachable");
            }
            // Held open long enough for racing submits to pile up.
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.execs.fetch_add(1, Ordering::SeqCst);
            Ok(ExecOutput { output: format!("$ {command}\nok\n"), exit_code: 0 })
        }

        async fn stop(&self, _sandbox: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn remove(&self, _sandbox: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        provider: Arc<EchoProvider>,
        manager: Arc<SessionManager>,
        relay: TerminalRelay,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(EchoProvider::default());
        let manager = Arc::new(SessionManager::new(Arc::new(TokenVerifier), provider.clone()));
        let relay = TerminalRelay::new(manager.clone(), provider.clone());
        Fixture { provider, manager, relay }
    }

    #[tokio::test]
    async fn test_output_reaches_every_observer() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();

        let mut first = fx.relay.join(&record.id, "user-1").await.unwrap();
        let mut second = fx.relay.join(&record.id, "user-1").await.unwrap();

        fx.relay.submit(&record.id, "user-1", "ls").await.unwrap();

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a.output, "$ ls\nok\n");
        assert_eq!(a.exit_code, 0);
        assert_eq!(b.output, a.output);
    }

    #[tokio::test]
    async fn test_late_observer_sees_only_later_frames() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();

        let mut early = fx.relay.join(&record.id, "user-1").await.unwrap();
        fx.relay.submit(&record.id, "user-1", "pwd").await.unwrap();

        let mut late = fx.relay.join(&record.id, "user-1").await.unwrap();
        fx.relay.submit(&record.id, "user-1", "whoami").await.unwrap();

        assert_eq!(early.recv().await.unwrap().output, "$ pwd\nok\n");
        assert_eq!(early.recv().await.unwrap().output, "$ whoami\nok\n");
        assert_eq!(late.recv().await.unwrap().output, "$ whoami\nok\n");
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_submit_counts_as_activity() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();
        let before = fx.manager.authorize(&record.id, "user-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        fx.relay.submit(&record.id, "user-1", "echo hi").await.unwrap();

        let after = fx.manager.authorize(&record.id, "user-1").await.unwrap();
        assert!(after.last_active_at > before.last_active_at);
    }

    #[tokio::test]
    async fn test_concurrent_submits_run_one_at_a_time() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();

        let mut handles = Vec::new();
        for n in 0..4 {
            let relay = fx.relay.clone();
            let id = record.id;
            handles.push(tokio::spawn(async move {
                relay.submit(&id, "user-1", &format!("echo {n}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(fx.provider.execs.load(Ordering::SeqCst), 4);
        assert_eq!(fx.provider.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_requires_ownership() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();

        let foreign = fx.relay.join(&record.id, "user-2").await.unwrap_err();
        assert!(matches!(foreign, OrchestratorError::NotFound));

        let missing = fx.relay.join(&Uuid::new_v4(), "user-1").await.unwrap_err();
        assert!(matches!(missing, OrchestratorError::NotFound));

        let bad_token = fx.relay.join(&record.id, "garbage").await.unwrap_err();
        assert!(matches!(bad_token, OrchestratorError::Unauthorized));
    }

    #[tokio::test]
    async fn test_blank_command_rejected_without_exec() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();

        let err = fx.relay.submit(&record.id, "user-1", "   ").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert_eq!(fx.provider.execs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_after_terminate_is_not_found() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();
        fx.manager.terminate(&record.id, "user-1").await.unwrap();

        let err = fx.relay.submit(&record.id, "user-1", "ls").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound));
        assert_eq!(fx.provider.execs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exec_failure_broadcasts_nothing() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();
        let mut observer = fx.relay.join(&record.id, "user-1").await.unwrap();

        fx.provider.fail_exec.store(true, Ordering::SeqCst);
        let err = fx.relay.submit(&record.id, "user-1", "ls").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ExecutionFailed(_)));
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_leave_prunes_empty_rooms() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();

        let observer = fx.relay.join(&record.id, "user-1").await.unwrap();
        assert_eq!(fx.relay.room_count().await, 1);

        // Still observed; leave keeps the room.
        let second = fx.relay.join(&record.id, "user-1").await.unwrap();
        drop(second);
        fx.relay.leave(&record.id).await;
        assert_eq!(fx.relay.room_count().await, 1);

        drop(observer);
        fx.relay.leave(&record.id).await;
        assert_eq!(fx.relay.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_keeps_room_while_command_runs() {
        let fx = fixture();
        let record = fx.manager.create("user-1", "step-1").await.unwrap();
        let observer = fx.relay.join(&record.id, "user-1").await.unwrap();

        let running = {
            let relay = fx.relay.clone();
            let id = record.id;
            tokio::spawn(async move { relay.submit(&id, "user-1", "make check").await })
        };
        // Let the submit take the room before the observer bails.
        tokio::time::sleep(Duration::from_millis(3)).await;

        drop(observer);
        fx.relay.leave(&record.id).await;
        assert_eq!(fx.relay.room_count().await, 1);

        // Once the command finishes the room is prunable again.
        running.await.unwrap().unwrap();
        fx.relay.leave(&record.id).await;
        assert_eq!(fx.relay.room_count().await, 0);
    }
}
