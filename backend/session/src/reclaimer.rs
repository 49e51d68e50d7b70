//! Background sweep that reclaims idle sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::lifecycle::SessionManager;

/// How often the sweep runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically scans the registry and tears down sessions idle past the
/// manager's budget.
pub struct Reclaimer {
    manager: Arc<SessionManager>,
    interval: Duration,
}

impl Reclaimer {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager, interval: DEFAULT_SWEEP_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start sweeping on a background task. Abort the handle to stop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "session reclaimer started");
            loop {
                ticker.tick().await;
                let reclaimed = self.manager.reclaim_expired().await;
                if reclaimed > 0 {
                    info!(reclaimed, "sweep reclaimed idle sessions");
                } else {
                    debug!("sweep found nothing to reclaim");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::{RecordingProvider, StaticVerifier};
    use dockhand_core::OrchestratorError;

    #[tokio::test]
    async fn test_sweep_reclaims_in_background() {
        let provider = Arc::new(RecordingProvider::default());
        let manager = Arc::new(
            SessionManager::new(Arc::new(StaticVerifier), provider.clone())
                .with_idle_budget(Duration::from_millis(10)),
        );
        let record = manager.create("user-1", "step-1").await.unwrap();

        let sweeper = Reclaimer::new(manager.clone())
            .with_interval(Duration::from_millis(20))
            .spawn();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(manager.active_sessions().await, 0);
        assert_eq!(provider.stops(), 1);
        assert_eq!(provider.removes(), 1);
        assert!(matches!(
            manager.authorize(&record.id, "user-1").await.unwrap_err(),
            OrchestratorError::NotFound
        ));
        sweeper.abort();
    }
}
