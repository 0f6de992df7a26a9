use crate::ports;
use crate::store::UsageStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_SESSION_MAX_AGE: time::Duration = time::Duration::hours(24);

pub struct ReaperHandle {
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    #[cfg(test)]
    pub(crate) async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.handle.await
    }
}

/// Periodically evicts user sessions older than `max_age`.
#[derive(Clone)]
pub struct Reaper<C> {
    clock: C,
    store: Arc<UsageStore>,
    interval: Duration,
    max_age: time::Duration,
}

impl<C> Reaper<C>
where
    C: ports::Clock,
{
    pub fn new(
        clock: C,
        store: Arc<UsageStore>,
        interval: Duration,
        max_age: time::Duration,
    ) -> Self {
        Self {
            clock,
            store,
            interval,
            max_age,
        }
    }

    pub fn run_once(&self) -> usize {
        let now = self.clock.now();
        let evicted = self.store.sweep_sessions(now, self.max_age);
        if evicted > 0 {
            tracing::info!(evicted, "evicted stale sessions");
        } else {
            tracing::debug!("no stale sessions");
        }
        evicted
    }

    pub fn spawn(self) -> ReaperHandle {
        tracing::debug!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age.whole_seconds(),
            "starting session reaper"
        );
        let handle = tokio::spawn(async move {
            loop {
                self.clock.sleep(self.interval).await;
                self.run_once();
            }
        });
        ReaperHandle { handle }
    }
}
