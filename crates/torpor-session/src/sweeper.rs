//! Background passivation sweep.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::key::{StoreKey, StoreValue};
use crate::passivation::PassivationManager;

/// Periodically runs [`PassivationManager::sweep`].
pub struct Sweeper;

impl Sweeper {
    /// Spawn the sweep loop on the current runtime.
    ///
    /// The first sweep runs one `interval` after spawning. A sweep that
    /// overruns delays the next tick rather than bursting to catch up.
    pub fn spawn<K: StoreKey, V: StoreValue>(
        manager: PassivationManager<K, V>,
        interval: Duration,
    ) -> SweeperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(interval_ms = period.as_millis() as u64, "Sweeper started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        match manager.sweep().await {
                            Ok(report) => {
                                if report.passivated() > 0 {
                                    tracing::info!(
                                        idle = report.idle_passivated,
                                        size = report.size_passivated,
                                        "Passivated entries"
                                    );
                                }
                                for (key, error) in &report.failures {
                                    tracing::warn!(key = %key, error = %error, "Sweep left entry active");
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "Sweep failed"),
                        }
                    }
                }
            }
            tracing::debug!("Sweeper stopped");
        });

        SweeperHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Handle to a running sweep loop.
///
/// Dropping the handle cancels the loop without waiting for it.
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Sweeper task ended abnormally");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry_store::MemoryEntryStore;
    use crate::locator::Locator;
    use crate::passivation::EntryState;
    use crate::persistent_store::MemoryPersistentStore;
    use std::sync::Arc;
    use torpor_config::{PASSIVATING_STORE, SettingsHandle, StoreSettings};

    fn manager(idle: Duration) -> PassivationManager<String, u32> {
        let settings = SettingsHandle::new(
            StoreSettings::new()
                .with_max_size(0)
                .with_idle_timeout(idle)
                .with_default_store(PASSIVATING_STORE),
        )
        .unwrap();
        PassivationManager::<String, u32>::new(
            Arc::new(MemoryEntryStore::<String, u32>::new()),
            Arc::new(MemoryPersistentStore::<String>::new()),
            settings,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_passivates_idle_entries() {
        let manager = manager(Duration::from_secs(1));
        manager.create_value(&"a".to_string()).await.unwrap();

        let handle = Sweeper::spawn(manager.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(
            manager.state(&"a".to_string()).await.unwrap(),
            EntryState::Passivated
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_shutdown() {
        let manager = manager(Duration::ZERO);
        let handle = Sweeper::spawn(manager, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_survive_until_idle() {
        let manager = manager(Duration::from_secs(10));
        manager.create_value(&"a".to_string()).await.unwrap();

        let handle = Sweeper::spawn(manager.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            manager.state(&"a".to_string()).await.unwrap(),
            EntryState::Active
        );
        handle.shutdown().await;
    }
}
