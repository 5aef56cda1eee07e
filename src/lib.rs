mod utils;

pub mod config;
pub mod db;
pub mod detector;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod settings;
pub mod storage;
pub mod subscriptions;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use config::SyncConfig;
use db::Database;
use notifications::{LogPushSink, NotificationDispatcher, NotificationStore, PushSink};
use settings::SettingsStore;
use storage::{KeyValueStore, MemoryStore};
use sync::{HttpReadingSource, ReadingSource, SyncEngine};

/// Everything the host application talks to, wired together once.
pub struct SyncCore {
    pub engine: SyncEngine,
    pub notifications: Arc<NotificationStore>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub settings: Arc<SettingsStore>,
}

impl SyncCore {
    /// Builds the core against the configured HTTP endpoint, logging pushes.
    pub async fn init(config: SyncConfig) -> Result<Self> {
        let source = HttpReadingSource::new(config.endpoint_url.clone(), config.api_token.clone())?;
        Self::init_with(config, Arc::new(source), Arc::new(LogPushSink)).await
    }

    pub async fn init_with(
        config: SyncConfig,
        source: Arc<dyn ReadingSource>,
        push: Arc<dyn PushSink>,
    ) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = match &config.db_path {
            Some(path) => Arc::new(Database::new(path.clone())?),
            None => {
                info!("No database path configured; notifications are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        let settings = Arc::new(
            SettingsStore::load(Arc::clone(&kv))
                .await
                .context("failed to load notification settings")?,
        );

        let notifications = Arc::new(NotificationStore::new(Arc::clone(&kv), config.store_config()));
        // Start with an empty log rather than refuse to run.
        if let Err(err) = notifications.load().await {
            warn!("Could not restore notifications: {err:?}");
        }

        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&notifications),
            Arc::clone(&settings),
            push,
        ));
        let engine = SyncEngine::new(config, source, Some(Arc::clone(&dispatcher)));

        Ok(Self {
            engine,
            notifications,
            dispatcher,
            settings,
        })
    }

    /// Stops polling, waits for the loop to exit and for pending pushes to
    /// settle. The database thread closes once the last handle is dropped.
    pub async fn shutdown(self) -> Result<()> {
        self.engine.shutdown().await?;
        self.dispatcher.flush_pushes().await;
        info!("Sync core shut down");
        Ok(())
    }
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("parksync starting up...");

    let config = SyncConfig::from_env()?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;

    runtime.block_on(async move {
        let core = SyncCore::init(config).await?;

        let snapshots = core.engine.on_snapshot_update(|snapshot| {
            info!(
                "{}/{} spots free ({})",
                snapshot.available_spots, snapshot.total_spots, snapshot.last_updated
            );
        });
        let notifications = core.notifications.subscribe(|list| {
            let unread = list.iter().filter(|n| !n.is_read).count();
            info!("{} notifications, {} unread", list.len(), unread);
        });

        if !core.engine.is_running() {
            core.engine.start()?;
        }

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("Shutdown requested");

        snapshots.unsubscribe();
        notifications.unsubscribe();
        core.shutdown().await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::reading;
    use crate::models::{FeedbackReply, NotificationType, RawReading};
    use crate::sync::{FetchError, FetchOutcome};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves whatever readings the test last set.
    struct FixtureSource {
        readings: Mutex<Vec<RawReading>>,
    }

    #[async_trait]
    impl ReadingSource for FixtureSource {
        async fn fetch(&self) -> Result<Vec<RawReading>, FetchError> {
            Ok(self.readings.lock().unwrap().clone())
        }
    }

    fn slots(free: &[&str], taken: &[&str]) -> Vec<RawReading> {
        let free = free.iter().map(|slot| (*slot, false));
        let taken = taken.iter().map(|slot| (*slot, true));
        free.chain(taken)
            .enumerate()
            .map(|(i, (slot, occupied))| reading(i as i64 + 1, slot, occupied, "3rd floor"))
            .collect()
    }

    fn config_at(path: std::path::PathBuf) -> SyncConfig {
        SyncConfig {
            db_path: Some(path),
            auto_start_on_subscribe: false,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn notifications_and_settings_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parksync.sqlite3");
        let source = Arc::new(FixtureSource {
            readings: Mutex::new(slots(&[], &["C1", "C2"])),
        });

        {
            let core = SyncCore::init_with(config_at(path.clone()), source.clone(), Arc::new(LogPushSink))
                .await
                .unwrap();
            core.settings
                .set_enabled(NotificationType::FloorUpdate, true)
                .await
                .unwrap();

            assert_eq!(core.engine.force_update().await, FetchOutcome::Updated);
            *source.readings.lock().unwrap() = slots(&["C2"], &["C1"]);
            tokio::time::sleep(Duration::from_millis(2_050)).await;
            assert_eq!(core.engine.force_update().await, FetchOutcome::Updated);

            core.dispatcher
                .notify_feedback_reply(FeedbackReply::new(
                    "fb-7",
                    "Sensor C1 always shows occupied",
                    "Recalibrated, thanks",
                    None,
                    Utc::now(),
                ))
                .await;
            assert_eq!(core.notifications.unread_count(), 3);
            core.shutdown().await.unwrap();
        }

        let core = SyncCore::init_with(config_at(path), source, Arc::new(LogPushSink))
            .await
            .unwrap();
        assert!(core.settings.notifications().floor_update);
        let restored: Vec<NotificationType> = core
            .notifications
            .list()
            .iter()
            .map(|n| n.notification_type())
            .collect();
        assert_eq!(restored.len(), 3);
        assert!(restored.contains(&NotificationType::SpotAvailable));
        assert!(restored.contains(&NotificationType::FloorUpdate));
        assert!(restored.contains(&NotificationType::FeedbackReply));
    }
}
