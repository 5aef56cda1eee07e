//! Bounded, persisted notification log.
//!
//! Mutations land in memory first and are then written to the key-value
//! store as one JSON blob. A failed write is logged and the in-memory log
//! stays authoritative for the rest of the process lifetime.
//!
//! Deduplication is deliberately coarse: a notification is dropped when one of
//! the same type *and title* was created inside the dedup window. Two distinct
//! events that render the same title (every "Floor Update", for instance)
//! collapse into one inside that window. This is known and kept as is.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use uuid::Uuid;

use crate::models::{NewNotification, Notification};
use crate::storage::{KeyValueStore, NOTIFICATIONS_KEY};
use crate::subscriptions::{SubscriberList, Subscription};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub max_notifications: usize,
    pub dedup_window: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_notifications: 50,
            dedup_window: Duration::from_secs(5 * 60),
        }
    }
}

pub struct NotificationStore {
    kv: Arc<dyn KeyValueStore>,
    config: StoreConfig,
    log: Mutex<Vec<Notification>>,
    subscribers: SubscriberList<Vec<Notification>>,
    // Serializes writes so the last one always carries the latest log.
    persist_lock: tokio::sync::Mutex<()>,
}

impl NotificationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: StoreConfig) -> Self {
        let subscribers = SubscriberList::new("notifications");
        subscribers.publish(Vec::new());
        Self {
            kv,
            config,
            log: Mutex::new(Vec::new()),
            subscribers,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Restores the persisted log. An unreadable blob is discarded.
    pub async fn load(&self) -> Result<usize> {
        let raw = self
            .kv
            .get(NOTIFICATIONS_KEY)
            .await
            .context("failed to read persisted notifications")?;

        let mut restored: Vec<Notification> = match raw {
            Some(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Discarding unreadable notification log: {err}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        restored.retain(|n| n.notification_type().is_stored());
        sort_newest_first(&mut restored);
        restored.truncate(self.config.max_notifications);

        let count = restored.len();
        *self.lock_log() = restored;
        self.publish();
        debug!("Restored {count} notifications");
        Ok(count)
    }

    /// Stores a notification unless its type is push-only or it duplicates a
    /// recent one. Returns the stored entry.
    pub async fn add(&self, notification: NewNotification) -> Option<Notification> {
        self.add_at(notification, Utc::now()).await
    }

    pub(crate) async fn add_at(
        &self,
        notification: NewNotification,
        now: DateTime<Utc>,
    ) -> Option<Notification> {
        let kind = notification.notification_type();
        if !kind.is_stored() {
            debug!("Dropping {} notification '{}'", kind.as_str(), notification.title);
            return None;
        }

        let window = chrono::Duration::from_std(self.config.dedup_window)
            .unwrap_or_else(|_| chrono::Duration::zero());

        let stored = {
            let mut log = self.lock_log();
            let duplicate = log.iter().any(|existing| {
                existing.notification_type() == kind
                    && existing.title == notification.title
                    && now.signed_duration_since(existing.timestamp) < window
            });
            if duplicate {
                debug!(
                    "Suppressing duplicate {} notification '{}'",
                    kind.as_str(),
                    notification.title
                );
                return None;
            }

            let stored = Notification {
                id: Uuid::new_v4().to_string(),
                title: notification.title,
                message: notification.message,
                timestamp: now,
                is_read: false,
                priority: notification.priority,
                kind: notification.kind,
            };
            log.push(stored.clone());

            if log.len() > self.config.max_notifications {
                sort_newest_first(&mut log);
                log.truncate(self.config.max_notifications);
            }
            stored
        };

        self.publish();
        self.persist().await;
        Some(stored)
    }

    pub async fn mark_read(&self, id: &str) -> bool {
        let changed = {
            let mut log = self.lock_log();
            match log.iter_mut().find(|n| n.id == id) {
                Some(n) if !n.is_read => {
                    n.is_read = true;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.publish();
            self.persist().await;
        }
        changed
    }

    pub async fn mark_all_read(&self) -> usize {
        let changed = {
            let mut log = self.lock_log();
            let mut changed = 0;
            for n in log.iter_mut().filter(|n| !n.is_read) {
                n.is_read = true;
                changed += 1;
            }
            changed
        };
        if changed > 0 {
            self.publish();
            self.persist().await;
        }
        changed
    }

    pub async fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut log = self.lock_log();
            let before = log.len();
            log.retain(|n| n.id != id);
            log.len() != before
        };
        if removed {
            self.publish();
            self.persist().await;
        }
        removed
    }

    pub async fn clear_all(&self) {
        self.lock_log().clear();
        self.publish();
        self.persist().await;
    }

    /// Stored notifications, newest first.
    pub fn list(&self) -> Vec<Notification> {
        let mut visible: Vec<Notification> = self
            .lock_log()
            .iter()
            .filter(|n| n.notification_type().is_stored())
            .cloned()
            .collect();
        sort_newest_first(&mut visible);
        visible
    }

    pub fn unread_count(&self) -> usize {
        self.lock_log()
            .iter()
            .filter(|n| n.notification_type().is_stored() && !n.is_read)
            .count()
    }

    /// Delivers the current list immediately and again after every mutation.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<Notification>) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    fn publish(&self) {
        self.subscribers.publish(self.list());
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.list();

        let result = if snapshot.is_empty() {
            self.kv.remove(NOTIFICATIONS_KEY).await
        } else {
            match serde_json::to_string(&snapshot) {
                Ok(serialized) => self.kv.set(NOTIFICATIONS_KEY, serialized).await,
                Err(err) => Err(err.into()),
            }
        };

        if let Err(err) = result {
            error!("Failed to persist notifications: {err:?}");
        }
    }

    fn lock_log(&self) -> MutexGuard<'_, Vec<Notification>> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn sort_newest_first(notifications: &mut [Notification]) {
    notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}
