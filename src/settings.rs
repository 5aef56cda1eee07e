use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::NotificationType;
use crate::storage::{KeyValueStore, SETTINGS_KEY};

/// Which notification categories the user wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub spot_available: bool,
    pub floor_update: bool,
    pub feedback_reply: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            spot_available: true,
            floor_update: false,
            feedback_reply: true,
        }
    }
}

impl NotificationSettings {
    /// General alerts are push-only and not user-configurable.
    pub fn allows(&self, kind: NotificationType) -> bool {
        match kind {
            NotificationType::SpotAvailable => self.spot_available,
            NotificationType::FloorUpdate => self.floor_update,
            NotificationType::FeedbackReply => self.feedback_reply,
            NotificationType::General => true,
        }
    }

    pub fn with(mut self, kind: NotificationType, enabled: bool) -> Self {
        match kind {
            NotificationType::SpotAvailable => self.spot_available = enabled,
            NotificationType::FloorUpdate => self.floor_update = enabled,
            NotificationType::FeedbackReply => self.feedback_reply = enabled,
            NotificationType::General => {}
        }
        self
    }
}

pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
    data: RwLock<NotificationSettings>,
}

impl SettingsStore {
    /// Reads persisted settings; a missing or unreadable blob falls back to
    /// the defaults.
    pub async fn load(kv: Arc<dyn KeyValueStore>) -> Result<Self> {
        let raw = kv
            .get(SETTINGS_KEY)
            .await
            .context("Failed to read notification settings")?;

        let data = match raw {
            Some(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Discarding unreadable notification settings: {err}");
                NotificationSettings::default()
            }),
            None => NotificationSettings::default(),
        };

        Ok(Self {
            kv,
            data: RwLock::new(data),
        })
    }

    pub fn notifications(&self) -> NotificationSettings {
        match self.data.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub async fn update_notifications(&self, settings: NotificationSettings) -> Result<()> {
        {
            let mut guard = match self.data.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = settings;
        }
        self.persist(&settings).await
    }

    pub async fn set_enabled(&self, kind: NotificationType, enabled: bool) -> Result<()> {
        let updated = self.notifications().with(kind, enabled);
        self.update_notifications(updated).await
    }

    pub async fn reset(&self) -> Result<()> {
        {
            let mut guard = match self.data.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = NotificationSettings::default();
        }
        self.kv
            .remove(SETTINGS_KEY)
            .await
            .context("Failed to clear notification settings")
    }

    async fn persist(&self, settings: &NotificationSettings) -> Result<()> {
        let serialized = serde_json::to_string(settings)?;
        self.kv
            .set(SETTINGS_KEY, serialized)
            .await
            .context("Failed to write notification settings")
    }
}
