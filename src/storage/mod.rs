//! Durable key-value blob storage used for the notification log and settings.

mod memory;

pub use memory::MemoryStore;

use anyhow::Result;
use async_trait::async_trait;

/// Key under which the notification log is persisted.
pub const NOTIFICATIONS_KEY: &str = "parksync.notifications";
/// Key under which the notification category settings are persisted.
pub const SETTINGS_KEY: &str = "parksync.notification_settings";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}
