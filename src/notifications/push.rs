use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde::Serialize;

use crate::models::{NewNotification, NotificationType};

/// What the push channel receives: the same typed event the store sees,
/// flattened to title, message and a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
}

impl From<&NewNotification> for PushMessage {
    fn from(notification: &NewNotification) -> Self {
        Self {
            kind: notification.notification_type(),
            title: notification.title.clone(),
            message: notification.message.clone(),
            payload: serde_json::to_value(&notification.kind).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Downstream delivery channel (OS notifications, remote push, ...).
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn deliver(&self, message: PushMessage) -> Result<()>;
}

/// Default sink: writes each message to the log.
pub struct LogPushSink;

#[async_trait]
impl PushSink for LogPushSink {
    async fn deliver(&self, message: PushMessage) -> Result<()> {
        info!(
            "push [{}] {}: {}",
            message.kind.as_str(),
            message.title,
            message.message
        );
        Ok(())
    }
}
