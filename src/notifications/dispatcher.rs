//! Turns detected changes into user notifications.
//!
//! Every event goes through the same path: settings gate, then the store
//! (which may drop duplicates), then the push sink. General alerts skip the
//! store and are always pushed. Pushes run on their own tasks, so a slow
//! sink never holds up the caller.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use tokio_util::task::TaskTracker;

use crate::detector::SnapshotDiff;
use crate::models::{FeedbackReply, NewNotification, Notification, NotificationType, Snapshot};
use crate::notifications::builder;
use crate::notifications::push::{PushMessage, PushSink};
use crate::notifications::store::NotificationStore;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Stored(Notification),
    PushedOnly,
    Disabled,
    Suppressed,
}

pub struct NotificationDispatcher {
    store: Arc<NotificationStore>,
    settings: Arc<SettingsStore>,
    push: Arc<dyn PushSink>,
    pushes: TaskTracker,
}

/// Upper bound on a single push delivery.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

impl NotificationDispatcher {
    pub fn new(
        store: Arc<NotificationStore>,
        settings: Arc<SettingsStore>,
        push: Arc<dyn PushSink>,
    ) -> Self {
        Self {
            store,
            settings,
            push,
            pushes: TaskTracker::new(),
        }
    }

    pub fn store(&self) -> &Arc<NotificationStore> {
        &self.store
    }

    /// One spot-available notification per floor with newly freed slots,
    /// plus a floor update per floor whose count rose.
    pub async fn notify_changes(&self, diff: &SnapshotDiff, snapshot: &Snapshot) -> Vec<DispatchOutcome> {
        if diff.is_empty() {
            return Vec::new();
        }

        let mut outcomes = Vec::new();
        for (floor, readings) in diff.newly_available_by_floor() {
            let notification = builder::spot_available(floor, &readings);
            outcomes.push(self.dispatch(notification).await);
        }
        for increase in &diff.floor_increases {
            let notification = builder::floor_update(increase, snapshot.floor(increase.floor));
            outcomes.push(self.dispatch(notification).await);
        }
        outcomes
    }

    pub async fn notify_feedback_reply(&self, reply: FeedbackReply) -> DispatchOutcome {
        self.dispatch(builder::feedback_reply(reply)).await
    }

    pub async fn notify_general(&self, title: &str, message: &str) -> DispatchOutcome {
        self.dispatch(builder::general(title, message)).await
    }

    pub async fn dispatch(&self, notification: NewNotification) -> DispatchOutcome {
        let kind = notification.notification_type();
        if !self.settings.notifications().allows(kind) {
            debug!("{} notifications disabled, skipping '{}'", kind.as_str(), notification.title);
            return DispatchOutcome::Disabled;
        }

        let message = PushMessage::from(&notification);
        let outcome = if kind == NotificationType::General {
            DispatchOutcome::PushedOnly
        } else {
            match self.store.add(notification).await {
                Some(stored) => DispatchOutcome::Stored(stored),
                None => return DispatchOutcome::Suppressed,
            }
        };

        self.spawn_push(kind, message);
        outcome
    }

    /// Waits for every push handed off so far. Each one is bounded by
    /// [`PUSH_TIMEOUT`].
    pub async fn flush_pushes(&self) {
        self.pushes.close();
        self.pushes.wait().await;
        self.pushes.reopen();
    }

    fn spawn_push(&self, kind: NotificationType, message: PushMessage) {
        let push = Arc::clone(&self.push);
        self.pushes.spawn(async move {
            match tokio::time::timeout(PUSH_TIMEOUT, push.deliver(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!("Failed to deliver {} push: {err:?}", kind.as_str()),
                Err(_) => warn!(
                    "{} push abandoned after {}ms",
                    kind.as_str(),
                    PUSH_TIMEOUT.as_millis()
                ),
            }
        });
    }
}
