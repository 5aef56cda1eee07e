//! Notification data models.
//!
//! A notification is a common envelope (`id`, `title`, `message`, timestamps,
//! read flag, priority) around a closed [`NotificationKind`] payload, so every
//! consumer has to handle each variant explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotAvailable {
    pub spots_available: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorUpdate {
    pub floor: u32,
    pub available_spots: u32,
    pub total_spots: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_available: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReply {
    pub feedback_id: String,
    /// Capped at [`FeedbackReply::ORIGINAL_PREVIEW_CHARS`] characters.
    pub original_feedback: String,
    pub admin_reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_name: Option<String>,
    pub reply_timestamp: DateTime<Utc>,
}

impl FeedbackReply {
    pub const ORIGINAL_PREVIEW_CHARS: usize = 100;

    pub fn new(
        feedback_id: impl Into<String>,
        original_feedback: &str,
        admin_reply: impl Into<String>,
        admin_name: Option<String>,
        reply_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            feedback_id: feedback_id.into(),
            original_feedback: truncate_chars(original_feedback, Self::ORIGINAL_PREVIEW_CHARS),
            admin_reply: admin_reply.into(),
            admin_name,
            reply_timestamp,
        }
    }
}

/// Truncates on a char boundary so multi-byte feedback text never splits.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NotificationKind {
    SpotAvailable(SpotAvailable),
    FloorUpdate(FloorUpdate),
    FeedbackReply(FeedbackReply),
    /// Push-only alert. Never persisted, counted or listed.
    General,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    SpotAvailable,
    FloorUpdate,
    FeedbackReply,
    General,
}

impl NotificationType {
    /// Types the notification log may hold.
    pub const STORED: [NotificationType; 3] = [
        NotificationType::SpotAvailable,
        NotificationType::FloorUpdate,
        NotificationType::FeedbackReply,
    ];

    pub fn is_stored(&self) -> bool {
        Self::STORED.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::SpotAvailable => "spot_available",
            NotificationType::FloorUpdate => "floor_update",
            NotificationType::FeedbackReply => "feedback_reply",
            NotificationType::General => "general",
        }
    }
}

impl NotificationKind {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            NotificationKind::SpotAvailable(_) => NotificationType::SpotAvailable,
            NotificationKind::FloorUpdate(_) => NotificationType::FloorUpdate,
            NotificationKind::FeedbackReply(_) => NotificationType::FeedbackReply,
            NotificationKind::General => NotificationType::General,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    #[serde(default)]
    pub priority: Priority,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn notification_type(&self) -> NotificationType {
        self.kind.notification_type()
    }
}

/// A notification before the store stamps id, timestamp and read state.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub kind: NotificationKind,
}

impl NewNotification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority: Priority::default(),
            kind,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn notification_type(&self) -> NotificationType {
        self.kind.notification_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "é".repeat(150);
        let truncated = truncate_chars(&text, 100);
        assert_eq!(truncated.chars().count(), 100);
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn feedback_reply_truncates_original() {
        let long = "x".repeat(250);
        let reply = FeedbackReply::new("fb-1", &long, "Thanks!", None, Utc::now());
        assert_eq!(reply.original_feedback.len(), 100);
    }

    #[test]
    fn kind_serializes_with_type_tag() {
        let kind = NotificationKind::SpotAvailable(SpotAvailable {
            spots_available: 2,
            floor: Some(4),
            spot_ids: Some(vec!["A1".into(), "A2".into()]),
        });
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "spot_available");
        assert_eq!(value["data"]["spotsAvailable"], 2);

        let general = serde_json::to_value(&NotificationKind::General).unwrap();
        assert_eq!(general["type"], "general");
        let back: NotificationKind = serde_json::from_value(general).unwrap();
        assert_eq!(back, NotificationKind::General);
    }

    #[test]
    fn only_general_is_excluded_from_storage() {
        assert!(NotificationType::SpotAvailable.is_stored());
        assert!(NotificationType::FloorUpdate.is_stored());
        assert!(NotificationType::FeedbackReply.is_stored());
        assert!(!NotificationType::General.is_stored());
    }
}
