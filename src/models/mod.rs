pub mod notification;
pub mod snapshot;

pub use notification::{
    FeedbackReply, FloorUpdate, NewNotification, Notification, NotificationKind,
    NotificationType, Priority, SpotAvailable,
};
pub use snapshot::{
    ConnectionStatus, FloorStatus, FloorSummary, RawReading, ReadingId, Snapshot,
};
