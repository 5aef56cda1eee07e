pub mod builder;
pub mod dispatcher;
pub mod push;
pub mod store;

pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use push::{LogPushSink, PushMessage, PushSink};
pub use store::{NotificationStore, StoreConfig};
