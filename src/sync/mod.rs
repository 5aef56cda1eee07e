pub mod backoff;
mod controller;
pub mod error;
mod loop_worker;
pub mod source;
mod state;

pub use backoff::{Backoff, BackoffPolicy, NextAttempt};
pub use controller::SyncEngine;
pub use error::FetchError;
pub use source::{HttpReadingSource, ReadingSource};
pub use state::{EngineStats, EngineStatus, FetchOutcome, FetchPhase};
