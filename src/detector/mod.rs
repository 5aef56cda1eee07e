//! Change detection over occupancy snapshots.
//!
//! Everything here is pure: readings in, snapshots and diffs out. The sync
//! engine owns the previous snapshot and decides what to publish.

pub mod aggregate;
pub mod diff;
pub mod floor;

pub use aggregate::{aggregate, aggregate_at, display_timestamp};
pub use diff::{diff, group_by_floor, FloorIncrease, SnapshotDiff};
pub use floor::{extract_floor, FALLBACK_FLOOR, MAX_FLOOR, MIN_FLOOR};
