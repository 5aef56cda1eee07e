use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::models::{RawReading, Snapshot};

use super::floor::extract_floor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorIncrease {
    pub floor: u32,
    pub from: u32,
    pub to: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDiff {
    /// Slots occupied (or unknown) before and free now.
    pub newly_available: Vec<RawReading>,
    /// Floors present in both snapshots whose free count went up.
    pub floor_increases: Vec<FloorIncrease>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.newly_available.is_empty() && self.floor_increases.is_empty()
    }

    pub fn newly_available_by_floor(&self) -> BTreeMap<u32, Vec<RawReading>> {
        group_by_floor(&self.newly_available)
    }
}

/// Compares two snapshots slot by slot and floor by floor.
pub fn diff(old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
    let previous: HashMap<&str, bool> = old
        .sensor_data
        .iter()
        .filter_map(|r| r.slot_name.as_deref().map(|slot| (slot, r.is_occupied)))
        .collect();

    let mut seen = HashSet::new();
    let newly_available = new
        .sensor_data
        .iter()
        .filter(|r| !r.is_occupied)
        .filter(|r| {
            let Some(slot) = r.slot_name.as_deref() else {
                return false;
            };
            seen.insert(slot) && previous.get(slot).copied().unwrap_or(true)
        })
        .cloned()
        .collect();

    let mut floor_increases: Vec<FloorIncrease> = new
        .floors
        .iter()
        .filter_map(|current| {
            let before = old.floor(current.floor)?;
            (current.available > before.available).then_some(FloorIncrease {
                floor: current.floor,
                from: before.available,
                to: current.available,
            })
        })
        .collect();
    floor_increases.sort_by_key(|increase| increase.floor);

    SnapshotDiff {
        newly_available,
        floor_increases,
    }
}

/// Buckets readings by parsed floor so one fetch produces at most one
/// availability notification per floor.
pub fn group_by_floor(readings: &[RawReading]) -> BTreeMap<u32, Vec<RawReading>> {
    let mut groups: BTreeMap<u32, Vec<RawReading>> = BTreeMap::new();
    for reading in readings {
        groups
            .entry(extract_floor(&reading.floor_level))
            .or_default()
            .push(reading.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::aggregate;
    use crate::detector::test_support::reading;

    fn slots(diff: &SnapshotDiff) -> Vec<&str> {
        diff.newly_available
            .iter()
            .filter_map(|r| r.slot_name.as_deref())
            .collect()
    }

    #[test]
    fn reports_slot_that_became_free() {
        let old = aggregate(&[
            reading(1, "A1", true, "4th floor"),
            reading(2, "A2", false, "4th floor"),
        ]);
        let new = aggregate(&[
            reading(1, "A1", false, "4th floor"),
            reading(2, "A2", false, "4th floor"),
        ]);

        let diff = diff(&old, &new);
        assert_eq!(slots(&diff), vec!["A1"]);
        assert_eq!(
            diff.floor_increases,
            vec![FloorIncrease { floor: 4, from: 1, to: 2 }]
        );
    }

    #[test]
    fn slot_absent_before_counts_as_newly_available() {
        let old = aggregate(&[reading(1, "A1", true, "1st floor")]);
        let new = aggregate(&[
            reading(1, "A1", true, "1st floor"),
            reading(2, "A9", false, "1st floor"),
        ]);
        let diff = diff(&old, &new);
        assert_eq!(slots(&diff), vec!["A9"]);
    }

    #[test]
    fn floor_only_in_new_snapshot_is_not_an_increase() {
        let old = aggregate(&[reading(1, "A1", true, "1st floor")]);
        let new = aggregate(&[
            reading(1, "A1", true, "1st floor"),
            reading(2, "C1", false, "3rd floor"),
        ]);
        let diff = diff(&old, &new);
        assert!(diff.floor_increases.is_empty());
        assert_eq!(slots(&diff), vec!["C1"]);
    }

    #[test]
    fn no_change_yields_empty_diff() {
        let batch = [
            reading(1, "A1", true, "2nd floor"),
            reading(2, "A2", false, "2nd floor"),
        ];
        let diff = diff(&aggregate(&batch), &aggregate(&batch));
        assert!(diff.is_empty());
    }

    #[test]
    fn groups_newly_available_by_floor() {
        let old = aggregate(&[
            reading(1, "A1", true, "1st floor"),
            reading(2, "A2", true, "1st floor"),
            reading(3, "D1", true, "4th floor"),
        ]);
        let new = aggregate(&[
            reading(1, "A1", false, "1st floor"),
            reading(2, "A2", false, "1st floor"),
            reading(3, "D1", false, "4th floor"),
        ]);
        let groups = diff(&old, &new).newly_available_by_floor();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&1].len(), 2);
        assert_eq!(groups[&4].len(), 1);
    }
}
