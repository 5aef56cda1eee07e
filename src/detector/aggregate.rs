use std::collections::BTreeMap;

use chrono::{DateTime, Local};

use crate::models::{FloorSummary, RawReading, Snapshot};

use super::floor::extract_floor;

/// Builds a live snapshot from one batch of readings. Unassigned readings are
/// dropped before anything is counted.
pub fn aggregate(readings: &[RawReading]) -> Snapshot {
    aggregate_at(readings, Local::now())
}

pub fn aggregate_at(readings: &[RawReading], fetched_at: DateTime<Local>) -> Snapshot {
    let assigned: Vec<RawReading> = readings
        .iter()
        .filter(|reading| reading.is_assigned())
        .cloned()
        .collect();

    // floor -> (total, available)
    let mut per_floor: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
    for reading in &assigned {
        let entry = per_floor
            .entry(extract_floor(&reading.floor_level))
            .or_insert((0, 0));
        entry.0 += 1;
        if !reading.is_occupied {
            entry.1 += 1;
        }
    }

    let mut floors: Vec<FloorSummary> = per_floor
        .into_iter()
        .map(|(floor, (total, available))| FloorSummary::new(floor, total, available))
        .collect();
    // Stable sort keeps ascending floor order among ties.
    floors.sort_by(|a, b| b.available.cmp(&a.available));

    let total_spots = floors.iter().map(|f| f.total).sum::<u32>();
    let available_spots = floors.iter().map(|f| f.available).sum::<u32>();

    Snapshot {
        total_spots,
        available_spots,
        occupied_spots: total_spots - available_spots,
        floors,
        last_updated: display_timestamp(fetched_at),
        is_live: true,
        sensor_data: assigned,
    }
}

pub fn display_timestamp(at: DateTime<Local>) -> String {
    at.format("%-I:%M:%S %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::test_support::reading;
    use crate::models::FloorStatus;

    #[test]
    fn counts_only_assigned_readings() {
        let mut unassigned_slot = reading(10, "Z9", false, "1st floor");
        unassigned_slot.slot_name = None;
        let mut unassigned_sensor = reading(11, "Z8", false, "1st floor");
        unassigned_sensor.sensor_id = None;

        let readings = vec![
            reading(1, "A1", true, "4th floor"),
            reading(2, "A2", false, "4th floor"),
            reading(3, "B1", false, "1st floor"),
            unassigned_slot,
            unassigned_sensor,
        ];
        let snapshot = aggregate(&readings);

        assert_eq!(snapshot.total_spots, 3);
        assert_eq!(snapshot.available_spots, 2);
        assert_eq!(snapshot.occupied_spots, 1);
        assert_eq!(snapshot.sensor_data.len(), 3);
        assert!(snapshot.is_live);
        assert_eq!(
            snapshot.floors.iter().map(|f| f.total).sum::<u32>(),
            snapshot.total_spots
        );
    }

    #[test]
    fn aggregation_invariant_holds_for_mixed_batches() {
        let mut readings = Vec::new();
        for i in 0..40 {
            let mut r = reading(i, &format!("S{i}"), i % 3 == 0, &format!("{}th floor", i % 7));
            if i % 5 == 0 {
                r.slot_name = None;
            }
            if i % 11 == 0 {
                r.sensor_id = None;
            }
            readings.push(r);
        }
        let expected_total = readings.iter().filter(|r| r.is_assigned()).count() as u32;
        let snapshot = aggregate(&readings);

        assert_eq!(snapshot.total_spots, expected_total);
        assert_eq!(
            snapshot.available_spots + snapshot.occupied_spots,
            snapshot.total_spots
        );
    }

    #[test]
    fn floors_sorted_by_availability() {
        let readings = vec![
            reading(1, "A1", true, "1st floor"),
            reading(2, "B1", false, "3rd floor"),
            reading(3, "B2", false, "3rd floor"),
            reading(4, "C1", false, "5th floor"),
        ];
        let snapshot = aggregate(&readings);
        let order: Vec<u32> = snapshot.floors.iter().map(|f| f.floor).collect();
        assert_eq!(order, vec![3, 5, 1]);
        assert_eq!(snapshot.floor(1).unwrap().status, FloorStatus::Full);
        assert_eq!(snapshot.floor(1).unwrap().occupancy_rate, 100.0);
    }

    #[test]
    fn unparseable_floor_goes_to_fallback() {
        let readings = vec![reading(1, "P1", false, "rooftop")];
        let snapshot = aggregate(&readings);
        assert_eq!(snapshot.floors[0].floor, crate::detector::FALLBACK_FLOOR);
    }

    #[test]
    fn empty_batch_yields_empty_snapshot() {
        let snapshot = aggregate(&[]);
        assert_eq!(snapshot.total_spots, 0);
        assert!(snapshot.floors.is_empty());
    }
}
