use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a reading row. The endpoint has shipped both numeric and
/// string ids, so either is accepted and carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingId::Int(id) => write!(f, "{id}"),
            ReadingId::Text(id) => f.write_str(id),
        }
    }
}

/// One sensor sample as returned by the occupancy endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub id: ReadingId,
    #[serde(default, alias = "sensorId")]
    pub sensor_id: Option<i64>,
    #[serde(alias = "isOccupied")]
    pub is_occupied: bool,
    #[serde(default, alias = "distanceCm", deserialize_with = "lenient_distance")]
    pub distance_cm: Option<f64>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "floorLevel")]
    pub floor_level: String,
    #[serde(default, alias = "slotName")]
    pub slot_name: Option<String>,
}

impl RawReading {
    /// A reading only counts toward statistics once it has both a sensor and
    /// a named slot.
    pub fn is_assigned(&self) -> bool {
        self.sensor_id.is_some() && self.slot_name.is_some()
    }
}

/// Decimal columns sometimes arrive as strings ("12.50"). Unparseable text
/// becomes `None`.
fn lenient_distance<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Distance {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Distance>::deserialize(deserializer)? {
        Some(Distance::Number(cm)) => Some(cm),
        Some(Distance::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FloorStatus {
    Full,
    Limited,
    Available,
}

impl FloorStatus {
    /// Fewer than this share of free spots marks a floor as limited.
    pub const LIMITED_RATIO: f64 = 0.2;

    pub fn classify(available: u32, total: u32) -> Self {
        if available == 0 {
            return FloorStatus::Full;
        }
        let ratio = f64::from(available) / f64::from(total.max(1));
        if ratio < Self::LIMITED_RATIO {
            FloorStatus::Limited
        } else {
            FloorStatus::Available
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FloorStatus::Full => "full",
            FloorStatus::Limited => "limited",
            FloorStatus::Available => "available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorSummary {
    pub floor: u32,
    pub total: u32,
    pub available: u32,
    pub occupancy_rate: f64,
    pub status: FloorStatus,
}

impl FloorSummary {
    pub fn new(floor: u32, total: u32, available: u32) -> Self {
        Self {
            floor,
            total,
            available,
            occupancy_rate: occupancy_rate(total, available),
            status: FloorStatus::classify(available, total),
        }
    }
}

/// Percentage of occupied spots; an empty floor reports 0 rather than NaN.
pub fn occupancy_rate(total: u32, available: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(total.saturating_sub(available)) / f64::from(total) * 100.0
}

/// Aggregated, point-in-time view of occupancy across all floors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub total_spots: u32,
    pub available_spots: u32,
    pub occupied_spots: u32,
    /// Sorted by `available`, most free spots first.
    pub floors: Vec<FloorSummary>,
    /// Display timestamp of the fetch, or an error descriptor when stale.
    pub last_updated: String,
    pub is_live: bool,
    /// Assigned readings only; kept so the next fetch can be diffed.
    pub sensor_data: Vec<RawReading>,
}

impl Snapshot {
    /// Placeholder published when a fetch fails before any data arrived.
    pub fn empty(last_updated: impl Into<String>) -> Self {
        Self {
            total_spots: 0,
            available_spots: 0,
            occupied_spots: 0,
            floors: Vec::new(),
            last_updated: last_updated.into(),
            is_live: false,
            sensor_data: Vec::new(),
        }
    }

    /// Copy of this snapshot marked stale with the given error text.
    pub fn stale(&self, error: impl Into<String>) -> Self {
        Self {
            last_updated: error.into(),
            is_live: false,
            ..self.clone()
        }
    }

    pub fn floor(&self, floor: u32) -> Option<&FloorSummary> {
        self.floors.iter().find(|summary| summary.floor == floor)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Connected,
    Error,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_status_thresholds() {
        assert_eq!(FloorStatus::classify(0, 10), FloorStatus::Full);
        assert_eq!(FloorStatus::classify(1, 10), FloorStatus::Limited);
        assert_eq!(FloorStatus::classify(2, 10), FloorStatus::Available);
        assert_eq!(FloorStatus::classify(10, 10), FloorStatus::Available);
    }

    #[test]
    fn occupancy_rate_handles_empty_floor() {
        assert_eq!(occupancy_rate(0, 0), 0.0);
        assert_eq!(occupancy_rate(4, 1), 75.0);
        let summary = FloorSummary::new(3, 0, 0);
        assert_eq!(summary.occupancy_rate, 0.0);
        assert!(!summary.occupancy_rate.is_nan());
    }

    #[test]
    fn reading_accepts_camel_case_and_numeric_ids() {
        let json = r#"{
            "id": 17,
            "sensorId": 3,
            "isOccupied": false,
            "distanceCm": 112.5,
            "floorLevel": "4th floor",
            "slotName": "A1"
        }"#;
        let reading: RawReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.id, ReadingId::Int(17));
        assert_eq!(reading.sensor_id, Some(3));
        assert!(reading.is_assigned());
        assert_eq!(reading.id.to_string(), "17");
    }

    #[test]
    fn reading_without_slot_is_unassigned() {
        let json = r#"{"id": "r-1", "sensor_id": 9, "is_occupied": true, "slot_name": null}"#;
        let reading: RawReading = serde_json::from_str(json).unwrap();
        assert!(!reading.is_assigned());
        assert_eq!(reading.floor_level, "");
    }
}
