use anyhow::{Context, Result};
use async_trait::async_trait;
use log::warn;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use crate::models::RawReading;

use super::error::FetchError;

/// Where raw sensor readings come from.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawReading>, FetchError>;
}

/// `GET <endpoint>` with an optional bearer token, expecting a JSON array.
pub struct HttpReadingSource {
    client: reqwest::Client,
    endpoint_url: String,
    api_token: Option<String>,
}

impl HttpReadingSource {
    pub fn new(endpoint_url: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        let endpoint_url = endpoint_url.into();
        reqwest::Url::parse(&endpoint_url)
            .with_context(|| format!("invalid sensor endpoint URL: {endpoint_url}"))?;

        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint_url,
            api_token,
        })
    }
}

#[async_trait]
impl ReadingSource for HttpReadingSource {
    async fn fetch(&self) -> Result<Vec<RawReading>, FetchError> {
        let mut request = self
            .client
            .get(&self.endpoint_url)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.api_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_readings(&body)
    }
}

/// Decodes a response body, rejecting anything that is not a JSON array.
/// Rows that do not decode are logged and dropped; the rest are kept.
pub fn parse_readings(body: &str) -> Result<Vec<RawReading>, FetchError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|err| FetchError::Malformed(err.to_string()))?;
    let serde_json::Value::Array(rows) = value else {
        return Err(FetchError::Malformed("expected a JSON array of readings".into()));
    };

    let total = rows.len();
    let readings: Vec<RawReading> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(reading) => Some(reading),
            Err(err) => {
                warn!("Skipping sensor row {index}: {err}");
                None
            }
        })
        .collect();

    if readings.len() < total {
        warn!("Decoded {} of {total} sensor rows", readings.len());
    }
    Ok(readings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_of_readings() {
        let body = r#"[
            {"id": 1, "sensor_id": 10, "is_occupied": false, "floor_level": "4th floor", "slot_name": "A1"},
            {"id": "x-2", "sensorId": null, "isOccupied": true, "floorLevel": "2nd floor", "slotName": null}
        ]"#;
        let readings = parse_readings(body).unwrap();
        assert_eq!(readings.len(), 2);
        assert!(readings[0].is_assigned());
        assert!(!readings[1].is_assigned());
    }

    #[test]
    fn bad_rows_are_dropped_without_losing_the_batch() {
        let body = r#"[
            {"id": 1, "sensor_id": 10, "is_occupied": false, "distance_cm": 182.4, "floor_level": "4th floor", "slot_name": "A1"},
            {"id": 2, "sensor_id": 11, "is_occupied": true, "distance_cm": "12.50", "floor_level": "4th floor", "slot_name": "A2"},
            {"id": 3, "sensor_id": 12, "is_occupied": null, "floor_level": "4th floor", "slot_name": "A3"},
            "not a row"
        ]"#;
        let readings = parse_readings(body).unwrap();

        let slots: Vec<_> = readings.iter().filter_map(|r| r.slot_name.as_deref()).collect();
        assert_eq!(slots, vec!["A1", "A2"]);
        assert_eq!(readings[1].distance_cm, Some(12.5));
    }

    #[test]
    fn empty_array_is_an_empty_batch() {
        assert!(parse_readings("[]").unwrap().is_empty());
    }

    #[test]
    fn object_body_is_malformed() {
        let err = parse_readings(r#"{"error": "nope"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(parse_readings("<html>"), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn rejects_relative_endpoint() {
        assert!(HttpReadingSource::new("/api/sensors", None).is_err());
        assert!(HttpReadingSource::new("https://parking.example.com/api/sensors", Some("t".into())).is_ok());
    }
}
