use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::notifications::StoreConfig;

pub const MIN_REFRESH_RATE_MS: u64 = 1_000;
pub const MAX_REFRESH_RATE_MS: u64 = 60_000;

pub fn clamp_refresh_rate(ms: u64) -> u64 {
    ms.clamp(MIN_REFRESH_RATE_MS, MAX_REFRESH_RATE_MS)
}

/// Tunables for the polling engine and the notification log.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub endpoint_url: String,
    pub api_token: Option<String>,
    pub refresh_rate_ms: u64,
    pub fetch_timeout: Duration,
    /// Forced fetches closer than this to the previous attempt are skipped.
    pub min_fetch_spacing: Duration,

    /// Retry delay is `retry_base_delay * retry_multiplier^n`, capped at `retry_max_delay`.
    pub retry_base_delay: Duration,
    pub retry_multiplier: f64,
    pub retry_max_delay: Duration,
    pub max_retries: u32,

    /// Consecutive failures that trigger the extended cooldown.
    pub max_consecutive_errors: u32,
    pub cooldown_multiplier: u32,
    pub max_cooldown: Duration,

    pub auto_start_on_subscribe: bool,

    pub max_notifications: usize,
    pub dedup_window: Duration,

    /// SQLite file for the key-value store. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:3000/api/sensors".to_string(),
            api_token: None,
            refresh_rate_ms: 5_000,
            fetch_timeout: Duration::from_secs(6),
            min_fetch_spacing: Duration::from_secs(2),
            retry_base_delay: Duration::from_secs(2),
            retry_multiplier: 1.5,
            retry_max_delay: Duration::from_secs(10),
            max_retries: 3,
            max_consecutive_errors: 8,
            cooldown_multiplier: 3,
            max_cooldown: Duration::from_secs(30),
            auto_start_on_subscribe: true,
            max_notifications: 50,
            dedup_window: Duration::from_secs(5 * 60),
            db_path: None,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `PARKSYNC_*` variables (a `.env` file is honoured).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            endpoint_url: env::var("PARKSYNC_ENDPOINT_URL").unwrap_or(defaults.endpoint_url),
            api_token: env::var("PARKSYNC_API_TOKEN")
                .ok()
                .filter(|token| !token.is_empty())
                .or(defaults.api_token),
            refresh_rate_ms: clamp_refresh_rate(
                parse_var("PARKSYNC_REFRESH_RATE_MS")?.unwrap_or(defaults.refresh_rate_ms),
            ),
            fetch_timeout: parse_var("PARKSYNC_FETCH_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            min_fetch_spacing: parse_var("PARKSYNC_MIN_FETCH_SPACING_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_fetch_spacing),
            max_retries: parse_var("PARKSYNC_MAX_RETRIES")?.unwrap_or(defaults.max_retries),
            max_consecutive_errors: parse_var("PARKSYNC_MAX_CONSECUTIVE_ERRORS")?
                .unwrap_or(defaults.max_consecutive_errors),
            auto_start_on_subscribe: parse_var("PARKSYNC_AUTO_START")?
                .unwrap_or(defaults.auto_start_on_subscribe),
            max_notifications: parse_var("PARKSYNC_MAX_NOTIFICATIONS")?
                .unwrap_or(defaults.max_notifications),
            db_path: env::var("PARKSYNC_DB_PATH")
                .ok()
                .filter(|path| !path.is_empty())
                .map(PathBuf::from)
                .or(defaults.db_path),
            ..defaults
        };

        Ok(config)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_notifications: self.max_notifications,
            dedup_window: self.dedup_window,
        }
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_rate_is_clamped() {
        assert_eq!(clamp_refresh_rate(10), 1_000);
        assert_eq!(clamp_refresh_rate(5_000), 5_000);
        assert_eq!(clamp_refresh_rate(600_000), 60_000);
    }

    #[test]
    fn defaults_match_engine_contract() {
        let config = SyncConfig::default();
        assert_eq!(config.fetch_timeout, Duration::from_secs(6));
        assert_eq!(config.min_fetch_spacing, Duration::from_secs(2));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_consecutive_errors, 8);
        assert!(config.auto_start_on_subscribe);
        assert_eq!(config.store_config().max_notifications, 50);
    }

    #[test]
    fn parse_var_reports_bad_values() {
        env::set_var("PARKSYNC_TEST_BAD_NUMBER", "fast");
        let err = parse_var::<u64>("PARKSYNC_TEST_BAD_NUMBER").unwrap_err();
        assert!(err.to_string().contains("PARKSYNC_TEST_BAD_NUMBER"));
        env::remove_var("PARKSYNC_TEST_BAD_NUMBER");

        assert_eq!(parse_var::<u64>("PARKSYNC_TEST_UNSET").unwrap(), None);
    }
}
