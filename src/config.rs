//! Environment configuration.
//!
//! All configuration comes from the process environment, read once at
//! startup. Mandatory values (bot token, channel id, state directory)
//! abort startup when missing; everything else falls back to a default.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default race calendar endpoint.
const DEFAULT_API_URL: &str = "https://backend-vuelta-rapida-production.up.railway.app/api/races";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (`TELEGRAM_TOKEN`).
    pub telegram_token: String,
    /// Channel receiving the notifications (`TELEGRAM_CHANNEL_ID`).
    pub channel_id: i64,
    /// Directory holding persisted triggers (`STATE_DIR`).
    pub state_dir: PathBuf,
    /// Race calendar endpoint (`API_URL`).
    pub api_url: Url,
    /// Forward window queried per discovery pass, in days (`API_DAYS_AHEAD`).
    pub api_days_ahead: i64,
    /// Advance-warning offset, in hours (`NOTIFICATION_LEAD_HOURS`).
    pub lead_hours: i64,
    /// Discovery interval, in hours (`CHECK_INTERVAL_HOURS`).
    pub check_interval_hours: u64,
    /// Category filter applied to fetched events (`CATEGORY_ID`).
    pub category_id: String,
    /// Health server port (`PORT`).
    pub port: u16,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a lookup function.
    ///
    /// Separate from [`Config::from_env`] so tests can feed values without
    /// touching the process environment.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let telegram_token = require(&lookup, "TELEGRAM_TOKEN")?;

        let channel_raw = require(&lookup, "TELEGRAM_CHANNEL_ID")?;
        let channel_id = channel_raw
            .parse()
            .map_err(|_| ConfigError::invalid("TELEGRAM_CHANNEL_ID", &channel_raw))?;

        let state_dir = PathBuf::from(require(&lookup, "STATE_DIR")?);

        let api_url = match lookup("API_URL").filter(|v| !v.is_empty()) {
            Some(raw) => Url::parse(&raw).map_err(|_| ConfigError::invalid("API_URL", &raw))?,
            None => Url::parse(DEFAULT_API_URL).expect("hardcoded URL is valid"),
        };

        // Both offsets feed calendar arithmetic and must stay inside
        // chrono's representable range
        let api_days_ahead = parse_or(&lookup, "API_DAYS_AHEAD", 90)?;
        if api_days_ahead < 0 || chrono::Duration::try_days(api_days_ahead).is_none() {
            return Err(ConfigError::invalid(
                "API_DAYS_AHEAD",
                api_days_ahead.to_string(),
            ));
        }

        let lead_hours = parse_or(&lookup, "NOTIFICATION_LEAD_HOURS", 8)?;
        if lead_hours < 0 || chrono::Duration::try_hours(lead_hours).is_none() {
            return Err(ConfigError::invalid(
                "NOTIFICATION_LEAD_HOURS",
                lead_hours.to_string(),
            ));
        }

        // The discovery timer rejects a zero period
        let check_interval_hours = parse_or(&lookup, "CHECK_INTERVAL_HOURS", 4)?;
        if check_interval_hours == 0 {
            return Err(ConfigError::invalid("CHECK_INTERVAL_HOURS", "0"));
        }

        Ok(Self {
            telegram_token,
            channel_id,
            state_dir,
            api_url,
            api_days_ahead,
            lead_hours,
            check_interval_hours,
            category_id: lookup("CATEGORY_ID")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "f1".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
        })
    }

    /// Discovery interval as a duration.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_hours.saturating_mul(3600))
    }
}

/// Fetch a mandatory variable; empty counts as absent.
fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Fetch an optional variable, parsing it into `T` or falling back.
fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::invalid(key, &raw)),
        None => Ok(default),
    }
}

/// Errors preventing startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mandatory variable is absent.
    #[error("required environment variable {0} is not set")]
    MissingEnvVar(String),

    /// A variable is present but unusable.
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: String, value: String },
}

impl ConfigError {
    fn invalid(var: &'static str, value: impl Into<String>) -> Self {
        Self::Invalid {
            var: var.to_string(),
            value: value.into(),
        }
    }
}
