//! Typed application settings, read from the process environment (with an
//! optional `.env` file as a fallback source).

use std::env;
use std::path::PathBuf;

use chrono::NaiveTime;
use thiserror::Error;

/// Errors that can occur while assembling [`Settings`] at startup.
///
/// Every variant here is fatal at startup: the process should log the
/// error and exit non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    /// An environment variable was set but could not be parsed into the
    /// expected type.
    #[error("invalid value for environment variable {name}: {value:?} ({reason})")]
    InvalidVar {
        /// Name of the offending environment variable.
        name: String,
        /// The raw value that failed to parse.
        value: String,
        /// Human-readable parse failure reason.
        reason: String,
    },

    /// The ticker universe file was missing or empty; see
    /// [`crate::configs::load_tickers_from_file`].
    #[error("ticker universe error: {0}")]
    TickerUniverse(String),
}

/// The six local times of day that delimit a trading day.
///
/// Invariant: `pre_open <= pre_close == reg_open <= reg_close == af_open <=
/// af_close`. This is not enforced by the type itself (the defaults satisfy
/// it, and operators are expected to keep overrides consistent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketHoursConfig {
    /// Start of the pre-market session (default 04:00 ET).
    pub pre_open: NaiveTime,
    /// End of the pre-market session / start of the regular session
    /// (default 09:30 ET).
    pub pre_close: NaiveTime,
    /// Start of the regular session (default 09:30 ET).
    pub reg_open: NaiveTime,
    /// End of the regular session / start of the after-hours session
    /// (default 16:00 ET).
    pub reg_close: NaiveTime,
    /// Start of the after-hours session (default 16:00 ET).
    pub af_open: NaiveTime,
    /// End of the after-hours session (default 20:00 ET).
    pub af_close: NaiveTime,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            pre_open: NaiveTime::from_hms_opt(4, 0, 0).expect("valid time"),
            pre_close: NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
            reg_open: NaiveTime::from_hms_opt(9, 30, 0).expect("valid time"),
            reg_close: NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
            af_open: NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
            af_close: NaiveTime::from_hms_opt(20, 0, 0).expect("valid time"),
        }
    }
}

/// Process-wide configuration, assembled once at startup.
///
/// Meant to be constructed once and then passed by handle (`Arc<Settings>`)
/// into the constructors of `MarketClock`, `RestClient`, `Repository`, etc.,
/// rather than re-read from the environment at arbitrary call sites. Tests
/// construct alternate `Settings` values directly with [`Settings::for_test`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Vendor API key (secret). Never logged.
    pub massive_api_key: String,
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Path to the ticker universe text file.
    pub tickers_file: PathBuf,
    /// Seconds to sleep between cycles while the market is open.
    pub collect_interval_seconds: u64,
    /// IANA timezone name used for all phase arithmetic (informational —
    /// the clock itself is hardwired to US/Eastern; the name is retained
    /// here for potential future parameterization).
    pub market_timezone: String,
    /// The six local session boundary times.
    pub market_hours: MarketHoursConfig,
}

impl Settings {
    /// Loads settings from `.env` (if present) and the process environment.
    ///
    /// Environment variables always win over values from the `.env` file —
    /// `dotenvy::dotenv` does not override a variable that is already set.
    pub fn load() -> Result<Self, ConfigError> {
        // Missing .env file is not an error: environment-only deployments
        // (containers, systemd units) are expected to skip it entirely.
        let _ = dotenvy::dotenv();

        let massive_api_key = require_var("MASSIVE_API_KEY")?;
        let database_url = require_var("DATABASE_URL")?;

        let default_tickers_file = default_tickers_path();
        let tickers_file = env::var("TICKERS_FILE")
            .map(PathBuf::from)
            .unwrap_or(default_tickers_file);

        let collect_interval_seconds = match env::var("COLLECT_INTERVAL_SECONDS") {
            Ok(raw) => parse_var("COLLECT_INTERVAL_SECONDS", &raw)?,
            Err(_) => 60,
        };

        let market_timezone = env::var("MARKET_TIMEZONE")
            .unwrap_or_else(|_| "America/New_York".to_string());

        let mut market_hours = MarketHoursConfig::default();
        apply_time_override(&mut market_hours.pre_open, "MARKET_HOURS_PRE_OPEN")?;
        apply_time_override(&mut market_hours.pre_close, "MARKET_HOURS_PRE_CLOSE")?;
        apply_time_override(&mut market_hours.reg_open, "MARKET_HOURS_REG_OPEN")?;
        apply_time_override(&mut market_hours.reg_close, "MARKET_HOURS_REG_CLOSE")?;
        apply_time_override(&mut market_hours.af_open, "MARKET_HOURS_AF_OPEN")?;
        apply_time_override(&mut market_hours.af_close, "MARKET_HOURS_AF_CLOSE")?;

        Ok(Self {
            massive_api_key,
            database_url,
            tickers_file,
            collect_interval_seconds,
            market_timezone,
            market_hours,
        })
    }

    /// Builds a `Settings` value for unit/integration tests without
    /// touching the environment or a `.env` file.
    pub fn for_test(database_url: impl Into<String>) -> Self {
        Self {
            massive_api_key: "test-api-key".to_string(),
            database_url: database_url.into(),
            tickers_file: default_tickers_path(),
            collect_interval_seconds: 60,
            market_timezone: "America/New_York".to_string(),
            market_hours: MarketHoursConfig::default(),
        }
    }
}

fn default_tickers_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../pipeline/nasdaq100.txt")
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidVar {
        name: name.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn apply_time_override(slot: &mut NaiveTime, var: &str) -> Result<(), ConfigError> {
    let Ok(raw) = env::var(var) else {
        return Ok(());
    };
    *slot = NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| ConfigError::InvalidVar {
        name: var.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}
