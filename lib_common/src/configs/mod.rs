//! # Configuration Module
//!
//! Typed, environment-sourced settings for the ingestion pipeline. Values are
//! read from process environment variables, falling back to a local `.env`
//! file (loaded via `dotenvy`) when a variable is not already set — the
//! environment always wins over the file, matching the precedence `.env`
//! loaders use by default.
//!
//! Unknown environment keys are simply ignored; there is no strict-schema
//! rejection step.

#![forbid(unsafe_code)]

mod settings;
mod tickers;

pub use settings::{ConfigError, MarketHoursConfig, Settings};
pub use tickers::load_tickers_from_file;
