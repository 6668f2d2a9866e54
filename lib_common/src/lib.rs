//! # lib_common
//!
//! Shared primitives for the market-data ingestion pipeline: typed
//! configuration, a calendar-aware market clock, a paginating/retrying REST
//! client, and an idempotent PostgreSQL repository. Each concern lives
//! behind its own Cargo feature so that binaries only pull in the
//! dependencies they actually use; enable `full` to get everything.

#![forbid(unsafe_code)]

/// Typed, environment-sourced settings and the ticker universe loader.
#[cfg(feature = "configs")]
pub mod configs;

/// PostgreSQL connection pooling and the idempotent repository layer.
#[cfg(feature = "db")]
pub mod db;

/// `tracing`-based logging setup.
#[cfg(feature = "logging")]
pub mod loggers;

/// Calendar-aware market-hours clock.
#[cfg(feature = "markets")]
pub mod markets;

/// Paginating, retrying REST client for the vendor API.
#[cfg(feature = "retrieve")]
pub mod retrieve;
