//! # Database Module
//!
//! PostgreSQL connection pooling and the idempotent repository layer that
//! writes trade and quote records.

/// Module for PostgreSQL database connection pooling and management.
pub mod db_postgres;

/// Table schema, wire-form row types, and conflict-ignoring batch writes.
pub mod repository;

pub use db_postgres::{Database, DbError};
pub use repository::{Quote, RawQuote, RawTrade, Repository, RepositorySink, Trade};
