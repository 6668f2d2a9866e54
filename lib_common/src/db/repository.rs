//! Idempotent batch writes for trade and quote records.
//!
//! Multi-row inserts are built with `sqlx::QueryBuilder`, the idiomatic way
//! to assemble a variable-width `VALUES (...), (...), ...` list against
//! sqlx's compile-time-unchecked query API. Conflicting rows are ignored
//! on insert rather than upserted, so a repeated fetch of the same record
//! is a no-op.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, QueryBuilder};
use thiserror::Error;

/// Errors raised while creating tables or writing rows.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Schema creation failed.
    #[error("failed to create schema: {0}")]
    Schema(#[source] sqlx::Error),
    /// A batch insert failed.
    #[error("failed to write {table}: {source}")]
    Write {
        /// Name of the target table.
        table: &'static str,
        /// Underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },
}

/// A trade record exactly as the vendor sends it over the wire, before the
/// mapping step in [`Trade::from_wire`] drops it or fills in the ticker.
///
/// `sip_timestamp` is optional here (not on [`Trade`]) because a record
/// lacking it is silently dropped rather than rejected outright; everything
/// else is optional per the wire format's "at minimum" field list.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    /// SIP timestamp, nanoseconds since epoch. Absence drops the record.
    pub sip_timestamp: Option<i64>,
    /// Trade price.
    pub price: f64,
    /// Trade size (number of shares/contracts).
    pub size: f64,
    /// Vendor-assigned trade id, string or numeric on the wire.
    pub id: Option<JsonValue>,
    /// Exchange code the trade was reported on.
    pub exchange: Option<i32>,
    /// Condition codes attached to the trade.
    pub conditions: Option<Vec<i32>>,
    /// Trade correction indicator, if any.
    pub correction: Option<i32>,
    /// Consolidated tape identifier (A/B/C).
    pub tape: Option<i32>,
    /// Trade Reporting Facility id, if the trade was off-exchange.
    pub trf_id: Option<i32>,
    /// TRF-assigned timestamp, nanoseconds since epoch.
    pub trf_timestamp: Option<i64>,
    /// Timestamp assigned by the originating participant, nanoseconds since epoch.
    pub participant_timestamp: Option<i64>,
    /// Per-symbol sequence number.
    pub sequence_number: Option<i64>,
}

/// A single trade tick, mapped and ready for insertion.
///
/// Standard trade attribution fields plus the consolidated-tape identifiers
/// (`trf_id`, `trf_timestamp`, `participant_timestamp`, `sequence_number`)
/// that distinguish one print from another on the same symbol/timestamp.
#[derive(Debug, Clone)]
pub struct Trade {
    /// Ticker symbol, supplied by the caller rather than trusted from the
    /// payload, always upper-cased before storage.
    pub ticker: String,
    /// Trade price.
    pub price: f64,
    /// Trade size (number of shares/contracts).
    pub size: f64,
    /// Exchange code the trade was reported on.
    pub exchange: Option<i32>,
    /// Condition codes attached to the trade.
    pub conditions: Option<Vec<i32>>,
    /// Trade correction indicator, if any.
    pub correction: Option<i32>,
    /// Consolidated tape identifier (A/B/C).
    pub tape: Option<i32>,
    /// Trade Reporting Facility id, if the trade was off-exchange.
    pub trf_id: Option<i32>,
    /// TRF-assigned timestamp, nanoseconds since epoch.
    pub trf_timestamp: Option<i64>,
    /// Timestamp assigned by the originating participant, nanoseconds since epoch.
    pub participant_timestamp: Option<i64>,
    /// `string(id)` from the wire record; part of the uniqueness key
    /// alongside `ticker` and `time`.
    pub vendor_trade_id: Option<String>,
    /// Per-symbol sequence number, informational only for trades (not part
    /// of the trade uniqueness key).
    pub sequence_number: Option<i64>,
    /// SIP timestamp, nanoseconds since epoch. This is the timestamp mapped
    /// to `observed_at` on write.
    pub sip_timestamp: i64,
}

impl Trade {
    /// Maps a wire-form trade to a persisted row, assigning `ticker` from
    /// the caller rather than trusting the payload. Returns `None` when
    /// `sip_timestamp` is absent.
    pub fn from_wire(ticker: &str, raw: RawTrade) -> Option<Self> {
        let sip_timestamp = raw.sip_timestamp?;
        Some(Self {
            ticker: ticker.to_uppercase(),
            price: raw.price,
            size: raw.size,
            exchange: raw.exchange,
            conditions: raw.conditions,
            correction: raw.correction,
            tape: raw.tape,
            trf_id: raw.trf_id,
            trf_timestamp: raw.trf_timestamp,
            participant_timestamp: raw.participant_timestamp,
            vendor_trade_id: raw.id.map(|id| json_id_to_string(&id)),
            sequence_number: raw.sequence_number,
            sip_timestamp,
        })
    }
}

/// A quote record exactly as the vendor sends it over the wire. See
/// [`RawTrade`] for why `sip_timestamp` alone is optional here.
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuote {
    /// SIP timestamp, nanoseconds since epoch. Absence drops the record.
    pub sip_timestamp: Option<i64>,
    /// Best bid price.
    pub bid_price: Option<f64>,
    /// Best bid size.
    pub bid_size: Option<f64>,
    /// Exchange reporting the best bid.
    pub bid_exchange: Option<i32>,
    /// Best ask price.
    pub ask_price: Option<f64>,
    /// Best ask size.
    pub ask_size: Option<f64>,
    /// Exchange reporting the best ask.
    pub ask_exchange: Option<i32>,
    /// Condition codes attached to the quote.
    pub conditions: Option<Vec<i32>>,
    /// Quote indicator codes.
    pub indicators: Option<Vec<i32>>,
    /// Timestamp assigned by the originating participant, nanoseconds since epoch.
    pub participant_timestamp: Option<i64>,
    /// Per-symbol sequence number, used as part of the uniqueness key.
    pub sequence_number: Option<i64>,
    /// Consolidated tape identifier (A/B/C).
    pub tape: Option<i32>,
}

/// A single quote (NBBO) update, mapped and ready for insertion.
#[derive(Debug, Clone)]
pub struct Quote {
    /// Ticker symbol, supplied by the caller rather than trusted from the
    /// payload, always upper-cased before storage.
    pub ticker: String,
    /// Best bid price.
    pub bid_price: Option<f64>,
    /// Best bid size.
    pub bid_size: Option<f64>,
    /// Exchange reporting the best bid.
    pub bid_exchange: Option<i32>,
    /// Best ask price.
    pub ask_price: Option<f64>,
    /// Best ask size.
    pub ask_size: Option<f64>,
    /// Exchange reporting the best ask.
    pub ask_exchange: Option<i32>,
    /// Condition codes attached to the quote.
    pub conditions: Option<Vec<i32>>,
    /// Quote indicator codes.
    pub indicators: Option<Vec<i32>>,
    /// Timestamp assigned by the originating participant, nanoseconds since epoch.
    pub participant_timestamp: Option<i64>,
    /// Per-symbol sequence number, used as part of the uniqueness key
    /// alongside `ticker` and `time`.
    pub sequence_number: Option<i64>,
    /// Consolidated tape identifier (A/B/C).
    pub tape: Option<i32>,
    /// SIP timestamp, nanoseconds since epoch. This is the timestamp mapped
    /// to `observed_at` on write.
    pub sip_timestamp: i64,
}

impl Quote {
    /// Maps a wire-form quote to a persisted row. Returns `None` when
    /// `sip_timestamp` is absent.
    pub fn from_wire(ticker: &str, raw: RawQuote) -> Option<Self> {
        let sip_timestamp = raw.sip_timestamp?;
        Some(Self {
            ticker: ticker.to_uppercase(),
            bid_price: raw.bid_price,
            bid_size: raw.bid_size,
            bid_exchange: raw.bid_exchange,
            ask_price: raw.ask_price,
            ask_size: raw.ask_size,
            ask_exchange: raw.ask_exchange,
            conditions: raw.conditions,
            indicators: raw.indicators,
            participant_timestamp: raw.participant_timestamp,
            sequence_number: raw.sequence_number,
            tape: raw.tape,
            sip_timestamp,
        })
    }
}

/// Renders a wire `id` field (string or number) as a plain string.
fn json_id_to_string(id: &JsonValue) -> String {
    match id {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a vendor nanosecond-epoch timestamp into a UTC instant.
///
/// The mapping is exact, not a truncated/rounded millisecond conversion —
/// seconds and the remaining nanoseconds are split out explicitly before
/// handing them to `DateTime::from_timestamp`.
pub fn nanos_to_utc(nanos: i64) -> DateTime<Utc> {
    let secs = nanos.div_euclid(1_000_000_000);
    let subsec_nanos = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec_nanos).expect("nanosecond epoch in representable range")
}

const MAX_BATCH_ROWS: usize = 2000;

/// The write side of [`Repository`], abstracted so that callers such as
/// `Collector` can be tested against an in-memory fake instead of a live
/// Postgres instance (the end-to-end scenario tests do exactly this).
pub trait RepositorySink {
    /// Inserts `trades`, ignoring duplicates per the unique trade key.
    async fn save_trades(&self, trades: &[Trade]) -> Result<u64, RepositoryError>;
    /// Inserts `quotes`, ignoring duplicates per the unique quote key.
    async fn save_quotes(&self, quotes: &[Quote]) -> Result<u64, RepositoryError>;
}

/// Read/write access to the `trades`, `quotes`, and `market_calendar` tables.
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    /// Wraps an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool, e.g. for [`super::Database::ping`] or a
    /// `CalendarStore`.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `trades`, `quotes`, and `market_calendar` tables if they
    /// do not already exist.
    ///
    /// Plain relational DDL only: no TimescaleDB hypertable conversion is
    /// issued here, since that is out of scope for this pipeline.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id BIGSERIAL PRIMARY KEY,
                ticker TEXT NOT NULL,
                price DOUBLE PRECISION NOT NULL,
                size DOUBLE PRECISION NOT NULL,
                exchange INTEGER,
                conditions INTEGER[],
                correction INTEGER,
                tape INTEGER,
                trf_id INTEGER,
                trf_timestamp BIGINT,
                participant_timestamp BIGINT,
                vendor_trade_id TEXT,
                sequence_number BIGINT,
                sip_timestamp BIGINT NOT NULL,
                observed_at TIMESTAMPTZ NOT NULL,
                CONSTRAINT uq_trades_unique_trade UNIQUE (observed_at, ticker, vendor_trade_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Schema)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                id BIGSERIAL PRIMARY KEY,
                ticker TEXT NOT NULL,
                bid_price DOUBLE PRECISION,
                bid_size DOUBLE PRECISION,
                bid_exchange INTEGER,
                ask_price DOUBLE PRECISION,
                ask_size DOUBLE PRECISION,
                ask_exchange INTEGER,
                conditions INTEGER[],
                indicators INTEGER[],
                participant_timestamp BIGINT,
                sequence_number BIGINT,
                tape INTEGER,
                sip_timestamp BIGINT NOT NULL,
                observed_at TIMESTAMPTZ NOT NULL,
                CONSTRAINT uq_quotes_unique_quote UNIQUE (observed_at, ticker, sequence_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Schema)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_calendar (
                date DATE PRIMARY KEY,
                status TEXT NOT NULL,
                open_time TIME,
                close_time TIME,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::Schema)?;

        Ok(())
    }

    /// Inserts `trades`, ignoring any row that collides with
    /// `uq_trades_unique_trade`.
    ///
    /// Returns the number of rows actually inserted (informational only —
    /// per the design notes, callers should never assert this count
    /// exactly, since a conflict-ignored duplicate is expected and benign).
    pub async fn save_trades(&self, trades: &[Trade]) -> Result<u64, RepositoryError> {
        if trades.is_empty() {
            return Ok(0);
        }
        let mut affected = 0u64;
        for chunk in trades.chunks(MAX_BATCH_ROWS) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                "INSERT INTO trades (ticker, price, size, exchange, conditions, correction, \
                 tape, trf_id, trf_timestamp, participant_timestamp, vendor_trade_id, \
                 sequence_number, sip_timestamp, observed_at) ",
            );
            builder.push_values(chunk, |mut row, trade| {
                row.push_bind(trade.ticker.to_uppercase())
                    .push_bind(trade.price)
                    .push_bind(trade.size)
                    .push_bind(trade.exchange)
                    .push_bind(trade.conditions.clone())
                    .push_bind(trade.correction)
                    .push_bind(trade.tape)
                    .push_bind(trade.trf_id)
                    .push_bind(trade.trf_timestamp)
                    .push_bind(trade.participant_timestamp)
                    .push_bind(trade.vendor_trade_id.clone())
                    .push_bind(trade.sequence_number)
                    .push_bind(trade.sip_timestamp)
                    .push_bind(nanos_to_utc(trade.sip_timestamp));
            });
            builder.push(" ON CONFLICT ON CONSTRAINT uq_trades_unique_trade DO NOTHING");

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|source| RepositoryError::Write {
                    table: "trades",
                    source,
                })?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    /// Inserts `quotes`, ignoring any row that collides with
    /// `uq_quotes_unique_quote`.
    pub async fn save_quotes(&self, quotes: &[Quote]) -> Result<u64, RepositoryError> {
        if quotes.is_empty() {
            return Ok(0);
        }
        let mut affected = 0u64;
        for chunk in quotes.chunks(MAX_BATCH_ROWS) {
            let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
                "INSERT INTO quotes (ticker, bid_price, bid_size, bid_exchange, ask_price, \
                 ask_size, ask_exchange, conditions, indicators, participant_timestamp, \
                 sequence_number, tape, sip_timestamp, observed_at) ",
            );
            builder.push_values(chunk, |mut row, quote| {
                row.push_bind(quote.ticker.to_uppercase())
                    .push_bind(quote.bid_price)
                    .push_bind(quote.bid_size)
                    .push_bind(quote.bid_exchange)
                    .push_bind(quote.ask_price)
                    .push_bind(quote.ask_size)
                    .push_bind(quote.ask_exchange)
                    .push_bind(quote.conditions.clone())
                    .push_bind(quote.indicators.clone())
                    .push_bind(quote.participant_timestamp)
                    .push_bind(quote.sequence_number)
                    .push_bind(quote.tape)
                    .push_bind(quote.sip_timestamp)
                    .push_bind(nanos_to_utc(quote.sip_timestamp));
            });
            builder.push(" ON CONFLICT ON CONSTRAINT uq_quotes_unique_quote DO NOTHING");

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|source| RepositoryError::Write {
                    table: "quotes",
                    source,
                })?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }
}

impl RepositorySink for Repository {
    async fn save_trades(&self, trades: &[Trade]) -> Result<u64, RepositoryError> {
        Repository::save_trades(self, trades).await
    }

    async fn save_quotes(&self, quotes: &[Quote]) -> Result<u64, RepositoryError> {
        Repository::save_quotes(self, quotes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanos_to_utc_splits_seconds_and_subsecond_nanos() {
        // 2024-01-02T00:00:00.123456789Z
        let nanos = 1_704_153_600_123_456_789_i64;
        let dt = nanos_to_utc(nanos);
        assert_eq!(dt.timestamp(), 1_704_153_600);
        assert_eq!(dt.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn nanos_to_utc_handles_exact_second() {
        let dt = nanos_to_utc(1_704_153_600_000_000_000);
        assert_eq!(dt.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn trade_mapping_drops_record_missing_sip_timestamp() {
        let raw: RawTrade = serde_json::from_value(serde_json::json!({
            "price": 190.12,
            "size": 10.0,
        }))
        .unwrap();
        assert!(Trade::from_wire("aapl", raw).is_none());
    }

    #[test]
    fn trade_mapping_uppercases_ticker_and_stringifies_id() {
        let raw: RawTrade = serde_json::from_value(serde_json::json!({
            "sip_timestamp": 1_700_000_000_000_000_000i64,
            "price": 190.12,
            "size": 10.0,
            "id": "t1",
        }))
        .unwrap();
        let trade = Trade::from_wire("aapl", raw).unwrap();
        assert_eq!(trade.ticker, "AAPL");
        assert_eq!(trade.vendor_trade_id.as_deref(), Some("t1"));
    }

    #[test]
    fn quote_mapping_drops_record_missing_sip_timestamp() {
        let raw: RawQuote = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(Quote::from_wire("aapl", raw).is_none());
    }

    /// Requires a live Postgres instance reachable via `DATABASE_URL`.
    #[tokio::test]
    #[ignore]
    async fn ensure_schema_creates_tables_and_is_idempotent() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = sqlx::PgPool::connect(&database_url).await.unwrap();
        let repository = Repository::new(pool);

        repository.ensure_schema().await.unwrap();
        // Running it twice must not error: every statement is `IF NOT EXISTS`.
        repository.ensure_schema().await.unwrap();
    }

    /// Requires a live Postgres instance reachable via `DATABASE_URL`, with
    /// the `trades` table already created by [`ensure_schema_creates_tables_and_is_idempotent`].
    #[tokio::test]
    #[ignore]
    async fn save_trades_is_idempotent_against_a_real_constraint() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = sqlx::PgPool::connect(&database_url).await.unwrap();
        let repository = Repository::new(pool);
        repository.ensure_schema().await.unwrap();

        let trade = Trade {
            ticker: "AAPL".to_string(),
            price: 190.12,
            size: 10.0,
            exchange: Some(4),
            conditions: None,
            correction: None,
            tape: Some(1),
            trf_id: None,
            trf_timestamp: None,
            participant_timestamp: None,
            vendor_trade_id: Some("integration-test-trade".to_string()),
            sequence_number: None,
            sip_timestamp: 1_700_000_000_000_000_000,
        };

        let first = repository.save_trades(&[trade.clone()]).await.unwrap();
        let second = repository.save_trades(&[trade]).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }
}
