//! Calendar overrides: holidays, early closes, and explicitly-open days.
//!
//! Entries are loaded once from Postgres via `sqlx::PgPool` and cached
//! in memory for the life of the process.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use thiserror::Error;

/// A single day's calendar status, as stored in `market_calendar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarStatus {
    /// Trading day proceeds under the normal `PhaseSchedule`. Per the
    /// design notes, an explicit `open` row is a no-op: it exists only so
    /// that an operator can record "yes, we checked this day" without
    /// changing behavior.
    Open,
    /// Market does not open at all on this date.
    Closed,
    /// Market opens normally but the regular session ends early, per
    /// `open_time`/`close_time`.
    EarlyClose,
}

/// One row of the `market_calendar` table.
#[derive(Debug, Clone)]
pub struct CalendarEntry {
    /// Calendar date (naive; the pipeline always interprets this in
    /// US/Eastern local time).
    pub date: NaiveDate,
    /// The day's status.
    pub status: CalendarStatus,
    /// Override open time, used only for `EarlyClose` rows that specify one.
    pub open_time: Option<NaiveTime>,
    /// Override close time, used only for `EarlyClose` rows that specify one.
    pub close_time: Option<NaiveTime>,
    /// Free-text description (e.g. "Independence Day", "Day before Thanksgiving").
    pub description: Option<String>,
}

/// Error loading calendar rows from the database.
#[derive(Debug, Error)]
#[error("failed to load market calendar: {0}")]
pub struct CalendarLoadError(#[source] pub sqlx::Error);

/// Read-only accessor over the `market_calendar` table, cached in memory.
///
/// `MarketClock` holds one of these and reloads it via
/// [`CalendarStore::load_all`]; a load failure is non-fatal (see
/// `MarketClock::preload_calendar`) and simply leaves the calendar with no
/// special days, meaning every day falls through to the regular
/// `PhaseSchedule`.
#[derive(Debug, Default, Clone)]
pub struct CalendarStore {
    entries: HashMap<NaiveDate, CalendarEntry>,
}

impl CalendarStore {
    /// An empty calendar: every date is treated as a regular trading day.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a calendar from explicit entries, without touching the
    /// database. Useful for tests and for any caller that already has the
    /// calendar data in hand.
    pub fn from_entries(entries: impl IntoIterator<Item = CalendarEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.date, e)).collect(),
        }
    }

    /// Loads every row of `market_calendar` into memory.
    pub async fn load_all(pool: &PgPool) -> Result<Self, CalendarLoadError> {
        let rows = sqlx::query_as::<_, CalendarRow>(
            "SELECT date, status, open_time, close_time, description FROM market_calendar",
        )
        .fetch_all(pool)
        .await
        .map_err(CalendarLoadError)?;

        let entries = rows
            .into_iter()
            .filter_map(|row| row.into_entry())
            .map(|entry| (entry.date, entry))
            .collect();

        Ok(Self { entries })
    }

    /// Looks up the override for `date`, if any.
    pub fn get(&self, date: NaiveDate) -> Option<&CalendarEntry> {
        self.entries.get(&date)
    }

    /// Number of loaded calendar entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no calendar overrides are loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(sqlx::FromRow)]
struct CalendarRow {
    date: NaiveDate,
    status: String,
    open_time: Option<NaiveTime>,
    close_time: Option<NaiveTime>,
    description: Option<String>,
}

impl CalendarRow {
    fn into_entry(self) -> Option<CalendarEntry> {
        let status = match self.status.as_str() {
            "open" => CalendarStatus::Open,
            "closed" => CalendarStatus::Closed,
            "early_close" => CalendarStatus::EarlyClose,
            // Unrecognized status values are dropped rather than making the
            // whole load fail; a single bad row shouldn't blind the clock
            // to every other calendar entry.
            _ => return None,
        };
        Some(CalendarEntry {
            date: self.date,
            status,
            open_time: self.open_time,
            close_time: self.close_time,
            description: self.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_calendar_has_no_entries() {
        let store = CalendarStore::empty();
        assert!(store.is_empty());
        assert!(store.get(NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()).is_none());
    }

    /// Requires a live Postgres instance reachable via `DATABASE_URL`, with
    /// a `market_calendar` table already created (e.g. via
    /// `Repository::ensure_schema`).
    #[tokio::test]
    #[ignore]
    async fn load_all_reads_rows_from_market_calendar() {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&database_url).await.unwrap();

        sqlx::query(
            "INSERT INTO market_calendar (date, status, description) \
             VALUES ($1, 'closed', 'integration test holiday') \
             ON CONFLICT (date) DO NOTHING",
        )
        .bind(NaiveDate::from_ymd_opt(2099, 1, 1).unwrap())
        .execute(&pool)
        .await
        .unwrap();

        let store = CalendarStore::load_all(&pool).await.unwrap();
        let entry = store
            .get(NaiveDate::from_ymd_opt(2099, 1, 1).unwrap())
            .expect("inserted row should be loaded");
        assert!(matches!(entry.status, CalendarStatus::Closed));
    }
}
