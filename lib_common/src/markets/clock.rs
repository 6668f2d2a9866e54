//! Calendar-aware classification of an instant into a trading-day phase.
//!
//! All arithmetic is done in US/Eastern via `chrono_tz`, with calendar
//! overrides (holidays, early closes) layered on top of the regular
//! weekday schedule.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::sync::RwLock;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use chrono_tz::US::Eastern;
use sqlx::PgPool;

use super::calendar::{CalendarLoadError, CalendarStatus, CalendarStore};
use crate::configs::MarketHoursConfig;

/// Length of the post-close grace window during which `shouldRun`-style
/// callers should still poll even though [`MarketClock::phase_at`] reports
/// [`MarketPhase::Closed`]. Captures late-reported trades posted just after
/// nominal after-hours close. Weekday-only, and only on days without a
/// calendar-closed override.
pub const GRACE_WINDOW: Duration = Duration::minutes(15);

/// The phase of the trading day an instant falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPhase {
    /// Outside every session window: weekend, a calendar holiday, or
    /// outside `[preOpen, afClose)` (or, on an early-close day, outside the
    /// overridden regular session).
    Closed,
    /// `[preOpen, preClose)`.
    PreMarket,
    /// `[regOpen, regClose)`, or the overridden session on an early-close day.
    Regular,
    /// `[afOpen, afClose)`. Never reached on an early-close day.
    AfterHours,
}

impl MarketPhase {
    /// True for every phase except [`MarketPhase::Closed`].
    pub fn is_open(self) -> bool {
        !matches!(self, MarketPhase::Closed)
    }
}

/// Calendar-aware market-hours clock.
///
/// Holds the configured [`MarketHoursConfig`] and an in-memory
/// [`CalendarStore`] behind a `RwLock` so that [`MarketClock::preload_calendar`]
/// can refresh it without requiring `&mut self` at every call site (the
/// clock is shared across the collector's per-ticker loop).
pub struct MarketClock {
    hours: MarketHoursConfig,
    calendar: RwLock<CalendarStore>,
}

impl MarketClock {
    /// Builds a clock with the given hours and an empty calendar. Call
    /// [`MarketClock::preload_calendar`] once a database pool is available.
    pub fn new(hours: MarketHoursConfig) -> Self {
        Self {
            hours,
            calendar: RwLock::new(CalendarStore::empty()),
        }
    }

    /// Builds a clock with a pre-populated calendar, bypassing the database.
    /// Intended for tests that need calendar overrides without a live pool.
    pub fn with_calendar(hours: MarketHoursConfig, calendar: CalendarStore) -> Self {
        Self {
            hours,
            calendar: RwLock::new(calendar),
        }
    }

    /// Reloads the calendar from `market_calendar`.
    ///
    /// A failure here is logged and otherwise ignored: the clock keeps
    /// whatever calendar it already had (or an empty one on first call),
    /// so the pipeline degrades to treating every day as a regular trading
    /// day rather than stalling startup.
    pub async fn preload_calendar(&self, pool: &PgPool) {
        match CalendarStore::load_all(pool).await {
            Ok(store) => {
                let count = store.len();
                *self.calendar.write().expect("calendar lock poisoned") = store;
                tracing::info!(entries = count, "loaded market calendar");
            }
            Err(CalendarLoadError(source)) => {
                tracing::warn!(error = %source, "failed to load market calendar, continuing with no special days");
            }
        }
    }

    /// Classifies `instant` (any timezone; converted to US/Eastern
    /// internally) into a [`MarketPhase`].
    ///
    /// Four disjoint intervals whose union (on a regular weekday with no
    /// calendar override) is exactly `[preOpen, afClose)`; everything else
    /// is `Closed`.
    pub fn phase_at(&self, instant: DateTime<Utc>) -> MarketPhase {
        let local = instant.with_timezone(&Eastern);
        let date = local.date_naive();
        let time = local.time();

        let calendar = self.calendar.read().expect("calendar lock poisoned");
        if let Some(entry) = calendar.get(date) {
            match entry.status {
                CalendarStatus::Closed => return MarketPhase::Closed,
                CalendarStatus::Open => {
                    // No-op per design: falls through to the regular rules below.
                }
                CalendarStatus::EarlyClose => {
                    if let Some(close_time) = entry.close_time {
                        return if self.hours.pre_open <= time && time < self.hours.reg_open {
                            MarketPhase::PreMarket
                        } else if self.hours.reg_open <= time && time < close_time {
                            MarketPhase::Regular
                        } else {
                            MarketPhase::Closed
                        };
                    }
                    // Open Question resolution: an early_close row with no
                    // close_time falls through to the regular schedule.
                }
            }
        }
        drop(calendar);

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return MarketPhase::Closed;
        }

        self.phase_under_regular_schedule(time)
    }

    /// `isOpen(includeExtended)`: when `include_extended` is false, only
    /// the `Regular` phase counts as open; when true, `PreMarket` and
    /// `AfterHours` count too. Does not consider the post-close grace
    /// window — see [`MarketClock::in_grace_window`] for that.
    pub fn is_open(&self, instant: DateTime<Utc>, include_extended: bool) -> bool {
        match self.phase_at(instant) {
            MarketPhase::Regular => true,
            MarketPhase::PreMarket | MarketPhase::AfterHours => include_extended,
            MarketPhase::Closed => false,
        }
    }

    /// True when `instant` falls in the 15-minute window after `afClose` on
    /// a weekday that is not calendar-closed, regardless of what
    /// [`MarketClock::phase_at`] reports for that instant.
    pub fn in_grace_window(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&Eastern);
        let date = local.date_naive();
        let time = local.time();

        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let calendar = self.calendar.read().expect("calendar lock poisoned");
        if let Some(entry) = calendar.get(date) {
            if matches!(entry.status, CalendarStatus::Closed) {
                return false;
            }
        }
        drop(calendar);

        let grace_end = self.hours.af_close + GRACE_WINDOW;
        self.hours.af_close <= time && time < grace_end
    }

    /// Duration from `instant` until the next regular-session open.
    ///
    /// Advances day by day past weekends and calendar days with
    /// `status = closed`; an early-close day still counts as open for this
    /// purpose (it has a `preOpen`, it just ends early).
    pub fn time_until_next_open(&self, instant: DateTime<Utc>) -> Duration {
        let local = instant.with_timezone(&Eastern);
        let mut date = local.date_naive();
        loop {
            let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
            let is_calendar_closed = {
                let calendar = self.calendar.read().expect("calendar lock poisoned");
                matches!(
                    calendar.get(date).map(|e| e.status),
                    Some(CalendarStatus::Closed)
                )
            };
            let candidate_open = Eastern
                .from_local_datetime(&date.and_time(self.hours.pre_open))
                .single()
                .expect("unambiguous local datetime");
            if !is_weekend && !is_calendar_closed && local <= candidate_open {
                return candidate_open.with_timezone(&Utc) - instant;
            }
            date = date.succ_opt().expect("date in representable range");
        }
    }

    fn phase_under_regular_schedule(&self, time: chrono::NaiveTime) -> MarketPhase {
        let h = &self.hours;
        if time < h.pre_open {
            MarketPhase::Closed
        } else if time < h.pre_close {
            MarketPhase::PreMarket
        } else if time < h.reg_close {
            MarketPhase::Regular
        } else if time < h.af_close {
            MarketPhase::AfterHours
        } else {
            MarketPhase::Closed
        }
    }
}
