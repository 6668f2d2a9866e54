//! # Markets Module
//!
//! Calendar-aware market-hours arithmetic: classifying an instant into a
//! trading-day phase, finding the next open, and loading calendar overrides
//! (holidays, early closes) from the database.
//!
//! All wall-clock arithmetic is pinned to US/Eastern via `chrono_tz`.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

mod calendar;
mod clock;

pub use calendar::{CalendarEntry, CalendarStatus, CalendarStore};
pub use clock::{MarketClock, MarketPhase};