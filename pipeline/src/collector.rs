//! Per-cycle fan-out across the ticker universe.
//!
//! For every ticker in the universe, pull the trades and quotes pages from
//! the vendor and write them through the repository, sequentially and
//! within a single logical worker.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use lib_common::db::repository::{RawQuote, RawTrade};
use lib_common::db::{Quote, RepositorySink, Trade};
use lib_common::markets::MarketClock;
use lib_common::retrieve::RestClient;
use tracing::{info, warn};

use crate::error::PipelineError;

/// Hard cap on the number of records fetched per ticker per cycle, guarding
/// against a vendor pagination bug turning one slow ticker into an
/// unbounded fetch. Passed to [`RestClient::list_trades`]/`list_quotes` as
/// the pagination cap, so the fetch stops requesting further pages (not
/// just further records) once it is reached.
const MAX_RECORDS_PER_TICKER: usize = 2000;

/// Runs one fetch-and-write cycle across the configured ticker universe.
///
/// Generic over the repository sink so that end-to-end tests can supply an
/// in-memory fake instead of a live Postgres-backed `Repository`.
pub struct Collector<R: RepositorySink> {
    clock: MarketClock,
    rest_client: RestClient,
    repository: R,
    tickers: Vec<String>,
}

/// Outcome of a single cycle, used for logging.
#[derive(Debug, Default)]
pub struct CycleSummary {
    /// Number of tickers successfully collected.
    pub tickers_ok: usize,
    /// Number of tickers whose collection failed.
    pub tickers_failed: usize,
    /// Total trade rows written (post conflict-ignore) across the cycle.
    pub trades_written: u64,
    /// Total quote rows written (post conflict-ignore) across the cycle.
    pub quotes_written: u64,
}

impl<R: RepositorySink> Collector<R> {
    /// Builds a collector over the given ticker universe.
    pub fn new(clock: MarketClock, rest_client: RestClient, repository: R, tickers: Vec<String>) -> Self {
        Self {
            clock,
            rest_client,
            repository,
            tickers,
        }
    }

    /// True when the pipeline should poll this cycle: the market is open
    /// (including pre-market/after-hours), or we are inside the post-close
    /// grace window.
    pub fn should_run(&self) -> bool {
        let now = chrono::Utc::now();
        self.clock.is_open(now, true) || self.clock.in_grace_window(now)
    }

    /// Returns a reference to the underlying clock, e.g. so the driver can
    /// compute a sleep duration until the next open.
    pub fn clock(&self) -> &MarketClock {
        &self.clock
    }

    /// Returns a reference to the underlying repository sink, primarily for
    /// tests that need to inspect what was written.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Runs one cycle: for every ticker, sequentially fetch and persist its
    /// trades and quotes. A single ticker's failure is logged and does not
    /// abort the rest of the cycle.
    pub async fn run_cycle(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for ticker in &self.tickers {
            match self.collect_ticker(ticker).await {
                Ok((trades_written, quotes_written)) => {
                    summary.tickers_ok += 1;
                    summary.trades_written += trades_written;
                    summary.quotes_written += quotes_written;
                }
                Err(err) => {
                    summary.tickers_failed += 1;
                    warn!(ticker = %ticker, error = %err, "failed to collect ticker");
                }
            }
        }

        info!(
            tickers_ok = summary.tickers_ok,
            tickers_failed = summary.tickers_failed,
            trades_written = summary.trades_written,
            quotes_written = summary.quotes_written,
            "cycle complete"
        );
        summary
    }

    /// Fetches and writes trades and quotes for a single ticker.
    ///
    /// Both fetches are for `today`, `limit=1000`, `order="desc"` (newest
    /// first, so the 2000-record cap keeps the most recent ticks rather
    /// than the oldest), and each is written in its own save call once its
    /// page sequence ends.
    pub async fn collect_ticker(&self, ticker: &str) -> Result<(u64, u64), PipelineError> {
        let today = chrono::Utc::now()
            .with_timezone(&chrono_tz::US::Eastern)
            .date_naive();
        let query = [
            ("timestamp", today.format("%Y-%m-%d").to_string()),
            ("limit", "1000".to_string()),
            ("sort", "timestamp".to_string()),
            ("order", "desc".to_string()),
        ];
        let query: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let trade_path = format!("/trades/{ticker}");
        let raw_trades: Vec<RawTrade> = self
            .rest_client
            .list_trades(&trade_path, &query, Some(MAX_RECORDS_PER_TICKER))
            .await?;
        let trades: Vec<Trade> = raw_trades
            .into_iter()
            .filter_map(|raw| Trade::from_wire(ticker, raw))
            .collect();

        let quote_path = format!("/quotes/{ticker}");
        let raw_quotes: Vec<RawQuote> = self
            .rest_client
            .list_quotes(&quote_path, &query, Some(MAX_RECORDS_PER_TICKER))
            .await?;
        let quotes: Vec<Quote> = raw_quotes
            .into_iter()
            .filter_map(|raw| Quote::from_wire(ticker, raw))
            .collect();

        let trades_written = self.repository.save_trades(&trades).await?;
        let quotes_written = self.repository.save_quotes(&quotes).await?;

        Ok((trades_written, quotes_written))
    }
}
