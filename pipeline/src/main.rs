//! Continuously-running market-data ingestion pipeline.
//!
//! Loads settings and the ticker universe, opens the database pool, and
//! then alternates between collecting (while the market is open) and
//! sleeping (while it's closed) until a shutdown signal arrives. Signal
//! handling is implemented directly on `tokio::signal` since the loop here
//! is a sleep/poll cycle rather than a server accepting live connections.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use lib_common::configs::{Settings, load_tickers_from_file};
use lib_common::db::Database;
use lib_common::db::repository::Repository;
use lib_common::markets::MarketClock;
use lib_common::retrieve::RestClient;
use pipeline::collector::Collector;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Size of the sqlx connection pool. sqlx's `PgPoolOptions` has a single
/// `max_connections` knob, sized here as a steady-state pool of 10 plus
/// headroom of 20 for bursts.
const DB_POOL_SIZE: u32 = 30;

/// Vendor API base URL. Not user-configurable via `Settings`; overridable
/// via `MASSIVE_API_BASE_URL` for testing against a `wiremock` server.
const DEFAULT_API_BASE_URL: &str = "https://api.massive.com/v3";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lib_common::loggers::init_logging();

    let settings = Settings::load()?;
    info!(
        tickers_file = %settings.tickers_file.display(),
        collect_interval_seconds = settings.collect_interval_seconds,
        "loaded settings"
    );

    let tickers = load_tickers_from_file(&settings.tickers_file)?;
    info!(ticker_count = tickers.len(), "loaded ticker universe");

    let database = Database::new(&settings.database_url, DB_POOL_SIZE).await?;
    database.ping().await?;
    let repository = Repository::new(database.pool.clone());
    repository.ensure_schema().await?;

    let clock = MarketClock::new(settings.market_hours);
    clock.preload_calendar(repository.pool()).await;

    let api_base_url =
        std::env::var("MASSIVE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
    let rest_client = RestClient::new(&api_base_url, settings.massive_api_key.clone())?;

    let collector = Collector::new(clock, rest_client, repository, tickers);

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    run(&collector, &shutdown, Duration::from_secs(settings.collect_interval_seconds)).await;

    info!("pipeline shut down cleanly");
    Ok(())
}

/// The main sleep/run loop: collect while the market is open, otherwise
/// sleep until the next open (or until shutdown is requested, whichever
/// comes first).
async fn run<R: lib_common::db::RepositorySink>(
    collector: &Collector<R>,
    shutdown: &CancellationToken,
    interval: Duration,
) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        if collector.should_run() {
            collector.run_cycle().await;
            if sleep_or_shutdown(shutdown, interval).await {
                break;
            }
        } else {
            let now = chrono::Utc::now();
            let until_open = collector.clock().time_until_next_open(now);
            let one_hour = Duration::from_secs(3600);
            let sleep_for = if until_open.to_std().map(|d| d > one_hour).unwrap_or(true) {
                // Re-check in an hour rather than sleeping all the way to
                // open, so a late calendar update (e.g. an unscheduled
                // closure) is noticed before it matters.
                one_hour
            } else {
                until_open
                    .to_std()
                    .unwrap_or(Duration::from_secs(1))
                    .max(Duration::from_secs(1))
            };
            info!(sleep_seconds = sleep_for.as_secs(), "market closed, sleeping");
            if sleep_or_shutdown(shutdown, sleep_for).await {
                break;
            }
        }
    }
}

/// Sleeps for `duration` unless `shutdown` fires first. Returns `true` if
/// shutdown was requested during the sleep.
async fn sleep_or_shutdown(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.cancelled() => true,
    }
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(err) => {
                error!(error = %err, "failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        shutdown.cancel();
    });
}
