//! End-to-end scenario tests combining a mock vendor (`wiremock`) with an
//! in-memory repository, so they run without a live Postgres instance.
//! DB-backed tests (schema creation, calendar loading) live in
//! `lib_common`'s own test modules and are marked `#[ignore]` there.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use lib_common::db::{Quote, RepositoryError, RepositorySink, Trade};
use lib_common::markets::{CalendarEntry, CalendarStatus, CalendarStore, MarketClock, MarketPhase};
use lib_common::retrieve::RestClient;
use pipeline::collector::Collector;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory stand-in for [`Repository`], deduplicating by the same key the
/// real schema's unique constraints enforce: `(ticker, sip_timestamp,
/// vendor_trade_id)` for trades, `(ticker, sip_timestamp, sequence_number)`
/// for quotes.
#[derive(Default)]
struct MockRepository {
    trade_keys: Mutex<HashSet<(String, i64, Option<String>)>>,
    quote_keys: Mutex<HashSet<(String, i64, Option<i64>)>>,
    trades: Mutex<Vec<Trade>>,
    quotes: Mutex<Vec<Quote>>,
}

impl MockRepository {
    fn trade_count(&self) -> usize {
        self.trades.lock().unwrap().len()
    }

    #[allow(dead_code)]
    fn quote_count(&self) -> usize {
        self.quotes.lock().unwrap().len()
    }
}

impl RepositorySink for MockRepository {
    async fn save_trades(&self, trades: &[Trade]) -> Result<u64, RepositoryError> {
        let mut keys = self.trade_keys.lock().unwrap();
        let mut store = self.trades.lock().unwrap();
        let mut inserted = 0u64;
        for trade in trades {
            let key = (
                trade.ticker.clone(),
                trade.sip_timestamp,
                trade.vendor_trade_id.clone(),
            );
            if keys.insert(key) {
                store.push(trade.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn save_quotes(&self, quotes: &[Quote]) -> Result<u64, RepositoryError> {
        let mut keys = self.quote_keys.lock().unwrap();
        let mut store = self.quotes.lock().unwrap();
        let mut inserted = 0u64;
        for quote in quotes {
            let key = (quote.ticker.clone(), quote.sip_timestamp, quote.sequence_number);
            if keys.insert(key) {
                store.push(quote.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

fn sample_trade_json(vendor_trade_id: &str) -> serde_json::Value {
    json!({
        "price": 190.12,
        "size": 10.0,
        "id": vendor_trade_id,
        "exchange": 4,
        "conditions": [],
        "correction": null,
        "tape": 1,
        "trf_id": null,
        "trf_timestamp": null,
        "participant_timestamp": null,
        "sequence_number": 1,
        "sip_timestamp": 1_700_000_000_000_000_000i64,
    })
}

fn empty_clock() -> MarketClock {
    MarketClock::new(lib_common::configs::MarketHoursConfig::default())
}

/// S1: one page of one trade, no quotes. Expect 1 trade row, 0 quote rows.
#[tokio::test]
async fn s1_single_page_single_trade() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trades/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [sample_trade_json("t1")],
            "next_url": null,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quotes/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "next_url": null,
        })))
        .mount(&server)
        .await;

    let rest_client = RestClient::new(&server.uri(), "test-key").unwrap();
    let repository = MockRepository::default();
    let collector = Collector::new(
        empty_clock(),
        rest_client,
        repository,
        vec!["AAPL".to_string()],
    );

    let summary = collector.run_cycle().await;
    assert_eq!(summary.tickers_ok, 1);
    assert_eq!(summary.tickers_failed, 0);
    assert_eq!(summary.trades_written, 1);
    assert_eq!(summary.quotes_written, 0);
}

/// S2: the same cycle run twice must not duplicate the trade row.
#[tokio::test]
async fn s2_repeated_cycle_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trades/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [sample_trade_json("t1")],
            "next_url": null,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/quotes/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "next_url": null,
        })))
        .mount(&server)
        .await;

    let rest_client = RestClient::new(&server.uri(), "test-key").unwrap();
    let repository = MockRepository::default();
    let collector = Collector::new(
        empty_clock(),
        rest_client,
        repository,
        vec!["AAPL".to_string()],
    );

    collector.run_cycle().await;
    collector.run_cycle().await;

    assert_eq!(collector.repository().trade_count(), 1);
}

/// S3: 03:00 ET weekday should not run, and the sleep estimate should be
/// roughly the one hour until pre-market open.
#[test]
fn s3_before_pre_market_does_not_run() {
    let clock = empty_clock();
    // Tuesday 2024-01-02, 03:00 ET.
    let instant = chrono_tz::US::Eastern
        .with_ymd_and_hms(2024, 1, 2, 3, 0, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc);

    assert_eq!(clock.phase_at(instant), MarketPhase::Closed);
    assert!(!clock.is_open(instant, true));
    assert!(!clock.in_grace_window(instant));

    let remaining = clock.time_until_next_open(instant);
    assert!(remaining >= chrono::Duration::minutes(59));
    assert!(remaining <= chrono::Duration::minutes(61));
}

/// S4: 20:07 ET weekday is phase-Closed but still inside the grace window.
#[test]
fn s4_grace_window_runs_while_phase_closed() {
    let clock = empty_clock();
    let instant = chrono_tz::US::Eastern
        .with_ymd_and_hms(2024, 1, 2, 20, 7, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc);

    assert_eq!(clock.phase_at(instant), MarketPhase::Closed);
    assert!(clock.in_grace_window(instant));
}

/// S5: first GET 503s, the retried GET returns a page with a `next_url`,
/// and the continuation returns the terminal empty page. Exactly 3 GETs,
/// one record saved.
#[tokio::test]
async fn s5_retries_then_paginates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trades/AAPL"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let continuation_url = format!("{}/trades/AAPL/cursor2", server.uri());
    Mock::given(method("GET"))
        .and(path("/trades/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [sample_trade_json("t1")],
            "next_url": continuation_url,
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/trades/AAPL/cursor2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "next_url": null,
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/quotes/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [],
            "next_url": null,
        })))
        .mount(&server)
        .await;

    let rest_client = RestClient::new(&server.uri(), "test-key").unwrap();
    let repository = MockRepository::default();
    let collector = Collector::new(
        empty_clock(),
        rest_client,
        repository,
        vec!["AAPL".to_string()],
    );

    let summary = collector.run_cycle().await;
    assert_eq!(summary.trades_written, 1);
    assert_eq!(summary.tickers_failed, 0);

    let requests = server.received_requests().await.unwrap();
    let trade_gets = requests
        .iter()
        .filter(|r| r.url.path() == "/trades/AAPL")
        .count();
    assert_eq!(trade_gets, 2);
}

/// S6: a calendar-closed date is Closed all day, never runs, and the next
/// open lands on the following day's pre-open.
#[test]
fn s6_calendar_closed_day() {
    let calendar = CalendarStore::from_entries([CalendarEntry {
        date: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
        status: CalendarStatus::Closed,
        open_time: None,
        close_time: None,
        description: Some("Independence Day".to_string()),
    }]);
    let clock = MarketClock::with_calendar(
        lib_common::configs::MarketHoursConfig::default(),
        calendar,
    );

    let morning = chrono_tz::US::Eastern
        .with_ymd_and_hms(2024, 7, 4, 10, 0, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc);
    let evening = chrono_tz::US::Eastern
        .with_ymd_and_hms(2024, 7, 4, 20, 5, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc);

    assert_eq!(clock.phase_at(morning), MarketPhase::Closed);
    assert_eq!(clock.phase_at(evening), MarketPhase::Closed);
    assert!(!clock.in_grace_window(evening));

    let remaining = clock.time_until_next_open(morning);
    let next_open = (morning + remaining).with_timezone(&chrono_tz::US::Eastern);
    assert_eq!(next_open.date_naive(), NaiveDate::from_ymd_opt(2024, 7, 5).unwrap());
    assert_eq!(next_open.time(), NaiveTime::from_hms_opt(4, 0, 0).unwrap());
}
