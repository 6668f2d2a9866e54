//! Paginating, retrying HTTP client for the vendor trade/quote API.
//!
//! The retry loop is hand-rolled rather than routed through
//! `reqwest-middleware`/`reqwest-retry` so that tests can assert an exact
//! attempt count against a `wiremock` server without also pinning the
//! middleware's internal timing.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Maximum number of attempts (including the first) made for a single
/// logical request before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Lower bound of the exponential backoff between attempts.
const BACKOFF_FLOOR: Duration = Duration::from_secs(1);

/// Upper bound of the exponential backoff between attempts.
const BACKOFF_CEILING: Duration = Duration::from_secs(10);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors surfaced by [`RestClient`].
#[derive(Debug, Error)]
pub enum RestError {
    /// The base URL given to [`RestClient::new`] could not be parsed.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// A `next_url` returned by the vendor could not be parsed.
    #[error("invalid pagination URL: {0}")]
    InvalidNextUrl(#[source] url::ParseError),

    /// The response body could not be deserialized into the expected shape.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] reqwest::Error),

    /// All {MAX_ATTEMPTS} attempts for a request failed.
    #[error("request to {url} failed after {attempts} attempts: {reason}")]
    Exhausted {
        /// The URL that was being requested.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        reason: String,
    },
}

/// One page of a paginated vendor response.
#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
    next_url: Option<String>,
}

/// REST client for the vendor trade/quote API.
///
/// Authenticates via an `apiKey` query parameter and sends
/// `Accept: application/json` on every request.
pub struct RestClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl RestClient {
    /// Builds a client against `base_url`, authenticating with `api_key`.
    ///
    /// `base_url` may carry a path prefix (e.g. a version segment like
    /// `/v3`); it is normalized to end in `/` so that per-call paths join
    /// onto it additively rather than replacing it, matching the vendor's
    /// own HTTP client convention of treating `base_url` as a sticky prefix.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, RestError> {
        let mut base_url = Url::parse(base_url).map_err(RestError::InvalidBaseUrl)?;
        if !base_url.path().ends_with('/') {
            let path_with_slash = format!("{}/", base_url.path());
            base_url.set_path(&path_with_slash);
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client configuration is valid");
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// Fetches trades for `ticker` starting at `path`, following `next_url`
    /// until the vendor stops returning one or `cap` records have been
    /// collected. A page fetch never overshoots `cap` by more than one
    /// page's worth of records; the caller re-checks the exact count against
    /// its own per-ticker bound.
    pub async fn list_trades<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cap: Option<usize>,
    ) -> Result<Vec<T>, RestError> {
        self.paginate(path, query, cap).await
    }

    /// Fetches quotes for `ticker` starting at `path`. See
    /// [`RestClient::list_trades`] for the pagination/cap contract.
    pub async fn list_quotes<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cap: Option<usize>,
    ) -> Result<Vec<T>, RestError> {
        self.paginate(path, query, cap).await
    }

    /// Consumes pages until the sequence ends, an empty page with no
    /// `next_url` is seen, or `cap` (if given) is reached — at which point
    /// no further page is requested, so a caller-side cap bounds the number
    /// of GETs issued for one ticker in one cycle, not just the records
    /// returned.
    async fn paginate<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        cap: Option<usize>,
    ) -> Result<Vec<T>, RestError> {
        let mut url = self.request_url(path, query)?;
        let mut collected = Vec::new();

        loop {
            let page: Page<T> = self.get_with_retry(url.clone()).await?;
            collected.extend(page.results);

            if let Some(cap) = cap {
                if collected.len() >= cap {
                    break;
                }
            }

            match page.next_url {
                Some(next) => {
                    url = self.next_page_url(&next)?;
                }
                None => break,
            }
        }

        Ok(collected)
    }

    fn request_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, RestError> {
        let relative = path.trim_start_matches('/');
        let mut url = self
            .base_url
            .join(relative)
            .map_err(RestError::InvalidBaseUrl)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("apiKey", &self.api_key);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn next_page_url(&self, next_url: &str) -> Result<Url, RestError> {
        let mut url = Url::parse(next_url).map_err(RestError::InvalidNextUrl)?;
        if !url.query_pairs().any(|(k, _)| k == "apiKey") {
            url.query_pairs_mut().append_pair("apiKey", &self.api_key);
        }
        Ok(url)
    }

    /// Issues a single GET with up to [`MAX_ATTEMPTS`] tries, retrying on
    /// transport errors, timeouts, and any HTTP status `>= 400`, with
    /// exponential backoff bounded by [`BACKOFF_FLOOR`] and
    /// [`BACKOFF_CEILING`].
    async fn get_with_retry<T: DeserializeOwned>(&self, url: Url) -> Result<T, RestError> {
        let mut last_reason = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .http
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    return response.json::<T>().await.map_err(RestError::Decode);
                }
                Ok(response) => {
                    last_reason = format!("HTTP {}", response.status());
                    if !Self::should_retry_status(response.status()) {
                        return Err(RestError::Exhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            reason: last_reason,
                        });
                    }
                }
                Err(err) => {
                    last_reason = err.to_string();
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(Self::backoff_for(attempt)).await;
            }
        }

        Err(RestError::Exhausted {
            url: url.to_string(),
            attempts: MAX_ATTEMPTS,
            reason: last_reason,
        })
    }

    fn should_retry_status(status: StatusCode) -> bool {
        status.as_u16() >= 400
    }

    fn backoff_for(attempt: u32) -> Duration {
        let scaled = BACKOFF_FLOOR.saturating_mul(1 << (attempt - 1));
        scaled.min(BACKOFF_CEILING)
    }
}
