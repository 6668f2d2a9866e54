//! # Data Retrieval Module
//!
//! A paginating, retrying REST client for the vendor trade/quote API.
//!
//! ## Contained Modules:
//!
//! - **`rest_client`**: Wraps `reqwest::Client` with query-string API-key
//!   authentication, an explicit retry loop, and cursor-based pagination
//!   over the vendor's `next_url` convention.

#![doc(html_logo_url = "https://example.com/logo.png")] // Placeholder
#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// REST client with retry and pagination support for the vendor API.
pub mod rest_client;

pub use rest_client::{RestClient, RestError};
