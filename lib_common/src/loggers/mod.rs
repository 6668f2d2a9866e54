//! # Logging Module
//!
//! Structured logging setup for the pipeline binary, built on `tracing` and
//! `tracing-subscriber`.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `tracing` subscriber reading its filter directives from
/// the `RUST_LOG` environment variable, defaulting to `info` when unset.
///
/// Safe to call once at process startup. Calling it a second time in the
/// same process will return an error from `tracing`'s global dispatcher,
/// which is swallowed here since tests may call this repeatedly.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}