//! Library surface for the `pipeline` binary, split out so integration
//! tests can drive `Collector` against a mock vendor and an in-memory
//! repository without a live Postgres instance.

pub mod collector;
pub mod error;
