//! Process-wide tracing setup.
//!
//! Library crates only emit `tracing` events; binaries and test harnesses call
//! [`init`] once with the filter and format from their configuration.

pub mod tracing;

pub use self::tracing::{LogFormat, init, init_default};
