//! # textsink-observability
//!
//! Structured logging for textsink binaries.
//!
//! The core crate only emits `tracing` events; this crate installs the
//! subscriber that turns them into human-readable or JSON log lines on
//! stderr, so stdout stays free for rendered output.

pub mod tracing_setup;

pub use tracing_setup::{build_directives, init_tracing, LogConfig};
