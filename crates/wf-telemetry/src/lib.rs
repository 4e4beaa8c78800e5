//! Logging and span helpers shared by the wayfinder crates.
//!
//! - **Logging**: human-readable and JSON output via `tracing-subscriber`
//! - **Tracing**: trace/span ID generation so every task view carries a
//!   correlation id through its log lines

pub mod logging;
pub mod tracing_setup;
