//! Common configuration and telemetry shared across Eventide crates.
//!
//! - **Configuration**: Strongly typed application configuration (`config`).
//! - **Telemetry**: Tracing subscriber setup (`telemetry`).

pub mod config;
pub mod telemetry;
