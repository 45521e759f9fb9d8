//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via `tracing`
//! - OpenTelemetry metrics for store operations

pub mod metrics;
pub mod tracing;
