//! Observability infrastructure.
//!
//! Provides:
//! - Structured tracing via `tracing-subscriber`
//! - OpenTelemetry metrics for store operations, optionally exported over OTLP

pub mod metrics;
pub mod tracing;
