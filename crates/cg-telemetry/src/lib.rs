//! Observability for the chatgate services.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: counters, gauges and histograms with Prometheus export
//! - **Middleware**: per-request metrics and `X-Request-Id` correlation

pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod tracing_setup;
