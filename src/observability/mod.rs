//! Observability: structured logging via `tracing`/`tracing-subscriber` and
//! Prometheus metrics via the `metrics` facade (§4.8, SPEC_FULL ambient stack).

pub mod metrics;
mod tracing_init;

pub use tracing_init::{TracingError, TracingGuard, init_tracing};
