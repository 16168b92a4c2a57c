//! Tracing subscriber initialization: pretty/compact/json console formats,
//! selectable via [`LoggingConfig`], with an optional raw `EnvFilter`
//! directive string overriding the configured level.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, ObservabilityConfig};

/// Held for the process lifetime; dropping it is harmless, it exists so
/// `main` has a named value to keep alive rather than a bare `()`.
pub struct TracingGuard;

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("invalid tracing filter directive: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Initializes the global `tracing` subscriber from `config.logging`.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<TracingGuard, TracingError> {
    let logging = &config.logging;

    let filter = match &logging.filter {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_new(format!("guardrail_gate={}", logging.level.to_tracing_level()))
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let registry = tracing_subscriber::registry().with(filter);

    match logging.format {
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
                .init();
        }
        LogFormat::Compact => {
            registry
                .with(tracing_subscriber::fmt::layer().compact().with_target(true))
                .init();
        }
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_target(true))
                .init();
        }
    }

    Ok(TracingGuard)
}
