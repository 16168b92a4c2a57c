//! Guardrail orchestration service: sits between an API gateway and a
//! model-inference backend, running configurable pre/post pipelines of
//! safety checkers around every request (see `SPEC_FULL.md`).

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

mod audit;
mod budget;
mod checkers;
mod config;
mod error;
mod middleware;
mod observability;
mod orchestrator;
mod proxy;
mod ratelimit;
mod routes;

use budget::BudgetManager;
use checkers::{CheckerRegistry, UseCase};
use config::{Config, policy::PolicyConfig};
use observability::{init_tracing, metrics::init_metrics};
use orchestrator::Orchestrator;
use ratelimit::RateLimiter;

/// Process configuration, registry, and live policy snapshot shared by every
/// route handler and middleware layer. Cheap to clone: everything behind an
/// `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<CheckerRegistry>,
    policy: Arc<parking_lot::RwLock<Arc<PolicyConfig>>>,
    pub budget: Arc<BudgetManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub orchestrator: Arc<Orchestrator>,
    pub http_client: reqwest::Client,
    pub in_flight: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    /// Clones the current policy `Arc` under a brief read lock.
    pub fn policy(&self) -> Arc<PolicyConfig> {
        self.policy.read().clone()
    }

    /// Atomically swaps in a new policy snapshot (§4.1 hot reload).
    pub fn set_policy(&self, policy: Arc<PolicyConfig>) {
        *self.policy.write() = policy;
    }
}

#[derive(Parser, Debug)]
#[command(name = "guardrail-gate", version, about = "Guardrail orchestration service")]
struct Cli {
    /// Path to the process YAML config file.
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Path to the initial policy document, overriding `policy_path` in the
    /// process config.
    #[arg(long, env = "POLICY_PATH")]
    policy_path: Option<String>,

    /// HTTP bind port, overriding `server.port`.
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// If set, serve `/metrics` on a second listener bound to this port
    /// instead of on the main HTTP port.
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Upstream model-inference endpoint, overriding `upstream_url`.
    #[arg(long, env = "UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// In-flight request ceiling, overriding `max_in_flight`.
    #[arg(long, env = "MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Use case assumed when a request omits `use_case`, overriding
    /// `default_use_case` (one of: chat, rag, code_gen, batch).
    #[arg(long, env = "DEFAULT_USE_CASE")]
    default_use_case: Option<String>,
}

/// Boxed error used by `main`: every source error here (`ConfigError`,
/// `std::io::Error`, `serde_yaml::Error`, `PolicyError`, `reqwest::Error`)
/// already implements `std::error::Error + Send + Sync`, so `?` converts via
/// the blanket `From` impl without a dedicated enum.
type MainError = Box<dyn std::error::Error + Send + Sync>;

fn parse_use_case(s: &str) -> Result<UseCase, MainError> {
    match s {
        "chat" => Ok(UseCase::Chat),
        "rag" => Ok(UseCase::Rag),
        "code_gen" | "codegen" => Ok(UseCase::CodeGen),
        "batch" => Ok(UseCase::Batch),
        other => Err(format!("unrecognized use case '{other}'").into()),
    }
}

fn load_config(cli: &Cli) -> Result<Config, MainError> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(policy_path) = &cli.policy_path {
        config.policy_path = Some(policy_path.clone());
    }
    if let Some(port) = cli.http_port {
        config.server.port = port;
    }
    if let Some(url) = &cli.upstream_url {
        config.upstream_url = url.clone();
    }
    if let Some(max_in_flight) = cli.max_in_flight {
        config.max_in_flight = max_in_flight;
    }
    if let Some(use_case) = &cli.default_use_case {
        config.default_use_case = parse_use_case(use_case)?;
    }

    Ok(config)
}

fn load_policy(config: &Config, registry: &CheckerRegistry) -> Result<PolicyConfig, MainError> {
    let policy = match &config.policy_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        }
        None => PolicyConfig::default_policy(),
    };

    policy
        .validate(registry)
        .map_err(|e| format!("initial policy document is invalid: {e}"))?;

    Ok(policy)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/status", get(routes::status))
        .route("/metrics", get(routes::metrics_handler))
        .route(
            "/policy",
            get(routes::get_policy).put(routes::put_policy).post(routes::put_policy),
        )
        .route("/check/request", post(routes::check_request))
        .route("/check/response", post(routes::check_response))
        .route("/predict", post(routes::predict))
        .route("/rate-limit/stats/{identity}", get(routes::rate_limit_stats))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::client_ip_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(state.config.server.body_limit_bytes))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::backpressure_middleware,
        ))
        .layer(optional_cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn optional_cors_layer(state: &AppState) -> tower::layer::util::Either<tower_http::cors::CorsLayer, tower::layer::util::Identity> {
    match state.config.server.cors.clone().into_layer() {
        Some(layer) => tower::layer::util::Either::Left(layer),
        None => tower::layer::util::Either::Right(tower::layer::util::Identity::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let _tracing_guard = init_tracing(&config.observability)?;
    init_metrics(&config.observability.metrics)?;

    let registry = Arc::new(CheckerRegistry::new());
    let policy = load_policy(&config, &registry)?;
    let policy = Arc::new(policy);

    let http_client = config.server.http_client.build_client()?;
    let max_in_flight = config.max_in_flight;

    let state = AppState {
        config: Arc::new(config),
        registry,
        budget: Arc::new(BudgetManager::new(policy.clone())),
        policy: Arc::new(parking_lot::RwLock::new(policy)),
        rate_limiter: Arc::new(RateLimiter::new()),
        orchestrator: Arc::new(Orchestrator::new()),
        http_client,
        in_flight: Arc::new(tokio::sync::Semaphore::new(max_in_flight)),
    };

    let addr = SocketAddr::from((state.config.server.host, state.config.server.port));
    let metrics_addr = cli
        .metrics_port
        .filter(|port| *port != state.config.server.port)
        .map(|port| SocketAddr::from((state.config.server.host, port)));

    if let Some(metrics_addr) = metrics_addr {
        let metrics_router = Router::new().route("/metrics", get(routes::metrics_handler));
        let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
        tracing::info!(addr = %metrics_addr, "metrics listener bound on a separate port");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(metrics_listener, metrics_router).await {
                tracing::error!(%err, "metrics listener exited");
            }
        });
    }

    let app = build_router(state);

    tracing::info!(%addr, "guardrail-gate listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for SIGTERM (containers) or Ctrl+C (interactive), whichever comes
/// first, so in-flight requests get to finish before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received, draining in-flight requests");
}
