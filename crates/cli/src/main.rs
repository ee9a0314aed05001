//! Activity ingest daemon.
//!
//! This binary is the composition root for the workspace. Responsibilities:
//!
//! 1. **Load configuration** from the environment and refuse to start on an
//!    unparseable value.
//! 2. **Wire observability**: `tracing-subscriber` with an `EnvFilter`, a
//!    pretty or JSON formatter, and an OpenTelemetry OTLP exporter when
//!    `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! 3. **Construct infrastructure**: the in-memory store (seeded from
//!    `INGEST_AGENTS_FILE`), the per-agent rate limiter and the system clock,
//!    injected into [`ingest::IngestService`].
//! 4. **Serve** on `INGEST_BIND_ADDR` until SIGINT or SIGTERM.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ingest::{
    Clock, FixedWindowRateLimiter, IngestConfig, IngestService, RateLimitConfig, SystemClock,
};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use store::InMemoryStore;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const ENV_BIND_ADDR: &str = "INGEST_BIND_ADDR";
const ENV_AGENTS_FILE: &str = "INGEST_AGENTS_FILE";
const ENV_LOG_FORMAT: &str = "INGEST_LOG_FORMAT";
const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let provider = init_tracing()?;

    let result = run().await;
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "ingestd exited with an error");
    }

    if let Some(provider) = provider {
        if let Err(err) = provider.shutdown() {
            eprintln!("failed to flush traces: {err}");
        }
    }
    result
}

async fn run() -> anyhow::Result<()> {
    let config = IngestConfig::from_env().context("invalid ingest configuration")?;
    tracing::info!(
        ingest_enabled = config.ingest_enabled,
        require_signature = config.require_signature,
        rate_limit_per_minute = config.rate_limit_per_minute,
        global_signing_secret = config.global_signing_secret.is_some(),
        "configuration loaded"
    );
    if !config.ingest_enabled {
        tracing::warn!("ingest is disabled; every request will be answered with 503");
    }

    let store = InMemoryStore::new();
    match std::env::var(ENV_AGENTS_FILE) {
        Ok(path) => {
            let loaded = store::load_agents_file(&store, Path::new(&path))
                .with_context(|| format!("failed to seed agents from {path}"))?;
            tracing::info!(loaded, path = %path, "agents seeded");
        },
        Err(_) => tracing::warn!("{ENV_AGENTS_FILE} not set; no agent can authenticate"),
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter = Arc::new(FixedWindowRateLimiter::new(
        RateLimitConfig {
            max_requests: config.rate_limit_per_minute,
            window: config.rate_window,
            ..RateLimitConfig::default()
        },
        Arc::clone(&clock),
    ));
    let service = IngestService::new(
        config,
        Arc::new(store.clone()),
        Arc::new(store),
        limiter,
        clock,
    );

    let addr = std::env::var(ENV_BIND_ADDR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_owned());
    let socket = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    listener::serve(socket, service, shutdown_signal())
        .await
        .context("ingest server failure")
}

/// Installs the global subscriber. Returns the OTLP provider when one was
/// configured so `main` can flush it on exit.
fn init_tracing() -> anyhow::Result<Option<TracerProvider>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let provider = match std::env::var(ENV_OTLP_ENDPOINT) {
        Ok(endpoint) if !endpoint.is_empty() => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .context("failed to build OTLP span exporter")?;
            let provider = TracerProvider::builder()
                .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                .build();
            opentelemetry::global::set_tracer_provider(provider.clone());
            Some(provider)
        },
        _ => None,
    };
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("ingestd")));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_current_span(true)))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .with(otel)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(provider)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
