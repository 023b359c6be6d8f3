#![allow(dead_code)]
mod error;
mod model;
mod observability;
mod pipeline;
mod prompt;
mod rate_limiters;
mod request_tracing;
mod routes;
mod server_config;
mod state;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};

use axum::extract::FromRef;
use mimalloc::MiMalloc;
use observability::RunTracker;
use pipeline::PipelineOptions;
use prompt::MistralClient;
use rate_limiters::RateLimiters;
use routes::AppRouter;
use server_config::ServerConfig;
use state::{AnalysisStore, KeyPool};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
pub struct ServerState {
    categorizer: Arc<MistralClient>,
    key_pool: KeyPool,
    rate_limiters: RateLimiters,
    analysis_store: AnalysisStore,
    run_tracker: RunTracker,
    pipeline_options: PipelineOptions,
    shutdown: CancellationToken,
}

impl ServerState {
    fn new(cfg: &ServerConfig, http_client: HttpClient) -> Self {
        let categorizer = MistralClient::new(
            http_client,
            cfg.api.endpoint.clone(),
            cfg.model.clone(),
            cfg.categories.clone(),
        );

        Self {
            categorizer: Arc::new(categorizer),
            key_pool: KeyPool::new(cfg.api.keys.clone()),
            rate_limiters: RateLimiters::from_config(&cfg.api.prompt_limits),
            analysis_store: AnalysisStore::new(),
            run_tracker: RunTracker::new(),
            pipeline_options: PipelineOptions::from_config(cfg),
            shutdown: CancellationToken::new(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let cfg = ServerConfig::load()?;
    println!("{}", cfg);

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(cfg.api.request_timeout())
        .build()?;

    let state = ServerState::new(&cfg, http_client);
    if state.key_pool.is_empty() {
        tracing::warn!("No API keys configured, set LLM_API_KEYS or PUT /api/keys");
    }

    let router = AppRouter::create(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("Paperclerk server running on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    tracing::info!("Server shut down, exiting");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. Cancelling `shutdown` makes running
/// pipelines fail their remaining batches instead of submitting them.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling running categorizations");
    shutdown.cancel();
}
