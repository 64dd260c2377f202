mod analysis;
mod config;
mod errors;
mod extraction;
mod models;
mod quality_client;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::cache::{ProfileCache, RedisStore};
use crate::analysis::orchestrator::Orchestrator;
use crate::analysis::retry::TokioSleeper;
use crate::analysis::session::SessionGuards;
use crate::config::Config;
use crate::extraction::remote::RemoteExtractor;
use crate::extraction::SectionExtractor;
use crate::quality_client::{LlmQualityAnalyzer, QualityAnalyzer};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Prolens API v{}", env!("CARGO_PKG_VERSION"));

    // Redis-backed content cache
    let redis = redis::Client::open(config.redis_url.clone())?;
    let cache = ProfileCache::new(Arc::new(RedisStore::new(redis)));
    info!("Redis cache store initialized");

    // Extraction collaborator
    let extractor: Arc<dyn SectionExtractor> =
        Arc::new(RemoteExtractor::new(config.extractor_url.clone()));
    info!("Extractor client initialized ({})", config.extractor_url);

    // Quality collaborator — disabled when no API key is configured
    let quality: Arc<dyn QualityAnalyzer> =
        Arc::new(LlmQualityAnalyzer::new(config.anthropic_api_key.clone()));
    if quality.is_enabled() {
        info!(
            "Quality analyzer initialized (model: {})",
            quality_client::MODEL
        );
    } else {
        info!("Quality analysis disabled (no ANTHROPIC_API_KEY)");
    }

    let orchestrator = Arc::new(Orchestrator::new(
        extractor,
        quality,
        cache.clone(),
        Arc::new(TokioSleeper),
    ));

    let state = AppState {
        cache,
        orchestrator,
        guards: Arc::new(SessionGuards::default()),
        config: config.clone(),
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
