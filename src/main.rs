use std::sync::Arc;

use tastemap_api::{
    cache::TtlCache,
    config::Config,
    routes::{create_router, AppState},
    services::{
        providers::{llm::LlmClient, qloo::QlooClient},
        Collaborators, RecommendationService,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let qloo = Arc::new(QlooClient::new(
        config.qloo_api_key.clone(),
        config.qloo_api_url.clone(),
        config.upstream_timeout(),
    )?);
    let llm = Arc::new(LlmClient::new(
        config.llm_api_key.clone(),
        config.llm_api_url.clone(),
        config.llm_model.clone(),
        config.upstream_timeout(),
    )?);

    let cache = TtlCache::new();
    let sweeper = cache.start_sweeper(config.cache_sweep_interval());

    let service = RecommendationService::new(
        Collaborators {
            extractor: llm.clone(),
            search_index: qloo.clone(),
            insights_engine: qloo,
            explainer: llm,
        },
        cache,
        config.engine_settings(),
    );
    let app = create_router(AppState::new(service));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, model = %config.llm_model, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
