use tracing_subscriber::EnvFilter;

use dharma_rag::api;
use dharma_rag::config::Config;
use dharma_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        "Chat model: {} (rewrite: {}, embedding: {}, rerank: {})",
        config.dashscope.chat_model,
        config.dashscope.rewrite_model,
        config.dashscope.embedding_model,
        config.dashscope.rerank_model
    );
    if config.dashscope.api_key.is_none() {
        tracing::warn!("DASHSCOPE_API_KEY is not set; chat requests will fail");
    }
    match (&config.qdrant.url, &config.qdrant.collection) {
        (Some(url), Some(collection)) => {
            tracing::info!("Qdrant: {url} (collection: {collection})")
        }
        _ => tracing::warn!("QDRANT_URL or QDRANT_COLLECTION is not set; retrieval will fail"),
    }

    let state = AppState::from_config(&config)?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
