use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::{ChatAgent, Gemini, Perplexity};
use autodidact_api::{router, AppState};
use autodidact_common::Config;
use autodidact_resources::{
    LinkBlacklist, LlmDiscoverer, LlmSynthesizer, MemoryStore, PgStore, ResourceCache,
    ResourcePipeline,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("autodidact=info".parse()?))
        .init();

    let config = Config::from_env()?;

    let (cache, blacklist): (Arc<dyn ResourceCache>, Arc<dyn LinkBlacklist>) =
        match config.database_url.as_deref() {
            Some(url) => {
                let store = Arc::new(PgStore::connect(url, config.max_alternatives).await?);
                (store.clone(), store)
            }
            None => {
                warn!("DATABASE_URL not set, cache and blacklist are in-memory only");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    // Search-grounded Perplexity first; Gemini as the fallback backend.
    let mut agents: Vec<Arc<dyn ChatAgent>> = Vec::new();
    if let Some(key) = config.perplexity_api_key.as_deref() {
        agents.push(Arc::new(Perplexity::new(key, &config.perplexity_model)));
    }
    if let Some(key) = config.gemini_api_key.as_deref() {
        agents.push(Arc::new(Gemini::new(key, &config.gemini_model)));
    }

    let mut pipeline = ResourcePipeline::from_config(&config, cache, blacklist);
    for agent in &agents {
        info!(provider = agent.provider(), "Discovery backend enabled");
        pipeline = pipeline.with_discoverer(Arc::new(LlmDiscoverer::new(agent.clone())));
    }
    if let Some(writer) = agents.last() {
        pipeline = pipeline.with_synthesizer(Arc::new(LlmSynthesizer::new(writer.clone())));
    }

    let app = router(Arc::new(AppState { pipeline }));

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("Autodidact API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
