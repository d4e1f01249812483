//! Application state construction.

use anyhow::Context;
use perdiem_cache::{FileCache, MemoryCache, RateCache, SqliteCache};
use perdiem_core::{AppConfig, CacheBackend};
use perdiem_scraper::{LookupOrchestrator, ReqwestTransport};
use std::sync::Arc;

/// Everything a command needs, built once per invocation.
pub struct AppState {
    /// Effective configuration after file, environment and flag overrides
    pub config: AppConfig,
    /// Lookup pipeline wired to the configured cache
    pub orchestrator: LookupOrchestrator,
}

impl AppState {
    /// Open the configured cache and wire the lookup pipeline.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let cache = open_cache(&config).await?;
        let transport = Arc::new(
            ReqwestTransport::new(&config.upstream).context("failed to build HTTP transport")?,
        );
        let orchestrator = LookupOrchestrator::from_config(&config, transport, cache)
            .context("invalid upstream configuration")?;

        tracing::info!(
            cache = orchestrator.cache_backend(),
            max_attempts = orchestrator.retry_policy().max_attempts,
            "Lookup pipeline ready"
        );

        Ok(Self {
            config,
            orchestrator,
        })
    }
}

/// Open the cache backend named in `config`.
pub async fn open_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn RateCache>> {
    let path = config
        .resolved_cache_path()
        .context("failed to resolve cache path")?;

    let cache: Arc<dyn RateCache> = match (config.cache.backend, path) {
        (CacheBackend::File, Some(path)) => Arc::new(
            FileCache::open(&path)
                .await
                .with_context(|| format!("failed to open cache file {}", path.display()))?,
        ),
        (CacheBackend::Sqlite, Some(path)) => Arc::new(
            SqliteCache::open(&path)
                .await
                .with_context(|| format!("failed to open cache database {}", path.display()))?,
        ),
        _ => Arc::new(MemoryCache::new()),
    };

    tracing::debug!(backend = cache.backend_name(), "Rate cache opened");
    Ok(cache)
}
