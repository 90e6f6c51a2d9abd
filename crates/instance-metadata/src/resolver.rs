//! Metadata resolution with fallback and process-wide caching
//!
//! Sources are tried in order until one succeeds. The first success is
//! stored in a [`MetadataCache`] and returned to every later caller
//! without touching any source again. Instance metadata does not change
//! for the lifetime of the instance, so the cache is never refreshed.

use crate::config::MetadataConfig;
use crate::error::{RetrievalError, SourceFailure};
use crate::models::ResolvedMetadata;
use crate::observability::RetrievalMetrics;
use crate::source::{ConfigDriveSource, MetadataServiceSource, MetadataSource};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Process-wide cache instance
static GLOBAL_CACHE: OnceLock<Arc<MetadataCache>> = OnceLock::new();

/// Resolver used by [`get_metadata`]
static GLOBAL_RESOLVER: OnceLock<MetadataResolver> = OnceLock::new();

/// Holds at most one resolved value
///
/// Readers never wait on an in-flight retrieval; fills are serialized
/// through a separate async lock.
pub struct MetadataCache {
    value: RwLock<Option<Arc<ResolvedMetadata>>>,
    fill_lock: Mutex<()>,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
            fill_lock: Mutex::new(()),
        }
    }

    /// The cache shared by the whole process
    pub fn global() -> Arc<MetadataCache> {
        GLOBAL_CACHE
            .get_or_init(|| Arc::new(MetadataCache::new()))
            .clone()
    }

    pub fn get(&self) -> Option<Arc<ResolvedMetadata>> {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_populated(&self) -> bool {
        self.get().is_some()
    }

    fn store(&self, resolved: Arc<ResolvedMetadata>) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = Some(resolved);
    }

    /// Drop the cached value so the next resolution queries sources again
    pub fn reset_for_testing(&self) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Tries an ordered list of sources and caches the first success
pub struct MetadataResolver {
    sources: Vec<Arc<dyn MetadataSource>>,
    cache: Arc<MetadataCache>,
    metrics: RetrievalMetrics,
}

impl MetadataResolver {
    pub fn new(sources: Vec<Arc<dyn MetadataSource>>, cache: Arc<MetadataCache>) -> Self {
        Self {
            sources,
            cache,
            metrics: RetrievalMetrics::new(),
        }
    }

    /// Config drive first, then the metadata service
    pub fn from_config(config: &MetadataConfig, cache: Arc<MetadataCache>) -> Self {
        let sources: Vec<Arc<dyn MetadataSource>> = vec![
            Arc::new(ConfigDriveSource::from_config(config)),
            Arc::new(MetadataServiceSource::new()),
        ];
        Self::new(sources, cache)
    }

    /// The resolver behind [`get_metadata`], configured from the environment
    pub fn global() -> &'static MetadataResolver {
        GLOBAL_RESOLVER.get_or_init(|| {
            MetadataResolver::from_config(
                &MetadataConfig::load_or_default(),
                MetadataCache::global(),
            )
        })
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Names of the configured sources, in the order they are tried
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Return the cached metadata, retrieving it first if necessary.
    ///
    /// On failure nothing is cached and the next call starts over with
    /// the first source.
    pub async fn resolve(&self) -> Result<Arc<ResolvedMetadata>, RetrievalError> {
        if let Some(cached) = self.cache.get() {
            return Ok(cached);
        }

        let _fill = self.cache.fill_lock.lock().await;

        // Another caller may have filled the cache while we waited
        if let Some(cached) = self.cache.get() {
            return Ok(cached);
        }

        if self.sources.is_empty() {
            return Err(RetrievalError::NoSources);
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            let started = Instant::now();
            let result = source.attempt().await;
            let elapsed = started.elapsed().as_secs_f64();
            self.metrics
                .record_attempt(source.name(), result.is_ok(), elapsed);

            match result {
                Ok(resolved) => {
                    let resolved = Arc::new(resolved);
                    self.cache.store(resolved.clone());
                    self.metrics.set_cache_populated(true);
                    info!(
                        source = source.name(),
                        instance_id = %resolved.instance.id,
                        has_network = resolved.network.is_some(),
                        "Instance metadata cached"
                    );
                    return Ok(resolved);
                }
                Err(error) => {
                    warn!(source = source.name(), error = %error, "Metadata source failed");
                    failures.push(SourceFailure {
                        source: source.name(),
                        error,
                    });
                }
            }
        }

        Err(RetrievalError::AllSourcesFailed { failures })
    }
}

/// Instance metadata for this process, from the config drive or the
/// metadata service
pub async fn get_metadata() -> Result<Arc<ResolvedMetadata>, RetrievalError> {
    MetadataResolver::global().resolve().await
}

/// Clear the process-wide cache
pub fn reset_for_testing() {
    MetadataCache::global().reset_for_testing();
    RetrievalMetrics::new().set_cache_populated(false);
}
