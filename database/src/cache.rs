use feedfilter_core::{Analysis, CoreError, KeyValueStore, ANALYSIS_PREFIX};
use std::sync::Arc;
use tracing::{debug, info};

pub fn cache_key(identifier: &str) -> String {
    format!("{}{}", ANALYSIS_PREFIX, identifier)
}

/// Cache identifier for the quoted post embedded in `identifier`.
pub fn quoted_identifier(identifier: &str) -> String {
    format!("{}_quoted", identifier)
}

/// Classification results keyed by post identifier.
///
/// Entries are written whole and never merged. A missing entry (`None`) is
/// distinct from an empty result, which records an inconclusive
/// classification and is never retried until the cache is cleared.
#[derive(Debug)]
pub struct ResultCache<S> {
    store: Arc<S>,
}

impl<S> Clone for ResultCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> ResultCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get(&self, identifier: &str) -> Result<Option<Analysis>, CoreError> {
        let key = cache_key(identifier);
        let cached = self.store.get_one(&key).await?.map(Analysis::from_value);
        debug!(
            "Cache {} for {}",
            if cached.is_some() { "hit" } else { "miss" },
            key
        );
        Ok(cached)
    }

    pub async fn put(&self, identifier: &str, analysis: &Analysis) -> Result<(), CoreError> {
        self.store
            .set_one(&cache_key(identifier), analysis.to_value())
            .await
    }

    /// Removes every analysis entry and returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize, CoreError> {
        let keys: Vec<String> = self
            .store
            .get_all()
            .await?
            .into_keys()
            .filter(|key| key.starts_with(ANALYSIS_PREFIX))
            .collect();

        if !keys.is_empty() {
            self.store.remove(&keys).await?;
        }
        info!("Cache (analysis results) has been reset: {} entries", keys.len());
        Ok(keys.len())
    }
}
