//! In-process paper cache
//!
//! Provides:
//! - Concurrent get/insert keyed by canonical identifier
//! - Alias insertion (requested id and native id point at one paper)
//! - Get-or-load with a fallible async loader
//!
//! The cache is shared by `Arc` between the record source adapter and the
//! graph engine and only shrinks through [`PaperCache::clear`].

use crate::errors::Result;
use crate::metrics;
use crate::models::{Paper, PaperId};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

const CACHE_NAME: &str = "papers";

/// Concurrent identifier -> paper store
#[derive(Debug, Default)]
pub struct PaperCache {
    entries: DashMap<PaperId, Arc<Paper>>,
}

impl PaperCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a paper from cache
    pub fn get(&self, key: &PaperId) -> Option<Arc<Paper>> {
        let hit = self.entries.get(key).map(|entry| Arc::clone(entry.value()));
        metrics::record_cache(hit.is_some(), CACHE_NAME);
        if hit.is_some() {
            debug!(key = %key, "Cache hit");
        } else {
            debug!(key = %key, "Cache miss");
        }
        hit
    }

    /// Peek without touching hit/miss counters
    pub fn contains(&self, key: &PaperId) -> bool {
        self.entries.contains_key(key)
    }

    /// Store a paper under its own id
    pub fn insert(&self, paper: Arc<Paper>) {
        debug!(key = %paper.id, "Cache set");
        self.entries.insert(paper.id.clone(), paper);
    }

    /// Store a paper under its own id and under the id it was requested by
    pub fn insert_with_alias(&self, requested: &PaperId, paper: Arc<Paper>) {
        if requested != &paper.id {
            debug!(alias = %requested, key = %paper.id, "Cache alias set");
            self.entries.insert(requested.clone(), Arc::clone(&paper));
        }
        self.insert(paper);
    }

    /// Get or populate with a loader; loader misses are not cached
    pub async fn get_or_load<F, Fut>(&self, key: &PaperId, loader: F) -> Result<Option<Arc<Paper>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Paper>>>,
    {
        if let Some(cached) = self.get(key) {
            return Ok(Some(cached));
        }

        match loader().await? {
            Some(paper) => {
                let paper = Arc::new(paper);
                self.insert_with_alias(key, Arc::clone(&paper));
                Ok(Some(paper))
            }
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, returning how many keys were held
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count, "Cache cleared");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paper(id: &str) -> Paper {
        Paper::from_record(&json!({"id": id, "title": "t"})).unwrap()
    }

    #[test]
    fn test_alias_points_to_same_paper() {
        let cache = PaperCache::new();
        let doi = PaperId::parse("10.1000/x").unwrap();
        cache.insert_with_alias(&doi, Arc::new(paper("W1")));

        let via_doi = cache.get(&doi).unwrap();
        let via_native = cache.get(&PaperId::parse("W1").unwrap()).unwrap();
        assert!(Arc::ptr_eq(&via_doi, &via_native));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear_reports_count() {
        let cache = PaperCache::new();
        cache.insert(Arc::new(paper("W1")));
        cache.insert(Arc::new(paper("W2")));
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_or_load_propagates_loader_error() {
        let cache = PaperCache::new();
        let key = PaperId::parse("W4").unwrap();

        let result = tokio_test::block_on(cache.get_or_load(&key, || async {
            Err(crate::errors::AppError::Upstream {
                message: "down".to_string(),
                transient: true,
            })
        }));
        assert!(result.unwrap_err().is_transient());
        assert!(!cache.contains(&key));
    }

    #[tokio::test]
    async fn test_get_or_load_caches_hits_only() {
        let cache = PaperCache::new();
        let key = PaperId::parse("W3").unwrap();

        let missing = cache.get_or_load(&key, || async { Ok(None) }).await.unwrap();
        assert!(missing.is_none());
        assert!(!cache.contains(&key));

        let loaded = cache
            .get_or_load(&key, || async { Ok(Some(paper("W3"))) })
            .await
            .unwrap();
        assert_eq!(loaded.unwrap().id, key);

        // Second call must not invoke the loader
        let cached = cache
            .get_or_load(&key, || async { Ok(Some(paper("W999"))) })
            .await
            .unwrap();
        assert_eq!(cached.unwrap().id, key);
    }
}
