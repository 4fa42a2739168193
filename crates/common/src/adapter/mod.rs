//! Record source adapter
//!
//! Sits between the graph engine and a [`RecordSource`]:
//! - One process-wide rate limiter paces every outbound call
//! - Transient failures are retried with exponential backoff
//! - Normalized papers are cached by canonical id
//! - Batch lookups degrade to a capped number of single lookups
//!
//! The traversal operations absorb source failures: a failed lookup is
//! logged, metered and reported as "not found" or an empty list. The paged
//! listings ([`SourceAdapter::search`], [`SourceAdapter::citing_page`]) return
//! the error once retries are spent.

use crate::cache::PaperCache;
use crate::config::{SourceConfig, MAX_BATCH_SIZE};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{PageRequest, Paper, PaperId, PaperPage, SearchQuery, SearchResults, DOI_URL_PREFIX};
use crate::source::{RecordSource, WorksPage};
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound on single lookups issued when a batch lookup fails
pub const MAX_FALLBACK_LOOKUPS: usize = 10;

/// Process-wide outbound limiter
pub type SourceRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Create a limiter admitting one call per `delay`
pub fn create_rate_limiter(delay: Option<Duration>) -> Option<Arc<SourceRateLimiter>> {
    let quota = Quota::with_period(delay?)?;
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// Retry settings for outbound calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_interval: Duration::from_millis(config.initial_backoff_ms),
            max_interval: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Paced, retrying, caching front for a record source
pub struct SourceAdapter {
    source: Arc<dyn RecordSource>,
    cache: Arc<PaperCache>,
    limiter: Option<Arc<SourceRateLimiter>>,
    retry: RetryPolicy,
    batch_size: usize,
    fallback_limit: usize,
}

impl SourceAdapter {
    pub fn new(source: Arc<dyn RecordSource>, cache: Arc<PaperCache>, config: &SourceConfig) -> Self {
        Self {
            source,
            cache,
            limiter: create_rate_limiter(config.rate_limit_delay()),
            retry: RetryPolicy::from_config(config),
            batch_size: config.effective_batch_size(),
            fallback_limit: config.fallback_limit.min(MAX_FALLBACK_LOOKUPS),
        }
    }

    pub fn cache(&self) -> &Arc<PaperCache> {
        &self.cache
    }

    /// Resolve one identifier to a paper
    pub async fn fetch_one(&self, identifier: &str) -> Option<Arc<Paper>> {
        match PaperId::parse(identifier) {
            Ok(id) => self.fetch_by_id(&id).await,
            Err(e) => {
                debug!(error = %e, "Skipping lookup of invalid identifier");
                None
            }
        }
    }

    /// Resolve a canonical id to a paper, consulting the cache first
    pub async fn fetch_by_id(&self, id: &PaperId) -> Option<Arc<Paper>> {
        let loaded = self
            .cache
            .get_or_load(id, || async {
                let record = self.call("get_work", || self.source.get_work(id)).await?;
                Ok(record.and_then(|r| self.normalize(&r)))
            })
            .await;

        match loaded {
            Ok(paper) => paper,
            Err(e) => {
                warn!(id = %id, error = %e, "Lookup failed, treating as not found");
                None
            }
        }
    }

    /// Resolve many ids; the result maps each requested id that resolved
    pub async fn fetch_batch(&self, ids: &[PaperId]) -> HashMap<PaperId, Arc<Paper>> {
        let mut found = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.cache.get(id) {
                Some(paper) => {
                    found.insert(id.clone(), paper);
                }
                None => missing.push(id.clone()),
            }
        }

        let mut fallback_budget = self.fallback_limit;
        for chunk in missing.chunks(self.batch_size) {
            match self.call("works_by_ids", || self.source.works_by_ids(chunk)).await {
                Ok(records) => self.match_batch(chunk, &records, &mut found),
                Err(e) => {
                    let attempted = chunk.len().min(fallback_budget);
                    warn!(
                        error = %e,
                        requested = chunk.len(),
                        attempted,
                        "Batch lookup failed, falling back to single lookups"
                    );
                    metrics::record_batch_fallback(chunk.len());

                    for id in &chunk[..attempted] {
                        if let Some(paper) = self.fetch_by_id(id).await {
                            found.insert(id.clone(), paper);
                        }
                    }
                    fallback_budget -= attempted;
                }
            }
        }

        found
    }

    /// Papers citing `id`, most cited first, at most `limit`
    pub async fn fetch_citing_papers(&self, id: &PaperId, limit: usize) -> Vec<Arc<Paper>> {
        if limit == 0 {
            return Vec::new();
        }

        let paging = PageRequest {
            page: 1,
            per_page: limit.min(MAX_BATCH_SIZE),
        };
        match self.call("citing_works", || self.source.citing_works(id, paging)).await {
            Ok(page) => page
                .results
                .iter()
                .take(limit)
                .filter_map(|r| self.normalize_and_cache(r))
                .collect(),
            Err(e) => {
                warn!(id = %id, error = %e, "Citing lookup failed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Outgoing reference ids of `id` in source order
    pub async fn fetch_reference_ids(&self, id: &PaperId) -> Vec<PaperId> {
        self.fetch_by_id(id)
            .await
            .map(|paper| paper.referenced_works.clone())
            .unwrap_or_default()
    }

    /// First `limit` resolvable references of `id`, in source order
    pub async fn fetch_reference_papers(&self, id: &PaperId, limit: usize) -> Vec<Arc<Paper>> {
        let ids: Vec<PaperId> = self.fetch_reference_ids(id).await.into_iter().take(limit).collect();
        let resolved = self.fetch_batch(&ids).await;
        ids.iter().filter_map(|r| resolved.get(r).cloned()).collect()
    }

    /// One page of papers citing `id`, most cited first
    pub async fn citing_page(&self, id: &PaperId, paging: PageRequest) -> Result<PaperPage> {
        let page = self.call("citing_works", || self.source.citing_works(id, paging)).await?;
        Ok(self.paper_page(page, paging))
    }

    /// Full-text search; matching papers are cached as a side effect
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let page = self.call("search_works", || self.source.search_works(query)).await?;
        let results = self.paper_page(page, query.paging);
        info!(
            query = %query.query,
            sort = %query.sort,
            total = results.total_results,
            returned = results.papers.len(),
            "Search complete"
        );

        Ok(SearchResults {
            query: query.query.clone(),
            sort_by: query.sort,
            results,
        })
    }

    fn paper_page(&self, page: WorksPage, paging: PageRequest) -> PaperPage {
        let papers = page
            .results
            .iter()
            .filter_map(|r| self.normalize_and_cache(r))
            .map(|paper| Paper::clone(&paper))
            .collect();

        PaperPage {
            total_results: page.total_count,
            page: paging.page,
            per_page: paging.per_page,
            total_pages: paging.total_pages(page.total_count),
            papers,
            api_response_time_ms: page.response_time_ms,
        }
    }

    fn normalize_and_cache(&self, record: &Value) -> Option<Arc<Paper>> {
        let paper = Arc::new(self.normalize(record)?);
        self.cache.insert(Arc::clone(&paper));
        Some(paper)
    }

    fn normalize(&self, record: &Value) -> Option<Paper> {
        match Paper::from_record(record) {
            Ok(paper) => Some(paper),
            Err(reason) => {
                warn!(source = self.source.name(), reason = %reason, "Rejected malformed record");
                metrics::record_rejected_record(reason.label());
                None
            }
        }
    }

    /// Pair batch results with the ids that asked for them
    fn match_batch(&self, requested: &[PaperId], records: &[Value], found: &mut HashMap<PaperId, Arc<Paper>>) {
        let mut by_key: HashMap<String, Arc<Paper>> = HashMap::with_capacity(records.len() * 2);
        for record in records {
            let Some(paper) = self.normalize(record) else {
                continue;
            };
            let paper = Arc::new(paper);
            if let Some(doi) = &paper.doi {
                by_key.insert(format!("{}{}", DOI_URL_PREFIX, doi).to_lowercase(), Arc::clone(&paper));
            }
            by_key.insert(paper.id.as_str().to_lowercase(), paper);
        }

        for id in requested {
            if let Some(paper) = by_key.get(&id.as_str().to_lowercase()) {
                self.cache.insert_with_alias(id, Arc::clone(paper));
                found.insert(id.clone(), Arc::clone(paper));
            }
        }
    }

    /// Run one outbound operation under the limiter with bounded retries
    async fn call<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.retry.max_attempts;

        retry(self.retry.backoff(), || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let pending = op();
            async move {
                if let Some(limiter) = &self.limiter {
                    limiter.until_ready().await;
                }

                let started = Instant::now();
                let outcome = pending.await;
                let elapsed = started.elapsed().as_secs_f64();

                match outcome {
                    Ok(value) => {
                        metrics::record_source_request(operation, "ok", elapsed);
                        Ok(value)
                    }
                    Err(e) if e.is_transient() && attempt < max_attempts => {
                        metrics::record_source_request(operation, outcome_label(&e), elapsed);
                        metrics::record_retry(operation);
                        warn!(operation, attempt, max_attempts, error = %e, "Retrying source call");
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => {
                        metrics::record_source_request(operation, outcome_label(&e), elapsed);
                        Err(backoff::Error::permanent(e))
                    }
                }
            }
        })
        .await
    }
}

fn outcome_label(error: &AppError) -> &'static str {
    if error.is_rate_limited() {
        "rate_limited"
    } else if error.is_transient() {
        "transient"
    } else {
        "error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchSort;
    use crate::source::InMemorySource;
    use serde_json::json;

    fn fast_config() -> SourceConfig {
        SourceConfig {
            rate_limit_delay_ms: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            ..SourceConfig::default()
        }
    }

    fn adapter(source: Arc<InMemorySource>) -> SourceAdapter {
        SourceAdapter::new(source, Arc::new(PaperCache::new()), &fast_config())
    }

    fn id(s: &str) -> PaperId {
        PaperId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_one_caches() {
        let source = Arc::new(InMemorySource::new().with_work(json!({"id": "W1", "title": "A"})));
        let adapter = adapter(Arc::clone(&source));

        let first = adapter.fetch_one("W1").await.unwrap();
        let second = adapter.fetch_one("https://openalex.org/W1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_one_invalid_and_missing() {
        let source = Arc::new(InMemorySource::new());
        let adapter = adapter(Arc::clone(&source));

        assert!(adapter.fetch_one("   ").await.is_none());
        assert_eq!(source.get_calls(), 0);
        assert!(adapter.fetch_one("W404").await.is_none());
    }

    #[tokio::test]
    async fn test_doi_lookup_aliases_native_id() {
        let source = Arc::new(
            InMemorySource::new().with_work(json!({"id": "W1", "doi": "https://doi.org/10.1/a"})),
        );
        let adapter = adapter(Arc::clone(&source));

        let paper = adapter.fetch_one("10.1/a").await.unwrap();
        assert_eq!(paper.id, id("W1"));
        assert!(adapter.fetch_one("W1").await.is_some());
        assert_eq!(source.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let source = Arc::new(InMemorySource::new().with_work(json!({"id": "W1"})).with_flaky("W1", 2));
        let adapter = adapter(Arc::clone(&source));

        assert!(adapter.fetch_one("W1").await.is_some());
        assert_eq!(source.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let source = Arc::new(InMemorySource::new().with_work(json!({"id": "W1"})).with_flaky("W1", 10));
        let adapter = adapter(Arc::clone(&source));

        assert!(adapter.fetch_one("W1").await.is_none());
        assert_eq!(source.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_malformed_record_rejected() {
        let source = Arc::new(InMemorySource::new().with_raw("W1", json!(["not", "an", "object"])));
        let adapter = adapter(source);

        assert!(adapter.fetch_one("W1").await.is_none());
        assert!(adapter.cache().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_batch_uses_cache_and_chunks() {
        let mut source = InMemorySource::new();
        for n in 1..=5 {
            source = source.with_work(json!({"id": format!("W{n}")}));
        }
        let source = Arc::new(source);
        let config = SourceConfig {
            batch_size: 2,
            ..fast_config()
        };
        let adapter = SourceAdapter::new(source.clone(), Arc::new(PaperCache::new()), &config);

        adapter.fetch_one("W1").await.unwrap();
        let ids: Vec<PaperId> = ["W1", "W2", "W3", "W4", "W5", "W2"].iter().map(|s| id(s)).collect();
        let found = adapter.fetch_batch(&ids).await;

        assert_eq!(found.len(), 5);
        // W2..W5 in chunks of two
        assert_eq!(source.batch_calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_batch_degrades_to_capped_singles() {
        let mut source = InMemorySource::new();
        for n in 1..=15 {
            source = source.with_work(json!({"id": format!("W{n}")}));
        }
        let source = Arc::new(source);
        source.set_rate_limit_batches(true);
        let adapter = adapter(Arc::clone(&source));

        let ids: Vec<PaperId> = (1..=15).map(|n| id(&format!("W{n}"))).collect();
        let found = adapter.fetch_batch(&ids).await;

        assert_eq!(found.len(), MAX_FALLBACK_LOOKUPS);
        assert_eq!(source.get_calls(), MAX_FALLBACK_LOOKUPS);
        assert!(ids[..MAX_FALLBACK_LOOKUPS].iter().all(|i| found.contains_key(i)));
    }

    #[tokio::test]
    async fn test_citing_papers_in_source_order() {
        let source = Arc::new(
            InMemorySource::new()
                .with_work(json!({"id": "W1"}))
                .with_work(json!({"id": "W2", "cited_by_count": 1}))
                .with_work(json!({"id": "W3", "cited_by_count": 9}))
                .with_citations("W1", &["W2", "W3"]),
        );
        let adapter = adapter(source);

        let citing = adapter.fetch_citing_papers(&id("W1"), 5).await;
        let ids: Vec<&str> = citing.iter().map(|p| p.id.native_key()).collect();
        assert_eq!(ids, vec!["W3", "W2"]);
        assert!(adapter.fetch_citing_papers(&id("W1"), 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_reference_papers_skip_unresolvable() {
        let source = Arc::new(
            InMemorySource::new()
                .with_work(json!({
                    "id": "W1",
                    "referenced_works": ["https://openalex.org/W2", "https://openalex.org/W9", "https://openalex.org/W3"]
                }))
                .with_work(json!({"id": "W2"}))
                .with_work(json!({"id": "W3"})),
        );
        let adapter = adapter(source);

        assert_eq!(adapter.fetch_reference_ids(&id("W1")).await.len(), 3);
        let refs = adapter.fetch_reference_papers(&id("W1"), 2).await;
        let ids: Vec<&str> = refs.iter().map(|p| p.id.native_key()).collect();
        assert_eq!(ids, vec!["W2"]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_limiter() {
        let mut source = InMemorySource::new();
        for n in 1..=4 {
            source = source.with_work(json!({"id": format!("W{n}")}));
        }
        let config = SourceConfig {
            rate_limit_delay_ms: 50,
            ..fast_config()
        };
        let adapter = SourceAdapter::new(Arc::new(source), Arc::new(PaperCache::new()), &config);

        let started = Instant::now();
        let (a, b, c, d) = tokio::join!(
            adapter.fetch_one("W1"),
            adapter.fetch_one("W2"),
            adapter.fetch_one("W3"),
            adapter.fetch_one("W4"),
        );
        let elapsed = started.elapsed();

        assert!(a.is_some() && b.is_some() && c.is_some() && d.is_some());
        // First call passes immediately, the other three wait one period each
        assert!(elapsed >= Duration::from_millis(3 * 50 - 5), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_search_normalizes_and_caches() {
        let source = Arc::new(
            InMemorySource::new()
                .with_work(json!({"id": "W1", "title": "Graph neural networks", "cited_by_count": 4}))
                .with_work(json!({"id": "W2", "title": "Graph theory", "cited_by_count": 8}))
                .with_work(json!({"id": "W3", "title": "Graph drawing", "cited_by_count": 1}))
                .with_work(json!({"id": "W4", "title": "Unrelated"})),
        );
        let adapter = adapter(Arc::clone(&source));

        let query = SearchQuery::new("graph", SearchSort::CitedByCount, PageRequest::new(1, 2).unwrap()).unwrap();
        let results = adapter.search(&query).await.unwrap();
        assert_eq!(results.results.total_results, 3);
        assert_eq!(results.results.total_pages, 2);
        let titles: Vec<&str> = results.results.papers.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Graph theory", "Graph neural networks"]);

        // Found papers resolve without another source lookup
        assert!(adapter.fetch_one("W2").await.is_some());
        assert_eq!(source.get_calls(), 0);

        let value = serde_json::to_value(&results).unwrap();
        assert_eq!(value["query"], "graph");
        assert_eq!(value["sort_by"], "cited_by_count");
        assert_eq!(value["papers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_citing_page() {
        let source = Arc::new(
            InMemorySource::new()
                .with_work(json!({"id": "W1"}))
                .with_work(json!({"id": "W2", "cited_by_count": 1}))
                .with_work(json!({"id": "W3", "cited_by_count": 9}))
                .with_work(json!({"id": "W4", "cited_by_count": 5}))
                .with_citations("W1", &["W2", "W3", "W4"]),
        );
        let adapter = adapter(source);

        let page = adapter.citing_page(&id("W1"), PageRequest::new(2, 2).unwrap()).await.unwrap();
        assert_eq!(page.total_results, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.papers.len(), 1);
        assert_eq!(page.papers[0].id, id("W2"));
    }

    #[test]
    fn test_rate_limiter_disabled_without_delay() {
        assert!(create_rate_limiter(None).is_none());
        let limiter = create_rate_limiter(Some(Duration::from_millis(100))).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
