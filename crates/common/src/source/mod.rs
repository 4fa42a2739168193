//! Record source abstraction
//!
//! Provides a unified interface over bibliographic record sources:
//! - OpenAlex (HTTP, JSON work records)
//! - In-memory fixtures (tests, offline runs)
//!
//! Listings (citing works, full-text search) come back one page at a time
//! together with the total the source reports.
//!
//! Implementations perform exactly one attempt per call and classify their
//! failures; pacing, retries and caching belong to the adapter.

mod memory;
mod openalex;

pub use memory::InMemorySource;
pub use openalex::OpenAlexClient;

use crate::config::SourceConfig;
use crate::errors::Result;
use crate::models::{PageRequest, PaperId, SearchQuery};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One page of raw work records
#[derive(Debug, Clone, Default)]
pub struct WorksPage {
    pub results: Vec<Value>,
    /// Matches across all pages
    pub total_count: u64,
    pub response_time_ms: Option<u64>,
}

/// Trait for raw work lookups
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Look up one work; `Ok(None)` when the source has no such record
    async fn get_work(&self, id: &PaperId) -> Result<Option<Value>>;

    /// Works citing `id`, sorted by descending citation count server-side
    async fn citing_works(&self, id: &PaperId, paging: PageRequest) -> Result<WorksPage>;

    /// Full-text search over titles and abstracts
    async fn search_works(&self, query: &SearchQuery) -> Result<WorksPage>;

    /// Works matching any of `ids` in a single filtered query
    async fn works_by_ids(&self, ids: &[PaperId]) -> Result<Vec<Value>>;

    /// Source name used in logs and errors
    fn name(&self) -> &str;
}

/// Create a record source based on configuration
pub fn create_source(config: &SourceConfig) -> Result<Arc<dyn RecordSource>> {
    if config.base_url == "memory" {
        tracing::warn!("Using empty in-memory record source");
        return Ok(Arc::new(InMemorySource::new()));
    }
    Ok(Arc::new(OpenAlexClient::new(config)?))
}
