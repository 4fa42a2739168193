//! In-memory record source for tests and offline runs

use super::{RecordSource, WorksPage};
use crate::errors::{AppError, Result};
use crate::models::{PageRequest, PaperId, SearchQuery, SearchSort, DOI_URL_PREFIX};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const SOURCE_NAME: &str = "memory";

/// Fixture-backed record source
///
/// Records are registered under their own id and, when they carry one, their
/// DOI. Citing lists are served in descending `cited_by_count` order the way
/// the live service sorts them. Search matches the query against titles,
/// case-insensitively.
#[derive(Default)]
pub struct InMemorySource {
    works: HashMap<PaperId, Value>,
    citing: HashMap<PaperId, Vec<PaperId>>,
    /// Remaining transient failures per id
    flaky: Mutex<HashMap<PaperId, u32>>,
    rate_limit_batches: AtomicBool,
    /// Delay applied to every call
    latency: Option<Duration>,
    get_calls: AtomicUsize,
    citing_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a work record; records without a usable id are ignored
    pub fn with_work(mut self, record: Value) -> Self {
        let Some(id) = record
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| PaperId::parse(s).ok())
        else {
            return self;
        };

        if let Some(doi) = record.get("doi").and_then(Value::as_str) {
            let doi = doi.strip_prefix(DOI_URL_PREFIX).unwrap_or(doi);
            if let Ok(alias) = PaperId::parse(doi) {
                self.works.insert(alias, record.clone());
            }
        }
        self.works.insert(id, record);
        self
    }

    /// Register a record under an explicit id, whatever its shape
    pub fn with_raw(mut self, id: &str, record: Value) -> Self {
        if let Ok(id) = PaperId::parse(id) {
            self.works.insert(id, record);
        }
        self
    }

    /// Declare that each of `citing` cites `cited`
    pub fn with_citations(mut self, cited: &str, citing: &[&str]) -> Self {
        if let Ok(cited) = PaperId::parse(cited) {
            let list = self.citing.entry(cited).or_default();
            list.extend(citing.iter().filter_map(|s| PaperId::parse(s).ok()));
        }
        self
    }

    /// Fail the next `failures` lookups of `id` with a transient error
    pub fn with_flaky(self, id: &str, failures: u32) -> Self {
        if let Ok(id) = PaperId::parse(id) {
            if let Ok(mut flaky) = self.flaky.lock() {
                flaky.insert(id, failures);
            }
        }
        self
    }

    /// Sleep for `latency` before answering any call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer every batch lookup with a rate-limit failure
    pub fn set_rate_limit_batches(&self, enabled: bool) {
        self.rate_limit_batches.store(enabled, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn citing_calls(&self) -> usize {
        self.citing_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, id: &PaperId) -> Result<()> {
        let Ok(mut flaky) = self.flaky.lock() else {
            return Ok(());
        };
        match flaky.get_mut(id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(AppError::Upstream {
                    message: format!("simulated outage for {}", id),
                    transient: true,
                })
            }
            _ => Ok(()),
        }
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn cited_by_count(record: &Value) -> u64 {
        record.get("cited_by_count").and_then(Value::as_u64).unwrap_or(0)
    }

    fn paginate(works: Vec<Value>, paging: PageRequest) -> WorksPage {
        let total_count = works.len() as u64;
        let results = works.into_iter().skip(paging.offset()).take(paging.per_page).collect();
        WorksPage {
            results,
            total_count,
            response_time_ms: None,
        }
    }
}

fn title_matches(record: &Value, needle: &str) -> bool {
    record
        .get("title")
        .and_then(Value::as_str)
        .is_some_and(|title| title.to_lowercase().contains(needle))
}

fn str_field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl RecordSource for InMemorySource {
    async fn get_work(&self, id: &PaperId) -> Result<Option<Value>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.take_failure(id)?;
        Ok(self.works.get(id).cloned())
    }

    async fn citing_works(&self, id: &PaperId, paging: PageRequest) -> Result<WorksPage> {
        self.citing_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;

        let mut works: Vec<Value> = self
            .citing
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.works.get(c).cloned()).collect())
            .unwrap_or_default();
        works.sort_by_key(|w| Reverse(Self::cited_by_count(w)));
        Ok(Self::paginate(works, paging))
    }

    async fn search_works(&self, query: &SearchQuery) -> Result<WorksPage> {
        self.delay().await;
        let needle = query.query.to_lowercase();

        // DOI aliases repeat records already held under their native id
        let mut works: Vec<&Value> = self
            .works
            .iter()
            .filter(|(id, record)| !id.is_doi() && title_matches(record, &needle))
            .map(|(_, record)| record)
            .collect();
        works.sort_by(|a, b| str_field(a, "id").cmp(str_field(b, "id")));
        match query.sort {
            SearchSort::CitedByCount => works.sort_by_key(|w| Reverse(Self::cited_by_count(w))),
            SearchSort::PublicationDate => works.sort_by(|a, b| {
                str_field(b, "publication_date").cmp(str_field(a, "publication_date"))
            }),
            SearchSort::RelevanceScore => works.sort_by(|a, b| {
                let score = |w: &Value| w.get("relevance_score").and_then(Value::as_f64).unwrap_or(0.0);
                score(*b).total_cmp(&score(*a))
            }),
        }

        Ok(Self::paginate(works.into_iter().cloned().collect(), query.paging))
    }

    async fn works_by_ids(&self, ids: &[PaperId]) -> Result<Vec<Value>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.rate_limit_batches.load(Ordering::SeqCst) {
            return Err(AppError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
            });
        }
        Ok(ids.iter().filter_map(|id| self.works.get(id).cloned()).collect())
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
