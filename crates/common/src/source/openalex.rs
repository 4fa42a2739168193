//! OpenAlex works client

use super::{RecordSource, WorksPage};
use crate::config::{SourceConfig, MAX_BATCH_SIZE};
use crate::errors::{AppError, Result};
use crate::models::{PageRequest, PaperId, SearchQuery};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

const SOURCE_NAME: &str = "openalex";

/// Client for the OpenAlex works endpoint
pub struct OpenAlexClient {
    client: Client,
    base_url: String,
    mailto: Option<String>,
}

impl OpenAlexClient {
    /// Create a new OpenAlex client
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("refnet/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            mailto: config.mailto.clone(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.mailto {
            Some(email) => request.query(&[("mailto", email.as_str())]),
            None => request,
        }
    }

    /// Send once and classify the outcome
    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Some(response.json().await?));
        }

        match status {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Err(AppError::RateLimited {
                source_name: SOURCE_NAME.to_string(),
            }),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Upstream {
                    message: format!("API error {}: {}", status, body),
                    transient: status.is_server_error(),
                })
            }
        }
    }

    /// Listing response; a 404 reads as an empty page
    async fn page(&self, request: RequestBuilder) -> Result<WorksPage> {
        let Some(mut body) = self.send(request).await? else {
            return Ok(WorksPage::default());
        };

        let results = match body.get_mut("results").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let meta = body.get("meta");
        let total_count = meta
            .and_then(|m| m.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(results.len() as u64);
        let response_time_ms = meta
            .and_then(|m| m.get("db_response_time_ms"))
            .and_then(Value::as_u64);

        Ok(WorksPage {
            results,
            total_count,
            response_time_ms,
        })
    }

    async fn list(&self, request: RequestBuilder) -> Result<Vec<Value>> {
        Ok(self.page(request).await?.results)
    }

    fn work_path(id: &PaperId) -> String {
        if id.is_doi() {
            format!("/works/doi:{}", id.native_key())
        } else {
            format!("/works/{}", id.native_key())
        }
    }

    fn filter_query(&self, field: &str, keys: &[&str]) -> RequestBuilder {
        let per_page = keys.len().clamp(1, MAX_BATCH_SIZE).to_string();
        self.get("/works").query(&[
            ("filter", format!("{}:{}", field, keys.join("|"))),
            ("per-page", per_page),
        ])
    }
}

#[async_trait]
impl RecordSource for OpenAlexClient {
    async fn get_work(&self, id: &PaperId) -> Result<Option<Value>> {
        debug!(id = %id, "Fetching work");
        self.send(self.get(&Self::work_path(id))).await
    }

    async fn citing_works(&self, id: &PaperId, paging: PageRequest) -> Result<WorksPage> {
        debug!(id = %id, page = paging.page, per_page = paging.per_page, "Fetching citing works");
        let request = self.get("/works").query(&[
            ("filter", format!("cites:{}", id.native_key())),
            ("sort", "cited_by_count:desc".to_string()),
            ("per-page", paging.per_page.clamp(1, MAX_BATCH_SIZE).to_string()),
            ("page", paging.page.max(1).to_string()),
        ]);
        self.page(request).await
    }

    async fn search_works(&self, query: &SearchQuery) -> Result<WorksPage> {
        debug!(query = %query.query, sort = %query.sort, page = query.paging.page, "Searching works");
        let request = self.get("/works").query(&[
            ("search", query.query.clone()),
            ("sort", query.sort.as_param()),
            ("per-page", query.paging.per_page.clamp(1, MAX_BATCH_SIZE).to_string()),
            ("page", query.paging.page.max(1).to_string()),
        ]);
        self.page(request).await
    }

    async fn works_by_ids(&self, ids: &[PaperId]) -> Result<Vec<Value>> {
        let (dois, natives): (Vec<&PaperId>, Vec<&PaperId>) = ids.iter().partition(|id| id.is_doi());
        debug!(natives = natives.len(), dois = dois.len(), "Fetching works batch");

        let mut works = Vec::with_capacity(ids.len());
        if !natives.is_empty() {
            let keys: Vec<&str> = natives.iter().map(|id| id.native_key()).collect();
            works.extend(self.list(self.filter_query("openalex_id", &keys)).await?);
        }
        if !dois.is_empty() {
            let keys: Vec<&str> = dois.iter().map(|id| id.native_key()).collect();
            works.extend(self.list(self.filter_query("doi", &keys)).await?);
        }
        Ok(works)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}
