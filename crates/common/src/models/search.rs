//! Search and paging requests over the works index

use super::Paper;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest page a single listing may request
pub const MAX_PAGE_SIZE: usize = 50;

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Result ordering for full-text search, always descending
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    #[default]
    CitedByCount,
    RelevanceScore,
    PublicationDate,
}

impl SearchSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSort::CitedByCount => "cited_by_count",
            SearchSort::RelevanceScore => "relevance_score",
            SearchSort::PublicationDate => "publication_date",
        }
    }

    /// Value of the `sort` query parameter
    pub fn as_param(&self) -> String {
        format!("{}:desc", self.as_str())
    }
}

impl fmt::Display for SearchSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchSort {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cited_by_count" => Ok(SearchSort::CitedByCount),
            "relevance_score" => Ok(SearchSort::RelevanceScore),
            "publication_date" => Ok(SearchSort::PublicationDate),
            other => Err(AppError::Validation {
                message: format!(
                    "sort must be one of: cited_by_count, relevance_score, publication_date (got {:?})",
                    other
                ),
                field: Some("sort".to_string()),
            }),
        }
    }
}

/// One-based page of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn new(page: usize, per_page: usize) -> Result<Self> {
        if page < 1 {
            return Err(AppError::Validation {
                message: "page must be a positive integer".to_string(),
                field: Some("page".to_string()),
            });
        }
        if !(1..=MAX_PAGE_SIZE).contains(&per_page) {
            return Err(AppError::Validation {
                message: format!("per_page must be between 1 and {}", MAX_PAGE_SIZE),
                field: Some("per_page".to_string()),
            });
        }
        Ok(Self { page, per_page })
    }

    /// Records to skip before this page
    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }

    pub fn total_pages(&self, total_results: u64) -> u64 {
        total_results.div_ceil(self.per_page as u64)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Validated full-text search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub sort: SearchSort,
    pub paging: PageRequest,
}

impl SearchQuery {
    pub fn new(query: &str, sort: SearchSort, paging: PageRequest) -> Result<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "search query is required".to_string(),
                field: Some("query".to_string()),
            });
        }
        Ok(Self {
            query: query.to_string(),
            sort,
            paging,
        })
    }
}

/// A page of normalized papers with totals
#[derive(Debug, Clone, Serialize)]
pub struct PaperPage {
    pub total_results: u64,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: u64,
    pub papers: Vec<Paper>,
    /// Server-side query time reported by the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_response_time_ms: Option<u64>,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub sort_by: SearchSort,
    #[serde(flatten)]
    pub results: PaperPage,
}
