//! Query engine: validation and planning, candidate narrowing, line
//! verification, ranking and pagination.

pub mod executor;
pub mod matcher;
pub mod planner;

pub use executor::QueryEngine;
pub use matcher::LineMatcher;
pub use planner::QueryPlan;

use crate::index::types::FileMeta;
use serde::{Deserialize, Serialize};

/// Default minimum query length in bytes
pub const DEFAULT_MIN_QUERY_LEN: usize = 3;

/// Optional constraints applied to candidates before any content is read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Exact repository id
    pub repo: Option<String>,
    /// Exact language tag (ASCII case-insensitive)
    pub language: Option<String>,
    /// Substring of the repo-relative path
    pub path: Option<String>,
}

impl SearchFilters {
    pub fn matches(&self, meta: &FileMeta) -> bool {
        if let Some(repo) = &self.repo {
            if &meta.repo != repo {
                return false;
            }
        }
        if let Some(language) = &self.language {
            match &meta.language {
                Some(lang) if lang.eq_ignore_ascii_case(language) => {}
                _ => return false,
            }
        }
        if let Some(path) = &self.path {
            if !meta.path.contains(path.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A search query plus its options
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    /// Page size; 0 selects the engine default
    pub limit: usize,
    pub offset: usize,
    pub case_sensitive: bool,
    /// Treat `query` as a regular expression
    pub regex: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn regex(mut self, yes: bool) -> Self {
        self.regex = yes;
        self
    }
}

/// One matching line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub repo: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub line: String,
    /// 1-based
    pub line_number: u32,
    /// Half-open byte ranges within the line
    pub match_ranges: Vec<[usize; 2]>,
}

/// One page of ranked results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<SearchMatch>,
    /// Number of matches before pagination
    pub total_count: usize,
    pub has_more: bool,
}

/// Engine-wide query limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    pub min_query_len: usize,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            min_query_len: DEFAULT_MIN_QUERY_LEN,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

impl QueryOptions {
    /// Resolve a requested page size against the defaults
    pub fn effective_limit(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_limit.min(self.max_limit)
        } else {
            requested.min(self.max_limit)
        }
    }
}
