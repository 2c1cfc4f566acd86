use super::AppState;
use crate::error::Error;
use crate::query::{SearchFilters, SearchPage, SearchRequest};
use crate::utils::CancelToken;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Query string of `GET /search`
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub repo: Option<String>,
    pub language: Option<String>,
    pub path: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub case: Option<String>,
    pub regex: Option<String>,
}

impl SearchParams {
    pub fn into_request(self) -> Result<SearchRequest, Error> {
        let case_sensitive = parse_flag("case", self.case.as_deref())?;
        let regex = parse_flag("regex", self.regex.as_deref())?;
        Ok(SearchRequest {
            query: self.q.unwrap_or_default(),
            filters: SearchFilters {
                repo: non_empty(self.repo),
                language: non_empty(self.language),
                path: non_empty(self.path),
            },
            limit: self.limit.unwrap_or(0),
            offset: self.offset.unwrap_or(0),
            case_sensitive,
            regex,
        })
    }
}

fn parse_flag(name: &str, value: Option<&str>) -> Result<bool, Error> {
    match value {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(Error::InvalidRequest(format!(
            "{} must be 0 or 1, got {:?}",
            name, other
        ))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Error wrapper for API handlers
pub enum ApiError {
    Search(Error),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Search(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Search(e) => {
                let status = if e.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else if matches!(e, Error::Cancelled) {
                    // Client closed request; nobody is listening
                    StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
                } else {
                    error!(error = %e, "search failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, e.kind(), e.to_string())
            }
            ApiError::Internal(message) => {
                error!(%message, "search task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };

        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchPage>, ApiError> {
    let Query(params) = params.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    let request = params.into_request()?;

    // Cancels the search if this future is dropped (client went away)
    let cancel = CancelToken::new();
    let guard = cancel.drop_guard();
    let searcher = Arc::clone(&state.searcher);

    let page = tokio::task::spawn_blocking(move || searcher.search(&request, &cancel))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    guard.disarm();
    Ok(Json(page))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::index::{FileMeta, IndexConfig, MemoryIndex, NGramStore};
    use crate::server::create_router;
    use crate::service::{SearchService, Searcher};
    use crate::source::MemorySource;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn router() -> axum::Router {
        let index = Arc::new(MemoryIndex::new(IndexConfig::default()));
        let source = Arc::new(MemorySource::new());
        let content = "package main\nfunc main() {\n  fmt.Println(\"hi\")\n}";
        index
            .index_file(&FileMeta::new("acme/api", "main.go"), content.as_bytes())
            .unwrap();
        source.insert("acme/api", "main.go", content);
        let searcher: Arc<dyn Searcher> = Arc::new(SearchService::new(index, source));
        create_router(searcher)
    }

    /// Index whose lookups always fail
    struct BrokenStore(MemoryIndex);

    impl NGramStore for BrokenStore {
        fn ngram_len(&self) -> usize {
            self.0.ngram_len()
        }
        fn index_file(&self, meta: &FileMeta, content: &[u8]) -> crate::Result<()> {
            self.0.index_file(meta, content)
        }
        fn remove_file(&self, repo: &str, path: &str) -> crate::Result<bool> {
            self.0.remove_file(repo, path)
        }
        fn candidates(&self, _grams: &[crate::index::NGram]) -> crate::Result<Vec<FileMeta>> {
            Err(StorageError::Corrupt("postings unreadable".into()).into())
        }
        fn postings(&self, _gram: &[u8]) -> crate::Result<Vec<crate::index::Posting>> {
            Err(StorageError::Corrupt("postings unreadable".into()).into())
        }
        fn files(&self, _repo: Option<&str>) -> crate::Result<Vec<FileMeta>> {
            Err(StorageError::Corrupt("files unreadable".into()).into())
        }
        fn stats(&self) -> crate::Result<crate::index::IndexStats> {
            self.0.stats()
        }
    }

    async fn get(uri: &str) -> (StatusCode, Value) {
        get_from(router(), uri).await
    }

    async fn get_from(router: axum::Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_search_ok() {
        let (status, body) = get("/search?q=func%20main").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalCount"], 1);
        assert_eq!(body["hasMore"], false);
        assert_eq!(body["results"][0]["lineNumber"], 2);
        assert_eq!(body["results"][0]["matchRanges"], json!([[0, 9]]));
    }

    #[tokio::test]
    async fn test_short_query_is_400() {
        let (status, body) = get("/search?q=ab").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "query_too_short");
    }

    #[tokio::test]
    async fn test_invalid_regex_is_400() {
        let (status, body) = get("/search?q=foo(&regex=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_pattern");
    }

    #[tokio::test]
    async fn test_bad_params_are_400() {
        let (status, _) = get("/search?q=main&case=yes").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = get("/search?q=main&limit=ten").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_storage_failure_is_500() {
        let store = BrokenStore(MemoryIndex::new(IndexConfig::default()));
        let searcher: Arc<dyn Searcher> = Arc::new(SearchService::new(store, MemorySource::new()));

        let (status, body) = get_from(create_router(Arc::clone(&searcher)), "/search?q=func%20main").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "storage_error");
        assert!(body.get("results").is_none());

        // Full scans read the file list instead of postings
        let (status, _) = get_from(create_router(searcher), "/search?q=a.*b&regex=1&repo=acme").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
