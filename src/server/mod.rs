//! HTTP query endpoint.
//!
//! A thin adapter: parameters are decoded into a [`SearchRequest`] and
//! handed to a [`Searcher`] on the blocking pool.
//!
//! [`SearchRequest`]: crate::query::SearchRequest

mod handlers;

pub use handlers::{ApiError, SearchParams};

use crate::service::Searcher;
use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// State shared by all handlers
pub struct AppState {
    pub searcher: Arc<dyn Searcher>,
}

pub fn create_router(searcher: Arc<dyn Searcher>) -> Router {
    let state = Arc::new(AppState { searcher });

    Router::new()
        .route("/search", get(handlers::search))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve(
    addr: SocketAddr,
    searcher: Arc<dyn Searcher>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "search endpoint listening");
    axum::serve(listener, create_router(searcher))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves when `signal` fires. If the signal listener cannot be installed
/// the failure is logged and this never resolves, so serving continues.
pub async fn shutdown_on(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "cannot listen for shutdown signal, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
