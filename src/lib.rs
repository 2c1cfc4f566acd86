//! # trigrep - trigram-indexed code search
//!
//! trigrep indexes the text of many repository mirrors so that substrings
//! and regular expressions can be found across all of them quickly, with
//! filtering by repository, language and path, and ranked, paginated
//! results.
//!
//! ## Architecture
//!
//! - [`index`] - the durable n-gram inverted index ([`index::DiskIndex`]) and
//!   an in-memory double ([`index::MemoryIndex`])
//! - [`query`] - planning, candidate narrowing, line verification, ranking
//! - [`source`] - local mirrors, tree walking and git sync
//! - [`service`] - the [`Indexer`](service::Indexer) and
//!   [`Searcher`](service::Searcher) facade
//! - [`worker`] - periodic sync-and-reindex loop
//! - [`server`] - HTTP query endpoint
//! - [`config`] - layered configuration
//! - [`output`] - terminal rendering of results
//!
//! ## Quick Start
//!
//! ```ignore
//! use trigrep::index::{DiskIndex, IndexConfig};
//! use trigrep::query::SearchRequest;
//! use trigrep::service::{Indexer, SearchService, Searcher};
//! use trigrep::source::LocalMirrors;
//! use trigrep::utils::CancelToken;
//!
//! let index = DiskIndex::open("/var/lib/trigrep/index.redb", IndexConfig::default())?;
//! let service = SearchService::new(index, LocalMirrors::new("/var/lib/trigrep/mirrors"));
//!
//! service.reindex_repo("acme/api", "/var/lib/trigrep/mirrors/acme/api".as_ref(), &CancelToken::new())?;
//! let page = service.search(&SearchRequest::new("func main"), &CancelToken::new())?;
//! for m in page.results {
//!     println!("{}:{}:{}: {}", m.repo, m.path, m.line_number, m.line);
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod server;
pub mod service;
pub mod source;
pub mod utils;
pub mod worker;

pub use error::{Error, Result};
