//! End-to-end properties of indexing and search against the disk index.

mod fixtures;

use fixtures::Fixture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use trigrep::index::{
    DiskIndex, FileMeta, IndexConfig, IndexStats, MemoryIndex, NGram, NGramStore, Posting,
};
use trigrep::error::StorageError;
use trigrep::query::{QueryEngine, QueryOptions, SearchFilters, SearchRequest};
use trigrep::service::{Indexer, SearchService, Searcher};
use trigrep::source::{LocalMirrors, MemorySource};
use trigrep::utils::CancelToken;
use trigrep::Error;

const MAIN_GO: &str = "package main\nfunc main() {\n  fmt.Println(\"hi\")\n}";

#[test]
fn test_round_trip_every_substring() {
    let fx = Fixture::new();
    let line = "let Result = parse_config(Path::new(\"x\"));";
    fx.add("r", "src/lib.rs", line);

    for start in 0..line.len() {
        for end in (start + 3)..=line.len() {
            let query = &line[start..end];
            let page = fx.search(SearchRequest::new(query).page(100, 0));
            let hit = page
                .results
                .iter()
                .find(|m| m.path == "src/lib.rs")
                .unwrap_or_else(|| panic!("no match for {:?}", query));
            assert!(
                hit.match_ranges
                    .iter()
                    .any(|[s, e]| hit.line[*s..*e].eq_ignore_ascii_case(query)),
                "no range for {:?}",
                query
            );
        }
    }
}

#[test]
fn test_main_go_scenario() {
    let fx = Fixture::new();
    fx.add("r", "main.go", MAIN_GO);

    let page = fx.query("func main");
    assert_eq!(page.total_count, 1);
    assert_eq!(page.results[0].line_number, 2);
    assert_eq!(page.results[0].match_ranges, vec![[0, 9]]);
    assert_eq!(page.results[0].language.as_deref(), Some("go"));
}

#[test]
fn test_removal_leaves_shared_grams_intact() {
    let fx = Fixture::new();
    fx.add("r", "a.txt", "shared needle here");
    fx.add("r", "b.txt", "shared needle there");

    assert!(fx.service.remove_file("r", "a.txt").unwrap());
    let page = fx.query("shared needle");
    assert_eq!(page.total_count, 1);
    assert_eq!(page.results[0].path, "b.txt");

    // The mirror still holds a.txt; the index alone decides candidates
    assert!(fx.query("here").results.iter().all(|m| m.path != "a.txt"));
    assert!(!fx.service.remove_file("r", "a.txt").unwrap());
}

#[test]
fn test_idempotent_reindex() {
    let fx = Fixture::new();
    fx.add("r", "a.txt", "alpha beta gamma\nbeta again");
    let once = fx.query("beta");
    fx.add("r", "a.txt", "alpha beta gamma\nbeta again");
    let twice = fx.query("beta");
    assert_eq!(once, twice);
    assert_eq!(fx.index.stats().unwrap().files, 1);
}

#[test]
fn test_reindex_drops_stale_postings() {
    let fx = Fixture::new();
    fx.add("r", "a.txt", "old content");
    fx.add("r", "a.txt", "new content");
    assert!(fx.index.candidates(&[b"old".to_vec()]).unwrap().is_empty());
    assert_eq!(fx.query("new content").total_count, 1);
}

#[test]
fn test_intersection_correctness() {
    let fx = Fixture::new();
    fx.add("r", "f1.go", "func");
    fx.add("r", "f2.go", "func main");

    let page = fx.query("func main");
    assert_eq!(page.total_count, 1);
    assert_eq!(page.results[0].path, "f2.go");

    let both = fx.query("func");
    assert_eq!(both.total_count, 2);
}

#[test]
fn test_pagination() {
    let fx = Fixture::new();
    let content: String = (1..=25).map(|i| format!("match line {}\n", i)).collect();
    fx.add("r", "many.txt", &content);

    let page = fx.search(SearchRequest::new("match").page(10, 20));
    assert_eq!(page.results.len(), 5);
    assert_eq!(page.total_count, 25);
    assert!(!page.has_more);

    let page = fx.search(SearchRequest::new("match").page(10, 0));
    assert_eq!(page.results.len(), 10);
    assert!(page.has_more);
    assert_eq!(page.results[0].line_number, 1);
}

/// Store wrapper that counts every call reaching storage.
struct CountingStore {
    inner: MemoryIndex,
    calls: AtomicUsize,
}

impl CountingStore {
    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl NGramStore for CountingStore {
    fn ngram_len(&self) -> usize {
        self.inner.ngram_len()
    }
    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> trigrep::Result<()> {
        self.touch();
        self.inner.index_file(meta, content)
    }
    fn remove_file(&self, repo: &str, path: &str) -> trigrep::Result<bool> {
        self.touch();
        self.inner.remove_file(repo, path)
    }
    fn candidates(&self, grams: &[NGram]) -> trigrep::Result<Vec<FileMeta>> {
        self.touch();
        self.inner.candidates(grams)
    }
    fn postings(&self, gram: &[u8]) -> trigrep::Result<Vec<Posting>> {
        self.touch();
        self.inner.postings(gram)
    }
    fn files(&self, repo: Option<&str>) -> trigrep::Result<Vec<FileMeta>> {
        self.touch();
        self.inner.files(repo)
    }
    fn stats(&self) -> trigrep::Result<IndexStats> {
        self.touch();
        self.inner.stats()
    }
}

#[test]
fn test_short_query_never_touches_storage() {
    let store = Arc::new(CountingStore {
        inner: MemoryIndex::new(IndexConfig::default()),
        calls: AtomicUsize::new(0),
    });
    let engine = QueryEngine::new(Arc::clone(&store), MemorySource::new(), QueryOptions::default());

    let err = engine.search(&SearchRequest::new("ab"), &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::QueryTooShort { min: 3, actual: 2 }));
    assert!(err.is_client_error());
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

/// Wraps a working index but fails every read, like a corrupted store.
struct UnreadableStore {
    inner: MemoryIndex,
}

impl NGramStore for UnreadableStore {
    fn ngram_len(&self) -> usize {
        self.inner.ngram_len()
    }
    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> trigrep::Result<()> {
        self.inner.index_file(meta, content)
    }
    fn remove_file(&self, repo: &str, path: &str) -> trigrep::Result<bool> {
        self.inner.remove_file(repo, path)
    }
    fn candidates(&self, _grams: &[NGram]) -> trigrep::Result<Vec<FileMeta>> {
        Err(StorageError::Corrupt("posting list truncated".into()).into())
    }
    fn postings(&self, _gram: &[u8]) -> trigrep::Result<Vec<Posting>> {
        Err(StorageError::Corrupt("posting list truncated".into()).into())
    }
    fn files(&self, _repo: Option<&str>) -> trigrep::Result<Vec<FileMeta>> {
        Err(StorageError::Corrupt("file table truncated".into()).into())
    }
    fn stats(&self) -> trigrep::Result<IndexStats> {
        self.inner.stats()
    }
}

#[test]
fn test_storage_failure_fails_whole_search() {
    let store = UnreadableStore {
        inner: MemoryIndex::new(IndexConfig::default()),
    };
    let source = MemorySource::new();
    store.index_file(&FileMeta::new("r", "main.go"), MAIN_GO.as_bytes()).unwrap();
    source.insert("r", "main.go", MAIN_GO);
    let engine = QueryEngine::new(store, source, QueryOptions::default());
    let cancel = CancelToken::new();

    for request in [
        SearchRequest::new("func main"),
        SearchRequest::new("f.*n").regex(true),
        SearchRequest::new("f.*n").regex(true).with_filters(SearchFilters {
            repo: Some("r".into()),
            ..SearchFilters::default()
        }),
    ] {
        let err = engine.search(&request, &cancel).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Corrupt(_))), "{:?}", err);
        assert!(!err.is_client_error());
    }
}

#[test]
fn test_invalid_regex_is_client_error() {
    let fx = Fixture::new();
    fx.add("r", "a.txt", "anything");
    let err = fx
        .service
        .search(&SearchRequest::new("[unclosed").regex(true), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPattern(_)));
}

#[test]
fn test_restart_durability() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.redb");
    {
        let index = DiskIndex::open(&path, IndexConfig::default()).unwrap();
        index.index_file(&FileMeta::new("r", "main.go"), MAIN_GO.as_bytes()).unwrap();
        index.index_file(&FileMeta::new("r", "gone.go"), b"func gone()").unwrap();
        index.remove_file("r", "gone.go").unwrap();
    }

    let index = DiskIndex::open(&path, IndexConfig::default()).unwrap();
    let source = MemorySource::new();
    source.insert("r", "main.go", MAIN_GO);
    let service = SearchService::new(index, source);

    let page = service.search(&SearchRequest::new("func"), &CancelToken::new()).unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.results[0].path, "main.go");

    // The reverse index survived the restart too
    assert!(service.remove_file("r", "main.go").unwrap());
    assert_eq!(service.store().stats().unwrap().postings, 0);
}

#[test]
fn test_reopen_with_other_ngram_len_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.redb");
    drop(DiskIndex::open(&path, IndexConfig::default()).unwrap());
    let result = DiskIndex::open(&path, IndexConfig { ngram_len: 4 });
    assert!(matches!(result, Err(Error::Storage(_))));
}

#[test]
fn test_concurrent_search_during_reindex() {
    let fx = Arc::new(Fixture::new());
    fx.add("r", "stable.txt", "stable needle");

    let writer = {
        let fx = Arc::clone(&fx);
        thread::spawn(move || {
            for i in 0..50 {
                fx.add("r", "churn.txt", &format!("churn {} needle", i));
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let fx = Arc::clone(&fx);
            thread::spawn(move || {
                for _ in 0..50 {
                    let page = fx.query("needle");
                    assert!(page.results.iter().any(|m| m.path == "stable.txt"));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(fx.query("needle").total_count, 2);
}

#[test]
fn test_filters_on_disk_index() {
    let fx = Fixture::new();
    fx.add("acme/api", "cmd/server/main.go", "func main() { serve() }");
    fx.add("acme/web", "src/main.ts", "function main() { serve() }");

    let mut request = SearchRequest::new("serve");
    request.filters.language = Some("typescript".into());
    let page = fx.search(request);
    assert_eq!(page.total_count, 1);
    assert_eq!(page.results[0].repo, "acme/web");

    let mut request = SearchRequest::new("serve");
    request.filters.path = Some("server/".into());
    assert_eq!(fx.search(request).results[0].repo, "acme/api");
}

#[test]
fn test_mirrors_read_back() {
    let fx = Fixture::new();
    fx.add("acme/api", "src/a.rs", "fn read_back() {}");
    let mirrors = LocalMirrors::new(fx.mirrors());
    let service = SearchService::new(Arc::clone(&fx.index), mirrors);
    let page = service.search(&SearchRequest::new("read_back"), &CancelToken::new()).unwrap();
    assert_eq!(page.total_count, 1);
}
