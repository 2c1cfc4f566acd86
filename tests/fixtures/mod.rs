//! Shared fixture: a disk index plus a mirrors directory in a temp dir.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use trigrep::index::{DiskIndex, FileMeta, IndexConfig, Language};
use trigrep::query::{SearchPage, SearchRequest};
use trigrep::service::{Indexer, SearchService, Searcher};
use trigrep::source::LocalMirrors;
use trigrep::utils::CancelToken;

pub type DiskService = SearchService<Arc<DiskIndex>, LocalMirrors>;

pub struct Fixture {
    pub dir: TempDir,
    pub index: Arc<DiskIndex>,
    pub service: DiskService,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(DiskIndex::open(dir.path().join("index.redb"), IndexConfig::default()).unwrap());
        let service = SearchService::new(Arc::clone(&index), LocalMirrors::new(dir.path().join("mirrors")));
        Self { dir, index, service }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.path().join("index.redb")
    }

    pub fn mirrors(&self) -> PathBuf {
        self.dir.path().join("mirrors")
    }

    /// Write a file into its mirror without indexing it
    pub fn write_mirror(&self, repo: &str, path: &str, content: &str) {
        let full = self.mirrors().join(repo).join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    /// Write a file into its mirror and index it
    pub fn add(&self, repo: &str, path: &str, content: &str) {
        self.write_mirror(repo, path, content);
        let meta = FileMeta::new(repo, path).with_language(Language::detect(path));
        self.service.index_file(&meta, content.as_bytes()).unwrap();
    }

    pub fn delete_mirror(&self, repo: &str, path: &str) {
        fs::remove_file(self.mirrors().join(repo).join(path)).unwrap();
    }

    pub fn search(&self, request: SearchRequest) -> SearchPage {
        self.service.search(&request, &CancelToken::new()).unwrap()
    }

    pub fn query(&self, query: &str) -> SearchPage {
        self.search(SearchRequest::new(query))
    }
}

/// Make `dir` a git repository with one commit. Returns false when git is
/// not available.
pub fn git_init_commit(dir: &Path) -> bool {
    git(dir, &["init", "-q"]) && commit_all(dir, "initial")
}

pub fn commit_all(dir: &Path, message: &str) -> bool {
    git(dir, &["add", "-A"])
        && git(
            dir,
            &[
                "-c",
                "user.email=fixture@example.com",
                "-c",
                "user.name=fixture",
                "commit",
                "-q",
                "-m",
                message,
            ],
        )
}

fn git(dir: &Path, args: &[&str]) -> bool {
    std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
