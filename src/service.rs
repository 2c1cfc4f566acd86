//! Search service facade.
//!
//! [`Indexer`] and [`Searcher`] are the contracts the worker, the CLI and the
//! HTTP layer program against. [`SearchService`] implements both on top of
//! any [`NGramStore`] and [`ContentSource`].

use crate::error::{Error, Result};
use crate::index::types::{FileMeta, Language};
use crate::index::NGramStore;
use crate::query::{QueryEngine, QueryOptions, SearchPage, SearchRequest};
use crate::source::{ContentSource, RepoSpec, SyncRoutine, TreeWalker};
use crate::utils::{is_binary, progress, CancelToken};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default maximum indexed file size (1 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Mutation side of the index.
pub trait Indexer: Send + Sync {
    /// Index one file, replacing any previous version.
    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> Result<IndexOutcome>;

    fn remove_file(&self, repo: &str, path: &str) -> Result<bool>;

    /// Walk `dir` and index every file in it as repository `repo`, then drop
    /// indexed files the walk no longer produced. `dir` must be the directory
    /// the content source reads `repo` from.
    fn reindex_repo(&self, repo: &str, dir: &Path, cancel: &CancelToken) -> Result<RepoReport>;

    /// Sync and reindex every repository in turn. A failing repository is
    /// logged and skipped; the rest are still processed.
    fn reindex_all(
        &self,
        repos: &[RepoSpec],
        sync: &dyn SyncRoutine,
        cancel: &CancelToken,
    ) -> CycleReport {
        let start = Instant::now();
        let mut cycle = CycleReport::default();

        for repo in repos {
            if cancel.is_cancelled() {
                cycle.cancelled = true;
                break;
            }

            let result = sync
                .sync(repo)
                .and_then(|dir| self.reindex_repo(&repo.id, &dir, cancel));
            match result {
                Ok(report) => {
                    info!(
                        repo = %report.repo,
                        indexed = report.indexed,
                        skipped = report.skipped,
                        removed = report.removed,
                        failed = report.failed,
                        "repository reindexed"
                    );
                    cycle.cancelled |= report.cancelled;
                    cycle.reports.push(report);
                }
                Err(Error::Cancelled) => {
                    cycle.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(repo = %repo.id, error = %e, "repository skipped this cycle");
                    cycle.failures.push(RepoFailure {
                        repo: repo.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        cycle.elapsed_ms = start.elapsed().as_millis() as u64;
        cycle
    }
}

/// Query side of the index.
pub trait Searcher: Send + Sync {
    fn search(&self, request: &SearchRequest, cancel: &CancelToken) -> Result<SearchPage>;
}

/// What `index_file` did with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    /// Not indexed; any previous version was removed
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Binary,
    TooLarge,
}

/// Outcome of reindexing one repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoReport {
    pub repo: String,
    pub indexed: usize,
    pub skipped: usize,
    /// Files pruned because they no longer exist upstream
    pub removed: usize,
    /// Files that could not be read or written
    pub failed: usize,
    pub cancelled: bool,
}

impl RepoReport {
    fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoFailure {
    pub repo: String,
    pub error: String,
}

/// Outcome of one pass over all tracked repositories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub reports: Vec<RepoReport>,
    pub failures: Vec<RepoFailure>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl CycleReport {
    pub fn files_indexed(&self) -> usize {
        self.reports.iter().map(|r| r.indexed).sum()
    }
}

/// Which files are worth indexing
#[derive(Debug, Clone)]
pub struct IndexPolicy {
    pub max_file_size: u64,
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl IndexPolicy {
    fn check(&self, content: &[u8]) -> Option<SkipReason> {
        if content.len() as u64 > self.max_file_size {
            Some(SkipReason::TooLarge)
        } else if is_binary(content) {
            Some(SkipReason::Binary)
        } else {
            None
        }
    }
}

/// The index engine behind both facade contracts.
pub struct SearchService<S, C> {
    engine: QueryEngine<S, C>,
    walker: TreeWalker,
    policy: IndexPolicy,
    progress: bool,
}

impl<S: NGramStore, C: ContentSource> SearchService<S, C> {
    pub fn new(store: S, source: C) -> Self {
        Self {
            engine: QueryEngine::new(store, source, QueryOptions::default()),
            walker: TreeWalker::default(),
            policy: IndexPolicy::default(),
            progress: false,
        }
    }

    pub fn with_query_options(self, options: QueryOptions) -> Self {
        let Self {
            engine,
            walker,
            policy,
            progress,
        } = self;
        let (store, source) = engine.into_parts();
        Self {
            engine: QueryEngine::new(store, source, options),
            walker,
            policy,
            progress,
        }
    }

    pub fn with_walker(mut self, walker: TreeWalker) -> Self {
        self.walker = walker;
        self
    }

    pub fn with_policy(mut self, policy: IndexPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Show a spinner while walking repositories
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn store(&self) -> &S {
        self.engine.store()
    }

    pub fn engine(&self) -> &QueryEngine<S, C> {
        &self.engine
    }

    fn prune(&self, repo: &str, seen: &HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        for meta in self.store().files(Some(repo))? {
            if !seen.contains(&meta.path) && self.store().remove_file(repo, &meta.path)? {
                debug!(repo, path = %meta.path, "pruned file missing from mirror");
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn skip(&self, repo: &str, path: &str, reason: SkipReason) -> Result<IndexOutcome> {
        debug!(repo, path, ?reason, "file not indexed");
        self.store().remove_file(repo, path)?;
        Ok(IndexOutcome::Skipped(reason))
    }
}

impl<S: NGramStore, C: ContentSource> Indexer for SearchService<S, C> {
    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> Result<IndexOutcome> {
        if let Some(reason) = self.policy.check(content) {
            return self.skip(&meta.repo, &meta.path, reason);
        }
        self.store().index_file(meta, content)?;
        Ok(IndexOutcome::Indexed)
    }

    fn remove_file(&self, repo: &str, path: &str) -> Result<bool> {
        self.store().remove_file(repo, path)
    }

    fn reindex_repo(&self, repo: &str, dir: &Path, cancel: &CancelToken) -> Result<RepoReport> {
        if !dir.is_dir() {
            return Err(Error::source_error(
                repo,
                format!("{} is not a directory", dir.display()),
            ));
        }
        if let Some(checkout) = self.engine.source().checkout_dir(repo) {
            if !same_dir(&checkout, dir) {
                return Err(Error::InvalidRequest(format!(
                    "{} is not where {} is read from ({})",
                    dir.display(),
                    repo,
                    checkout.display()
                )));
            }
        }

        let walk = self.walker.walk(dir);
        let mut report = RepoReport::new(repo);
        let mut seen = HashSet::with_capacity(walk.files.len());
        let spinner = progress::walk_spinner(repo, self.progress);

        for file in &walk.files {
            // Each index_file commits on its own, so stopping here is safe
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            seen.insert(file.path.clone());
            spinner.inc(1);

            let too_large = fs::metadata(&file.full_path)
                .map(|m| m.len() > self.policy.max_file_size)
                .unwrap_or(false);
            let outcome = if too_large {
                self.skip(repo, &file.path, SkipReason::TooLarge)
            } else {
                match fs::read(&file.full_path) {
                    Ok(content) => {
                        let meta = FileMeta::new(repo, file.path.as_str())
                            .with_language(Language::detect(&file.path));
                        self.index_file(&meta, &content)
                    }
                    Err(e) => Err(Error::Io(e)),
                }
            };

            match outcome {
                Ok(IndexOutcome::Indexed) => report.indexed += 1,
                Ok(IndexOutcome::Skipped(_)) => report.skipped += 1,
                Err(e) => {
                    warn!(repo, path = %file.path, error = %e, "failed to index file");
                    report.failed += 1;
                }
            }
        }
        spinner.finish_and_clear();

        if !report.cancelled && walk.is_complete() && report.failed == 0 {
            report.removed = self.prune(repo, &seen)?;
        } else if !walk.is_complete() {
            warn!(repo, errors = walk.errors, "walk incomplete, not pruning");
        }

        Ok(report)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl<S: NGramStore, C: ContentSource> Searcher for SearchService<S, C> {
    fn search(&self, request: &SearchRequest, cancel: &CancelToken) -> Result<SearchPage> {
        self.engine.search(request, cancel)
    }
}
