//! Periodic index worker.
//!
//! Runs on its own thread: every `interval` it syncs each tracked repository
//! and reindexes it. A repository that fails is skipped until the next tick.

use crate::error::{Error, Result};
use crate::service::{CycleReport, Indexer};
use crate::source::{RepoSpec, SyncRoutine};
use crate::utils::CancelToken;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// Default refresh interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub repos: Vec<RepoSpec>,
    pub interval: Duration,
    /// Run a cycle immediately on start instead of waiting one interval
    pub run_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            repos: Vec::new(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            run_on_start: true,
        }
    }
}

pub struct IndexWorker {
    indexer: Arc<dyn Indexer>,
    sync: Arc<dyn SyncRoutine>,
    config: WorkerConfig,
}

impl IndexWorker {
    pub fn new(indexer: Arc<dyn Indexer>, sync: Arc<dyn SyncRoutine>, config: WorkerConfig) -> Self {
        Self {
            indexer,
            sync,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Sync and reindex every repository once, in the calling thread.
    pub fn run_cycle(&self, cancel: &CancelToken) -> CycleReport {
        info!(repos = self.config.repos.len(), "index cycle started");
        let report = self
            .indexer
            .reindex_all(&self.config.repos, self.sync.as_ref(), cancel);

        if report.failures.is_empty() {
            info!(
                repos = report.reports.len(),
                files = report.files_indexed(),
                elapsed_ms = report.elapsed_ms,
                cancelled = report.cancelled,
                "index cycle finished"
            );
        } else {
            warn!(
                repos = report.reports.len(),
                failed_repos = report.failures.len(),
                files = report.files_indexed(),
                elapsed_ms = report.elapsed_ms,
                "index cycle finished with failures"
            );
        }
        report
    }

    /// Launch the periodic loop on a dedicated thread.
    pub fn start(self) -> Result<WorkerHandle> {
        let cancel = CancelToken::new();
        let cycles = Arc::new(AtomicU64::new(0));
        let (wake_tx, wake_rx) = mpsc::channel::<()>();

        let thread = {
            let cancel = cancel.clone();
            let cycles = Arc::clone(&cycles);
            thread::Builder::new()
                .name("index-worker".into())
                .spawn(move || {
                    info!(interval_secs = self.config.interval.as_secs(), "index worker started");
                    if self.config.run_on_start && !cancel.is_cancelled() {
                        self.run_cycle(&cancel);
                        cycles.fetch_add(1, Ordering::SeqCst);
                    }
                    loop {
                        match wake_rx.recv_timeout(self.config.interval) {
                            Err(RecvTimeoutError::Timeout) => {}
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        }
                        if cancel.is_cancelled() {
                            break;
                        }
                        self.run_cycle(&cancel);
                        cycles.fetch_add(1, Ordering::SeqCst);
                    }
                    info!("index worker stopped");
                })
                .map_err(Error::Io)?
        };

        Ok(WorkerHandle {
            cancel,
            wake: Some(wake_tx),
            thread: Some(thread),
            cycles,
        })
    }
}

/// Handle to a running worker thread. Dropping it stops the worker.
pub struct WorkerHandle {
    cancel: CancelToken,
    wake: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    cycles: Arc<AtomicU64>,
}

impl WorkerHandle {
    /// Signal cancellation and wait for the loop to exit. The current file
    /// update, if any, completes first.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        // Disconnecting the channel wakes a sleeping loop
        self.wake.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Number of cycles completed since start
    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexConfig, MemoryIndex, NGramStore};
    use crate::service::SearchService;
    use crate::source::{GitSync, LocalMirrors};
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<MemoryIndex>, Arc<dyn Indexer>, Arc<dyn SyncRoutine>) {
        let index = Arc::new(MemoryIndex::new(IndexConfig::default()));
        let mirrors = LocalMirrors::new(dir.path());
        let indexer: Arc<dyn Indexer> = Arc::new(SearchService::new(Arc::clone(&index), mirrors.clone()));
        let sync: Arc<dyn SyncRoutine> = Arc::new(GitSync::new(mirrors));
        (index, indexer, sync)
    }

    #[test]
    fn test_run_cycle_skips_failing_repo() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("ok")).unwrap();
        fs::write(dir.path().join("ok/lib.rs"), "pub fn ok() {}").unwrap();
        let (index, indexer, sync) = setup(&dir);

        let worker = IndexWorker::new(
            indexer,
            sync,
            WorkerConfig {
                repos: vec![RepoSpec::local("broken"), RepoSpec::local("ok")],
                ..Default::default()
            },
        );
        let report = worker.run_cycle(&CancelToken::new());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.files_indexed(), 1);
        assert_eq!(index.files(Some("ok")).unwrap().len(), 1);
    }

    #[test]
    fn test_start_runs_cycle_and_stops() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("r")).unwrap();
        fs::write(dir.path().join("r/a.txt"), "hello worker").unwrap();
        let (index, indexer, sync) = setup(&dir);

        let worker = IndexWorker::new(
            indexer,
            sync,
            WorkerConfig {
                repos: vec![RepoSpec::local("r")],
                interval: Duration::from_secs(3600),
                run_on_start: true,
            },
        );
        let mut handle = worker.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.cycles_completed() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(handle.cycles_completed(), 1);
        assert_eq!(index.files(None).unwrap().len(), 1);

        // The loop is sleeping for an hour; stop must wake it
        let stopped = Instant::now();
        handle.stop();
        assert!(stopped.elapsed() < Duration::from_secs(5));
        assert!(!handle.is_running());
    }

    #[test]
    fn test_cancelled_cycle_processes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("r")).unwrap();
        fs::write(dir.path().join("r/a.txt"), "content").unwrap();
        let (index, indexer, sync) = setup(&dir);

        let worker = IndexWorker::new(
            indexer,
            sync,
            WorkerConfig {
                repos: vec![RepoSpec::local("r")],
                ..Default::default()
            },
        );
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = worker.run_cycle(&cancel);
        assert!(report.cancelled);
        assert!(report.reports.is_empty());
        assert!(index.files(None).unwrap().is_empty());
    }
}
