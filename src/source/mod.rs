//! Content source: the local mirrors the index is built from and read back
//! from during verification.

pub mod git;

pub use git::{GitSync, RepoSpec, SyncRoutine};

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Directories never walked, regardless of ignore files
const ALWAYS_SKIPPED: &[&str] = &[".git", "node_modules", "target", "__pycache__", ".venv", "venv"];

/// Read access to the current content of indexed files.
pub trait ContentSource: Send + Sync {
    /// Read a file's bytes. `NotFound` means the file disappeared upstream.
    fn read(&self, repo: &str, path: &str) -> io::Result<Vec<u8>>;

    /// Directory that `read` resolves a repository's paths under, for sources
    /// backed by a working copy. A reindex must walk this directory.
    fn checkout_dir(&self, _repo: &str) -> Option<PathBuf> {
        None
    }
}

impl<T: ContentSource + ?Sized> ContentSource for Arc<T> {
    fn read(&self, repo: &str, path: &str) -> io::Result<Vec<u8>> {
        (**self).read(repo, path)
    }

    fn checkout_dir(&self, repo: &str) -> Option<PathBuf> {
        (**self).checkout_dir(repo)
    }
}

/// Mirrors laid out under one root: repository `R` lives at `<root>/<R>`.
#[derive(Debug, Clone)]
pub struct LocalMirrors {
    root: PathBuf,
}

impl LocalMirrors {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a repository's working copy
    pub fn repo_dir(&self, repo: &str) -> io::Result<PathBuf> {
        if !is_relative_clean(repo) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid repository id: {:?}", repo),
            ));
        }
        Ok(self.root.join(repo))
    }

    /// Resolve a repo-relative path, refusing anything that would escape the
    /// repository directory.
    pub fn resolve(&self, repo: &str, path: &str) -> io::Result<PathBuf> {
        if !is_relative_clean(path) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path escapes repository: {:?}", path),
            ));
        }
        Ok(self.repo_dir(repo)?.join(path))
    }
}

impl ContentSource for LocalMirrors {
    fn read(&self, repo: &str, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(repo, path)?)
    }

    fn checkout_dir(&self, repo: &str) -> Option<PathBuf> {
        self.repo_dir(repo).ok()
    }
}

fn is_relative_clean(path: &str) -> bool {
    !path.is_empty() && Path::new(path).components().all(|c| matches!(c, Component::Normal(_)))
}

/// In-memory content keyed by `(repo, path)`, for tests and tools.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, repo: &str, path: &str, content: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert((repo.to_string(), path.to_string()), content.into());
        }
    }

    pub fn remove(&self, repo: &str, path: &str) {
        if let Ok(mut files) = self.files.write() {
            files.remove(&(repo.to_string(), path.to_string()));
        }
    }
}

impl ContentSource for MemorySource {
    fn read(&self, repo: &str, path: &str) -> io::Result<Vec<u8>> {
        let files = self
            .files
            .read()
            .map_err(|_| io::Error::other("memory source lock poisoned"))?;
        files
            .get(&(repo.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}:{}", repo, path)))
    }
}

/// A regular file found while walking a mirror
#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// Repo-relative, `/` separated
    pub path: String,
    pub full_path: PathBuf,
}

/// Result of walking one mirror
#[derive(Debug, Default)]
pub struct TreeWalk {
    pub files: Vec<WalkedFile>,
    /// Entries that could not be read; a walk with errors is incomplete
    pub errors: usize,
}

impl TreeWalk {
    pub fn is_complete(&self) -> bool {
        self.errors == 0
    }
}

/// Walks a mirror's tree honoring ignore files plus configured exclude globs.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    excludes: GlobSet,
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self {
            excludes: GlobSet::empty(),
        }
    }
}

impl TreeWalker {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::InvalidRequest(format!("invalid exclude glob '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let excludes = builder
            .build()
            .map_err(|e| Error::InvalidRequest(format!("failed to build exclude set: {}", e)))?;
        Ok(Self { excludes })
    }

    pub fn walk(&self, root: &Path) -> TreeWalk {
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !is_dir || !ALWAYS_SKIPPED.contains(&entry.file_name().to_string_lossy().as_ref())
            })
            .build();

        let mut walk = TreeWalk::default();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(root = %root.display(), error = %e, "walk entry failed");
                    walk.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let Some(rel) = entry.path().strip_prefix(root).ok().and_then(relative_slash_path) else {
                debug!(path = %entry.path().display(), "skipping non UTF-8 path");
                continue;
            };
            if self.excludes.is_match(&rel) {
                continue;
            }
            walk.files.push(WalkedFile {
                path: rel,
                full_path: entry.into_path(),
            });
        }

        walk.files.sort_by(|a, b| a.path.cmp(&b.path));
        walk
    }
}

fn relative_slash_path(rel: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    parts.map(|parts| parts.join("/")).filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_rejects_escapes() {
        let mirrors = LocalMirrors::new("/srv/mirrors");
        assert_eq!(
            mirrors.resolve("acme/api", "src/main.go").unwrap(),
            PathBuf::from("/srv/mirrors/acme/api/src/main.go")
        );
        assert!(mirrors.resolve("acme/api", "../other/secret").is_err());
        assert!(mirrors.resolve("acme/api", "/etc/passwd").is_err());
        assert!(mirrors.repo_dir("..").is_err());
        assert!(mirrors.repo_dir("").is_err());
    }

    #[test]
    fn test_local_mirrors_read() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("r/src")).unwrap();
        fs::write(dir.path().join("r/src/a.rs"), "fn a() {}").unwrap();

        let mirrors = LocalMirrors::new(dir.path());
        assert_eq!(mirrors.read("r", "src/a.rs").unwrap(), b"fn a() {}");
        assert_eq!(mirrors.checkout_dir("r"), Some(dir.path().join("r")));
        assert_eq!(MemorySource::new().checkout_dir("r"), None);
        let err = mirrors.read("r", "src/missing.rs").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new();
        source.insert("r", "a", "x");
        assert_eq!(source.read("r", "a").unwrap(), b"x");
        source.remove("r", "a");
        assert_eq!(source.read("r", "a").unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_walk_skips_ignored_and_excluded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("src/main.go"), "package main").unwrap();
        fs::write(root.join("src/nested/util.go"), "package nested").unwrap();
        fs::write(root.join("src/gen.pb.go"), "generated").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(root.join("build/out.txt"), "x").unwrap();
        fs::write(root.join(".hidden"), "x").unwrap();
        fs::write(root.join(".gitignore"), "build/\n").unwrap();

        let walker = TreeWalker::new(&["**/*.pb.go".to_string()]).unwrap();
        let walk = walker.walk(root);
        let paths: Vec<&str> = walk.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/main.go", "src/nested/util.go"]);
        assert!(walk.is_complete());
    }

    #[test]
    fn test_skipped_names_only_apply_to_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::create_dir_all(root.join("tools")).unwrap();
        fs::write(root.join("target/debug/build.log"), "x").unwrap();
        fs::write(root.join("tools/target"), "deploy target list").unwrap();
        fs::write(root.join("venv"), "python = 3.12").unwrap();

        let walk = TreeWalker::default().walk(root);
        let paths: Vec<&str> = walk.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["tools/target", "venv"]);
    }

    #[test]
    fn test_invalid_glob() {
        assert!(matches!(
            TreeWalker::new(&["a[".to_string()]),
            Err(Error::InvalidRequest(_))
        ));
    }
}
