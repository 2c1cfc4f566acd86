use crate::error::{Error, Result};
use crate::source::LocalMirrors;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// A tracked repository: its id (mirror directory under the mirrors root)
/// and, optionally, the remote it is mirrored from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl RepoSpec {
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote: None,
        }
    }

    pub fn remote(id: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remote: Some(remote.into()),
        }
    }
}

/// Brings a repository's local mirror up to date and returns its directory.
pub trait SyncRoutine: Send + Sync {
    fn sync(&self, repo: &RepoSpec) -> Result<PathBuf>;
}

/// Clone-if-absent, fast-forward-pull-if-present, using the `git` binary.
#[derive(Debug, Clone)]
pub struct GitSync {
    mirrors: LocalMirrors,
    git: PathBuf,
}

impl GitSync {
    pub fn new(mirrors: LocalMirrors) -> Self {
        Self {
            mirrors,
            git: PathBuf::from("git"),
        }
    }

    /// Use a specific git executable
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    pub fn mirrors(&self) -> &LocalMirrors {
        &self.mirrors
    }

    fn run(&self, repo: &str, args: &[&str]) -> Result<()> {
        debug!(repo, ?args, "running git");
        let output = Command::new(&self.git)
            .args(args)
            .output()
            .map_err(|e| Error::source_error(repo, format!("failed to run git: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::source_error(
                repo,
                format!("git {} failed ({}): {}", args.join(" "), output.status, stderr.trim()),
            ))
        }
    }
}

impl SyncRoutine for GitSync {
    fn sync(&self, repo: &RepoSpec) -> Result<PathBuf> {
        let dir = self
            .mirrors
            .repo_dir(&repo.id)
            .map_err(|e| Error::source_error(&repo.id, e))?;

        let Some(remote) = repo.remote.as_deref() else {
            return if dir.is_dir() {
                Ok(dir)
            } else {
                Err(Error::source_error(
                    &repo.id,
                    format!("mirror directory {} does not exist", dir.display()),
                ))
            };
        };

        let dir_str = path_arg(&repo.id, &dir)?;
        if dir.exists() {
            self.run(&repo.id, &["-C", dir_str, "pull", "--ff-only"])?;
        } else {
            if let Some(parent) = dir.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::source_error(&repo.id, e))?;
            }
            info!(repo = %repo.id, remote, "cloning mirror");
            self.run(&repo.id, &["clone", "--depth=1", remote, dir_str])?;
        }
        Ok(dir)
    }
}

fn path_arg<'a>(repo: &str, dir: &'a Path) -> Result<&'a str> {
    dir.to_str()
        .ok_or_else(|| Error::source_error(repo, "mirror path is not valid UTF-8"))
}
