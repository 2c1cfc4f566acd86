//! Layered configuration.
//!
//! Priority, highest first: CLI flags (applied by the binary), `TRIGREP_*`
//! environment variables, the JSON config file, built-in defaults.

use crate::index::types::{IndexConfig, DEFAULT_NGRAM_LEN};
use crate::query::{QueryOptions, DEFAULT_MIN_QUERY_LEN};
use crate::service::{IndexPolicy, DEFAULT_MAX_FILE_SIZE};
use crate::source::RepoSpec;
use crate::worker::{WorkerConfig, DEFAULT_INTERVAL_SECS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const APP_NAME: &str = "trigrep";
const CONFIG_FILE: &str = "config.json";
const ENV_PREFIX: &str = "TRIGREP_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Holds `index.redb` and, unless overridden, the mirrors
    pub data_dir: PathBuf,
    /// Root of the repository mirrors; defaults to `<data_dir>/mirrors`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrors_dir: Option<PathBuf>,
    pub ngram_len: usize,
    pub min_query_len: usize,
    pub max_file_size: u64,
    pub default_limit: usize,
    pub max_limit: usize,
    /// Globs of repo-relative paths never indexed
    pub exclude: Vec<String>,
    pub repos: Vec<RepoSpec>,
    pub interval_secs: u64,
    pub run_on_start: bool,
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        let query = QueryOptions::default();
        Self {
            data_dir: app_data_dir().unwrap_or_else(|| PathBuf::from(".trigrep")),
            mirrors_dir: None,
            ngram_len: DEFAULT_NGRAM_LEN,
            min_query_len: DEFAULT_MIN_QUERY_LEN,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_limit: query.default_limit,
            max_limit: query.max_limit,
            exclude: Vec::new(),
            repos: Vec::new(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            run_on_start: true,
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load file and environment layers. An explicit `path` must exist; the
    /// default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply `TRIGREP_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("MIRRORS_DIR") {
            self.mirrors_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("BIND") {
            self.bind = v;
        }
        if let Some(v) = var("EXCLUDE") {
            self.exclude = split_list(&v).map(str::to_string).collect();
        }
        if let Some(v) = var("REPOS") {
            self.repos = split_list(&v).map(parse_repo).collect();
        }
        parse_into(var("NGRAM_LEN"), "NGRAM_LEN", &mut self.ngram_len);
        parse_into(var("MIN_QUERY_LEN"), "MIN_QUERY_LEN", &mut self.min_query_len);
        parse_into(var("MAX_FILE_SIZE"), "MAX_FILE_SIZE", &mut self.max_file_size);
        parse_into(var("DEFAULT_LIMIT"), "DEFAULT_LIMIT", &mut self.default_limit);
        parse_into(var("MAX_LIMIT"), "MAX_LIMIT", &mut self.max_limit);
        parse_into(var("INTERVAL_SECS"), "INTERVAL_SECS", &mut self.interval_secs);
        parse_into(var("RUN_ON_START"), "RUN_ON_START", &mut self.run_on_start);
    }

    pub fn validate(&self) -> Result<()> {
        if self.ngram_len == 0 {
            bail!("ngram_len must be at least 1");
        }
        if self.min_query_len == 0 {
            bail!("min_query_len must be at least 1");
        }
        if self.default_limit == 0 || self.max_limit == 0 {
            bail!("default_limit and max_limit must be at least 1");
        }
        if self.interval_secs == 0 {
            bail!("interval_secs must be at least 1");
        }
        for repo in &self.repos {
            if repo.id.trim().is_empty() {
                bail!("repository id must not be empty");
            }
        }
        Ok(())
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("index.redb")
    }

    pub fn mirrors_dir(&self) -> PathBuf {
        self.mirrors_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("mirrors"))
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            ngram_len: self.ngram_len,
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            min_query_len: self.min_query_len,
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    pub fn index_policy(&self) -> IndexPolicy {
        IndexPolicy {
            max_file_size: self.max_file_size,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            repos: self.repos.clone(),
            interval: Duration::from_secs(self.interval_secs),
            run_on_start: self.run_on_start,
        }
    }
}

/// Platform application data directory for trigrep
pub fn app_data_dir() -> Option<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        dirs::data_dir()
    };
    base.map(|b| b.join(APP_NAME))
}

pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(CONFIG_FILE))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// `id` or `id=remote`
fn parse_repo(entry: &str) -> RepoSpec {
    match entry.split_once('=') {
        Some((id, remote)) => RepoSpec::remote(id.trim(), remote.trim()),
        None => RepoSpec::local(entry),
    }
}

fn parse_into<T: FromStr>(value: Option<String>, name: &str, slot: &mut T) {
    let Some(value) = value else { return };
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(var = %format!("{}{}", ENV_PREFIX, name), %value, "ignoring unparsable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ngram_len, 3);
        assert_eq!(config.interval_secs, 300);
        assert!(config.run_on_start);
        assert_eq!(config.mirrors_dir(), config.data_dir.join("mirrors"));
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"data_dir": "/srv/trigrep", "repos": [{"id": "acme/api", "remote": "https://git.example.com/acme/api.git"}]}"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/trigrep"));
        assert_eq!(config.index_path(), PathBuf::from("/srv/trigrep/index.redb"));
        assert_eq!(config.repos.len(), 1);
        assert_eq!(config.max_limit, 100);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TRIGREP_NGRAM_LEN", "4"),
            ("TRIGREP_INTERVAL_SECS", "not-a-number"),
            ("TRIGREP_REPOS", "acme/api=https://example.com/api.git, local/tools"),
            ("TRIGREP_RUN_ON_START", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.ngram_len, 4);
        assert_eq!(config.interval_secs, 300);
        assert!(!config.run_on_start);
        assert_eq!(
            config.repos,
            vec![
                RepoSpec::remote("acme/api", "https://example.com/api.git"),
                RepoSpec::local("local/tools"),
            ]
        );
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = Config {
            ngram_len: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
