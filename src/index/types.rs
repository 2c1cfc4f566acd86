use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Internal identifier of an indexed file. Allocated once per `(repo, path)`
/// and never reused.
pub type FileId = u32;

/// A case-folded n-gram. Its length is the index's configured n-gram length.
pub type NGram = Vec<u8>;

/// Default n-gram length (trigrams)
pub const DEFAULT_NGRAM_LEN: usize = 3;

/// Metadata identifying one indexed file. Unique key is `(repo, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub repo: String,
    /// Repo-relative path with `/` separators
    pub path: String,
    /// Opaque classification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Unix seconds at which this version was indexed
    pub updated_at: u64,
}

impl FileMeta {
    pub fn new(repo: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            path: path.into(),
            language: None,
            updated_at: unix_now(),
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn key(&self) -> FileKey {
        FileKey::new(&self.repo, &self.path)
    }
}

/// The `(repo, path)` identity of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub repo: String,
    pub path: String,
}

impl FileKey {
    pub fn new(repo: &str, path: &str) -> Self {
        Self {
            repo: repo.to_string(),
            path: path.to_string(),
        }
    }

    /// Storage encoding. NUL cannot appear in a repo id or a path.
    pub fn encode(&self) -> String {
        format!("{}\0{}", self.repo, self.path)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.path)
    }
}

/// One file's entry under an n-gram: the file and the ascending byte
/// offsets at which the n-gram starts in its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub file: FileMeta,
    pub offsets: Vec<u32>,
}

/// Language tag derived from a file extension.
///
/// Classification is a pluggable concern; this is the default tagger used
/// when walking mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Unknown,
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    C,
    Cpp,
    Java,
    Ruby,
    Shell,
    Markdown,
    Json,
    Yaml,
    Toml,
    Html,
    Css,
    Sql,
    Kotlin,
    Swift,
    Php,
    CSharp,
    Scala,
    Haskell,
    Elixir,
    Lua,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" | "pyw" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "mts" | "cts" | "tsx" => Language::TypeScript,
            "go" => Language::Go,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "java" => Language::Java,
            "rb" | "rake" => Language::Ruby,
            "sh" | "bash" | "zsh" | "fish" => Language::Shell,
            "md" | "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "html" | "htm" => Language::Html,
            "css" | "scss" | "sass" | "less" => Language::Css,
            "sql" => Language::Sql,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "php" => Language::Php,
            "cs" => Language::CSharp,
            "scala" | "sc" => Language::Scala,
            "hs" | "lhs" => Language::Haskell,
            "ex" | "exs" => Language::Elixir,
            "lua" => Language::Lua,
            _ => Language::Unknown,
        }
    }

    /// Tag a repo-relative path. Returns `None` when the extension is not
    /// recognised.
    pub fn detect(path: &str) -> Option<String> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let ext = file_name.rsplit_once('.').map(|(_, ext)| ext)?;
        match Self::from_extension(ext) {
            Language::Unknown => None,
            lang => Some(lang.name().to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Unknown => "unknown",
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Ruby => "ruby",
            Language::Shell => "shell",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Html => "html",
            Language::Css => "css",
            Language::Sql => "sql",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Php => "php",
            Language::CSharp => "csharp",
            Language::Scala => "scala",
            Language::Haskell => "haskell",
            Language::Elixir => "elixir",
            Language::Lua => "lua",
        }
    }
}

/// Configuration for the index engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// n-gram length; fixed for the lifetime of an index
    pub ngram_len: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ngram_len: DEFAULT_NGRAM_LEN,
        }
    }
}

/// Current time as unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
