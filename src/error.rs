use thiserror::Error;

/// Failures of the embedded index store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("record encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("corrupt index entry: {0}")]
    Corrupt(String),

    #[error("index was created with n-gram length {stored}, configured length is {configured}")]
    NgramLenMismatch { stored: u64, configured: u64 },
}

/// Main error type for trigrep operations.
///
/// Variants fall into three groups: client errors (bad query input, never
/// retried), source errors (one repository could not be synced or read), and
/// storage errors (the index itself failed).
#[derive(Error, Debug)]
pub enum Error {
    #[error("query too short: need at least {min} bytes, got {actual}")]
    QueryTooShort { min: usize, actual: usize },

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("source error for repository {repo}: {message}")]
    Source { repo: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias for trigrep operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn source_error(repo: impl Into<String>, message: impl ToString) -> Self {
        Error::Source {
            repo: repo.into(),
            message: message.to_string(),
        }
    }

    /// True for errors caused by the caller's input. These are reported
    /// verbatim and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::QueryTooShort { .. } | Error::InvalidPattern(_) | Error::InvalidRequest(_)
        )
    }

    /// Short machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::QueryTooShort { .. } => "query_too_short",
            Error::InvalidPattern(_) => "invalid_pattern",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Source { .. } => "source_error",
            Error::Storage(_) => "storage_error",
            Error::Io(_) => "io_error",
            Error::Cancelled => "cancelled",
        }
    }
}

// Every redb failure is a storage failure from the caller's point of view.
macro_rules! storage_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(e: $ty) -> Self {
                    Error::Storage(StorageError::from(e))
                }
            }
        )*
    };
}

storage_from!(
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::CommitError,
    redb::StorageError,
);
