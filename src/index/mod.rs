//! The n-gram inverted index.
//!
//! [`NGramStore`] is the seam between the query engine and storage.
//! [`DiskIndex`] is the durable engine; [`MemoryIndex`] keeps everything in
//! process memory and is meant for tests of the query algorithm.

pub mod disk;
pub mod memory;
pub mod stats;
pub mod types;

pub use disk::DiskIndex;
pub use memory::MemoryIndex;
pub use stats::IndexStats;
pub use types::*;

use crate::error::{Error, Result};

/// Largest content an index accepts. Posting offsets are stored as `u32`.
pub const MAX_CONTENT_LEN: usize = u32::MAX as usize;

pub(crate) fn check_content_len(meta: &FileMeta, content: &[u8]) -> Result<()> {
    check_len(meta, content.len())
}

fn check_len(meta: &FileMeta, len: usize) -> Result<()> {
    if len > MAX_CONTENT_LEN {
        return Err(Error::InvalidRequest(format!(
            "{} is {} bytes, more than the {} bytes an index can address",
            meta.key(),
            len,
            MAX_CONTENT_LEN
        )));
    }
    Ok(())
}

/// Storage engine contract for the n-gram index.
///
/// Mutations are atomic per call: a reader sees either the file's previous
/// postings or its new ones, never a mix.
pub trait NGramStore: Send + Sync {
    /// Length of the n-grams this index is keyed by
    fn ngram_len(&self) -> usize;

    /// Replace all postings of `(meta.repo, meta.path)` with the n-grams of
    /// `content`.
    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> Result<()>;

    /// Delete every posting that references the file. Returns false if the
    /// file was not indexed.
    fn remove_file(&self, repo: &str, path: &str) -> Result<bool>;

    /// Files that have a posting under every one of `grams`.
    ///
    /// An empty gram list places no constraint and yields every indexed file.
    fn candidates(&self, grams: &[NGram]) -> Result<Vec<FileMeta>>;

    /// The full posting list of one n-gram, ordered by file id.
    fn postings(&self, gram: &[u8]) -> Result<Vec<Posting>>;

    /// Indexed files, optionally restricted to one repository.
    fn files(&self, repo: Option<&str>) -> Result<Vec<FileMeta>>;

    fn stats(&self) -> Result<IndexStats>;
}

impl<T: NGramStore + ?Sized> NGramStore for std::sync::Arc<T> {
    fn ngram_len(&self) -> usize {
        (**self).ngram_len()
    }

    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> Result<()> {
        (**self).index_file(meta, content)
    }

    fn remove_file(&self, repo: &str, path: &str) -> Result<bool> {
        (**self).remove_file(repo, path)
    }

    fn candidates(&self, grams: &[NGram]) -> Result<Vec<FileMeta>> {
        (**self).candidates(grams)
    }

    fn postings(&self, gram: &[u8]) -> Result<Vec<Posting>> {
        (**self).postings(gram)
    }

    fn files(&self, repo: Option<&str>) -> Result<Vec<FileMeta>> {
        (**self).files(repo)
    }

    fn stats(&self) -> Result<IndexStats> {
        (**self).stats()
    }
}
