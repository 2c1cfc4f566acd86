//! Durable n-gram index on top of redb.
//!
//! Layout (one database file per deployment):
//!
//! | table        | key                         | value                        |
//! |--------------|-----------------------------|------------------------------|
//! | `postings`   | n-gram ++ file id (u32 BE)  | delta-varint offset list     |
//! | `file_keys`  | `repo\0path`                | file id                      |
//! | `files`      | file id                     | JSON [`FileMeta`]            |
//! | `file_grams` | file id                     | concatenated n-grams posted  |
//! | `meta`       | name                        | u64 counter / setting        |
//!
//! All postings of one n-gram form a contiguous key range, so a posting list
//! is one range scan and indexing a file only ever touches its own keys.
//! `file_grams` is the reverse index that lets a file be removed without
//! scanning other postings.
//!
//! Every mutation is a single write transaction. redb admits one writer at a
//! time and readers see the last committed snapshot, so a half-applied update
//! is never visible, including after a crash.

use crate::error::{Result, StorageError};
use crate::index::stats::IndexStats;
use crate::index::types::{FileId, FileKey, FileMeta, IndexConfig, NGram, Posting};
use crate::index::{check_content_len, NGramStore};
use crate::utils::{delta_decode, delta_encode, extract_ngrams, posting_key, split_posting_key};
use redb::{
    Database, ReadTransaction, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use roaring::RoaringBitmap;
use std::fs;
use std::path::{Path, PathBuf};

const POSTINGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("postings");
const FILE_KEYS: TableDefinition<&str, u32> = TableDefinition::new("file_keys");
const FILES: TableDefinition<u32, &[u8]> = TableDefinition::new("files");
const FILE_GRAMS: TableDefinition<u32, &[u8]> = TableDefinition::new("file_grams");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_FILE_ID: &str = "next_file_id";
const NGRAM_LEN: &str = "ngram_len";

/// Compute the successor of a byte prefix for range scans.
///
/// Returns `None` if the prefix is all 0xFF bytes (no upper bound exists).
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last == 0xFF {
            upper.pop();
        } else {
            *last += 1;
            return Some(upper);
        }
    }
    None
}

/// redb-backed implementation of [`NGramStore`].
pub struct DiskIndex {
    db: Database,
    path: PathBuf,
    config: IndexConfig,
}

impl DiskIndex {
    /// Open the index at `path`, creating it on first use.
    ///
    /// Fails if the file exists but was created with a different n-gram
    /// length.
    pub fn open(path: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        let path = path.as_ref();
        if config.ngram_len == 0 {
            return Err(crate::Error::InvalidRequest("n-gram length must be at least 1".into()));
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(path)?;
        let index = Self {
            db,
            path: path.to_path_buf(),
            config,
        };
        index.init()?;
        Ok(index)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create all tables and pin the n-gram length.
    fn init(&self) -> Result<()> {
        let configured = self.config.ngram_len as u64;
        let txn = self.db.begin_write()?;
        {
            txn.open_table(POSTINGS)?;
            txn.open_table(FILE_KEYS)?;
            txn.open_table(FILES)?;
            txn.open_table(FILE_GRAMS)?;

            let mut meta = txn.open_table(META)?;
            let stored = meta.get(NGRAM_LEN)?.map(|v| v.value());
            match stored {
                Some(stored) if stored != configured => {
                    return Err(StorageError::NgramLenMismatch { stored, configured }.into());
                }
                Some(_) => {}
                None => {
                    meta.insert(NGRAM_LEN, configured)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn lookup_file_id(txn: &WriteTransaction, key: &str) -> Result<Option<FileId>> {
        let table = txn.open_table(FILE_KEYS)?;
        let id = table.get(key)?.map(|v| v.value());
        Ok(id)
    }

    fn allocate_file_id(txn: &WriteTransaction, key: &str) -> Result<FileId> {
        let next;
        {
            let mut meta = txn.open_table(META)?;
            next = meta.get(NEXT_FILE_ID)?.map(|v| v.value()).unwrap_or(1);
            meta.insert(NEXT_FILE_ID, next + 1)?;
        }
        let id = FileId::try_from(next)
            .map_err(|_| StorageError::Corrupt("file id space exhausted".into()))?;

        let mut keys = txn.open_table(FILE_KEYS)?;
        keys.insert(key, id)?;
        Ok(id)
    }

    /// Delete the postings a file contributed, using its reverse gram list.
    fn remove_postings(&self, txn: &WriteTransaction, file_id: FileId) -> Result<()> {
        let n = self.config.ngram_len;
        let grams;
        {
            let mut file_grams = txn.open_table(FILE_GRAMS)?;
            grams = file_grams.remove(file_id)?.map(|v| v.value().to_vec());
        }
        let Some(grams) = grams else {
            return Ok(());
        };
        if grams.len() % n != 0 {
            return Err(StorageError::Corrupt(format!(
                "reverse gram list of file {} has length {}, not a multiple of {}",
                file_id,
                grams.len(),
                n
            ))
            .into());
        }

        let mut postings = txn.open_table(POSTINGS)?;
        for gram in grams.chunks_exact(n) {
            postings.remove(posting_key(gram, file_id).as_slice())?;
        }
        Ok(())
    }

    fn insert_postings(
        txn: &WriteTransaction,
        file_id: FileId,
        record: &[u8],
        grams: &[(NGram, Vec<u32>)],
    ) -> Result<()> {
        let mut reverse = Vec::with_capacity(grams.iter().map(|(g, _)| g.len()).sum());
        {
            let mut postings = txn.open_table(POSTINGS)?;
            let mut value = Vec::new();
            for (gram, offsets) in grams {
                value.clear();
                delta_encode(offsets, &mut value);
                postings.insert(posting_key(gram, file_id).as_slice(), value.as_slice())?;
                reverse.extend_from_slice(gram);
            }
        }

        let mut file_grams = txn.open_table(FILE_GRAMS)?;
        file_grams.insert(file_id, reverse.as_slice())?;
        let mut files = txn.open_table(FILES)?;
        files.insert(file_id, record)?;
        Ok(())
    }

    fn load_meta(txn: &ReadTransaction, ids: impl IntoIterator<Item = FileId>) -> Result<Vec<FileMeta>> {
        let files = txn.open_table(FILES)?;
        let mut result = Vec::new();
        for id in ids {
            let record = files.get(id)?.map(|v| v.value().to_vec());
            match record {
                Some(bytes) => {
                    let meta: FileMeta =
                        serde_json::from_slice(&bytes).map_err(StorageError::from)?;
                    result.push(meta);
                }
                None => {
                    return Err(StorageError::Corrupt(format!(
                        "posting references unknown file id {}",
                        id
                    ))
                    .into());
                }
            }
        }
        Ok(result)
    }

    /// File ids with a posting under `gram`.
    fn gram_file_ids(&self, txn: &ReadTransaction, gram: &[u8]) -> Result<RoaringBitmap> {
        let postings = txn.open_table(POSTINGS)?;
        let mut ids = RoaringBitmap::new();

        let upper = prefix_upper_bound(gram);
        let range = match &upper {
            Some(upper) => postings.range::<&[u8]>(gram..upper.as_slice())?,
            None => postings.range::<&[u8]>(gram..)?,
        };
        for entry in range {
            let (key, _) = entry?;
            let (_, id) = split_posting_key(key.value())
                .ok_or_else(|| StorageError::Corrupt("short posting key".into()))?;
            ids.insert(id);
        }
        Ok(ids)
    }
}

impl NGramStore for DiskIndex {
    fn ngram_len(&self) -> usize {
        self.config.ngram_len
    }

    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> Result<()> {
        check_content_len(meta, content)?;
        // Extraction happens before the write transaction so the exclusive
        // section only covers the table updates.
        let grams = extract_ngrams(content, self.config.ngram_len);
        let record = serde_json::to_vec(meta).map_err(StorageError::from)?;
        let key = meta.key().encode();

        let txn = self.db.begin_write()?;
        let file_id = match Self::lookup_file_id(&txn, &key)? {
            Some(id) => {
                self.remove_postings(&txn, id)?;
                id
            }
            None => Self::allocate_file_id(&txn, &key)?,
        };
        Self::insert_postings(&txn, file_id, &record, &grams)?;
        txn.commit()?;
        Ok(())
    }

    fn remove_file(&self, repo: &str, path: &str) -> Result<bool> {
        let key = FileKey::new(repo, path).encode();
        let txn = self.db.begin_write()?;

        let file_id;
        {
            let mut keys = txn.open_table(FILE_KEYS)?;
            file_id = keys.remove(key.as_str())?.map(|v| v.value());
        }
        // Dropping the transaction without commit leaves the index untouched
        let Some(file_id) = file_id else {
            return Ok(false);
        };

        self.remove_postings(&txn, file_id)?;
        {
            let mut files = txn.open_table(FILES)?;
            files.remove(file_id)?;
        }
        txn.commit()?;
        Ok(true)
    }

    fn candidates(&self, grams: &[NGram]) -> Result<Vec<FileMeta>> {
        if grams.is_empty() {
            return self.files(None);
        }

        let txn = self.db.begin_read()?;
        let mut sets = Vec::with_capacity(grams.len());
        for gram in grams {
            let ids = self.gram_file_ids(&txn, gram)?;
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            sets.push(ids);
        }

        // Intersect smallest first
        sets.sort_by_key(|s| s.len());
        let mut sets = sets.into_iter();
        let mut result = sets.next().unwrap_or_default();
        for set in sets {
            result &= set;
            if result.is_empty() {
                return Ok(Vec::new());
            }
        }

        Self::load_meta(&txn, result.iter())
    }

    fn postings(&self, gram: &[u8]) -> Result<Vec<Posting>> {
        let txn = self.db.begin_read()?;
        let mut entries = Vec::new();
        {
            let postings = txn.open_table(POSTINGS)?;
            let upper = prefix_upper_bound(gram);
            let range = match &upper {
                Some(upper) => postings.range::<&[u8]>(gram..upper.as_slice())?,
                None => postings.range::<&[u8]>(gram..)?,
            };
            for entry in range {
                let (key, value) = entry?;
                let (_, id) = split_posting_key(key.value())
                    .ok_or_else(|| StorageError::Corrupt("short posting key".into()))?;
                let offsets = delta_decode(value.value())
                    .ok_or_else(|| StorageError::Corrupt("truncated offset list".into()))?;
                entries.push((id, offsets));
            }
        }

        let metas = Self::load_meta(&txn, entries.iter().map(|(id, _)| *id))?;
        Ok(metas
            .into_iter()
            .zip(entries)
            .map(|(file, (_, offsets))| Posting { file, offsets })
            .collect())
    }

    fn files(&self, repo: Option<&str>) -> Result<Vec<FileMeta>> {
        let txn = self.db.begin_read()?;
        let mut ids = Vec::new();
        {
            let keys = txn.open_table(FILE_KEYS)?;
            match repo {
                Some(repo) => {
                    let start = format!("{}\0", repo);
                    let end = format!("{}\u{1}", repo);
                    for entry in keys.range::<&str>(start.as_str()..end.as_str())? {
                        let (_, id) = entry?;
                        ids.push(id.value());
                    }
                }
                None => {
                    for entry in keys.iter()? {
                        let (_, id) = entry?;
                        ids.push(id.value());
                    }
                }
            }
        }
        Self::load_meta(&txn, ids)
    }

    fn stats(&self) -> Result<IndexStats> {
        let posting_count;
        {
            let txn = self.db.begin_read()?;
            let postings = txn.open_table(POSTINGS)?;
            posting_count = postings.len()?;
        }

        let mut stats = IndexStats::from_files(self.config.ngram_len, &self.files(None)?);
        stats.postings = posting_count;
        stats.size_bytes = fs::metadata(&self.path).map(|m| m.len()).ok();
        Ok(stats)
    }
}
