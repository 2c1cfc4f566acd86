use crate::error::{Result, StorageError};
use crate::index::stats::IndexStats;
use crate::index::types::{FileId, FileKey, FileMeta, IndexConfig, NGram, Posting};
use crate::index::{check_content_len, NGramStore};
use crate::utils::extract_ngrams;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct MemoryState {
    next_id: FileId,
    keys: HashMap<FileKey, FileId>,
    files: BTreeMap<FileId, FileMeta>,
    postings: BTreeMap<NGram, BTreeMap<FileId, Vec<u32>>>,
    file_grams: HashMap<FileId, Vec<NGram>>,
}

impl MemoryState {
    fn remove_postings(&mut self, file_id: FileId) {
        for gram in self.file_grams.remove(&file_id).unwrap_or_default() {
            if let Some(list) = self.postings.get_mut(&gram) {
                list.remove(&file_id);
                if list.is_empty() {
                    self.postings.remove(&gram);
                }
            }
        }
    }
}

/// Index held entirely in process memory.
///
/// Same semantics as [`DiskIndex`](crate::index::DiskIndex) without
/// durability; a single `RwLock` makes each mutation atomic to readers.
#[derive(Default)]
pub struct MemoryIndex {
    config: IndexConfig,
    state: RwLock<MemoryState>,
}

impl MemoryIndex {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            state: RwLock::new(MemoryState::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| StorageError::Corrupt("memory index lock poisoned".into()).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| StorageError::Corrupt("memory index lock poisoned".into()).into())
    }
}

impl NGramStore for MemoryIndex {
    fn ngram_len(&self) -> usize {
        self.config.ngram_len
    }

    fn index_file(&self, meta: &FileMeta, content: &[u8]) -> Result<()> {
        check_content_len(meta, content)?;
        let grams = extract_ngrams(content, self.config.ngram_len);
        let key = meta.key();

        let mut state = self.write()?;
        let existing = state.keys.get(&key).copied();
        let file_id = match existing {
            Some(id) => {
                state.remove_postings(id);
                id
            }
            None => {
                state.next_id += 1;
                let id = state.next_id;
                state.keys.insert(key, id);
                id
            }
        };

        let mut reverse = Vec::with_capacity(grams.len());
        for (gram, offsets) in grams {
            state
                .postings
                .entry(gram.clone())
                .or_default()
                .insert(file_id, offsets);
            reverse.push(gram);
        }
        state.file_grams.insert(file_id, reverse);
        state.files.insert(file_id, meta.clone());
        Ok(())
    }

    fn remove_file(&self, repo: &str, path: &str) -> Result<bool> {
        let mut state = self.write()?;
        let Some(file_id) = state.keys.remove(&FileKey::new(repo, path)) else {
            return Ok(false);
        };
        state.remove_postings(file_id);
        state.files.remove(&file_id);
        Ok(true)
    }

    fn candidates(&self, grams: &[NGram]) -> Result<Vec<FileMeta>> {
        let state = self.read()?;
        if grams.is_empty() {
            return Ok(state.files.values().cloned().collect());
        }

        let mut result: Option<BTreeSet<FileId>> = None;
        for gram in grams {
            let ids: BTreeSet<FileId> = state
                .postings
                .get(gram)
                .map(|list| list.keys().copied().collect())
                .unwrap_or_default();
            let narrowed = match result {
                Some(existing) => existing.intersection(&ids).copied().collect(),
                None => ids,
            };
            if narrowed.is_empty() {
                return Ok(Vec::new());
            }
            result = Some(narrowed);
        }

        Ok(result
            .unwrap_or_default()
            .iter()
            .filter_map(|id| state.files.get(id).cloned())
            .collect())
    }

    fn postings(&self, gram: &[u8]) -> Result<Vec<Posting>> {
        let state = self.read()?;
        let Some(list) = state.postings.get(gram) else {
            return Ok(Vec::new());
        };
        Ok(list
            .iter()
            .filter_map(|(id, offsets)| {
                state.files.get(id).map(|file| Posting {
                    file: file.clone(),
                    offsets: offsets.clone(),
                })
            })
            .collect())
    }

    fn files(&self, repo: Option<&str>) -> Result<Vec<FileMeta>> {
        let state = self.read()?;
        Ok(state
            .files
            .values()
            .filter(|meta| repo.is_none_or(|r| meta.repo == r))
            .cloned()
            .collect())
    }

    fn stats(&self) -> Result<IndexStats> {
        let state = self.read()?;
        let files: Vec<FileMeta> = state.files.values().cloned().collect();
        let mut stats = IndexStats::from_files(self.config.ngram_len, &files);
        stats.postings = state.postings.values().map(|list| list.len() as u64).sum();
        Ok(stats)
    }
}
