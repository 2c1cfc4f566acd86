use crate::index::types::FileMeta;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary of what an index currently holds
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub ngram_len: usize,
    pub files: u64,
    /// Number of (n-gram, file) posting entries
    pub postings: u64,
    pub files_by_repo: BTreeMap<String, u64>,
    pub files_by_language: BTreeMap<String, u64>,
    /// Size of the backing store, when it lives on disk
    pub size_bytes: Option<u64>,
}

impl IndexStats {
    pub fn from_files(ngram_len: usize, files: &[FileMeta]) -> Self {
        let mut stats = Self {
            ngram_len,
            files: files.len() as u64,
            ..Self::default()
        };
        for file in files {
            *stats.files_by_repo.entry(file.repo.clone()).or_insert(0) += 1;
            let lang = file.language.clone().unwrap_or_else(|| "unknown".to_string());
            *stats.files_by_language.entry(lang).or_insert(0) += 1;
        }
        stats
    }

    /// Display index statistics
    pub fn print(&self) {
        println!("Index Statistics");
        println!("================");
        println!();
        println!("N-gram length:    {}", self.ngram_len);
        println!("File count:       {}", self.files);
        println!("Posting entries:  {}", self.postings);
        if let Some(size) = self.size_bytes {
            println!("Index size:       {}", format_size(size));
        }

        println!();
        println!("Files by repository:");
        for (repo, count) in &self.files_by_repo {
            println!("  {:30} {}", repo, count);
        }

        println!();
        println!("Files by language:");
        let mut sorted: Vec<_> = self.files_by_language.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1));

        for (lang, count) in sorted.iter().take(15) {
            println!("  {:15} {}", lang, count);
        }

        if sorted.len() > 15 {
            println!("  ... and {} more", sorted.len() - 15);
        }
    }
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
