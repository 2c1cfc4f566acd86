use crate::error::{Error, Result};
use crate::index::types::FileMeta;
use crate::index::NGramStore;
use crate::query::matcher::LineMatcher;
use crate::query::planner::QueryPlan;
use crate::query::{QueryOptions, SearchMatch, SearchPage, SearchRequest};
use crate::source::ContentSource;
use crate::utils::CancelToken;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::io;
use tracing::{debug, warn};

/// Answers search requests from an n-gram store plus the content source the
/// store was built from.
pub struct QueryEngine<S, C> {
    store: S,
    source: C,
    options: QueryOptions,
}

impl<S: NGramStore, C: ContentSource> QueryEngine<S, C> {
    pub fn new(store: S, source: C, options: QueryOptions) -> Self {
        Self {
            store,
            source,
            options,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn into_parts(self) -> (S, C) {
        (self.store, self.source)
    }

    /// Run a search to completion, or until `cancel` fires.
    pub fn search(&self, request: &SearchRequest, cancel: &CancelToken) -> Result<SearchPage> {
        let plan = QueryPlan::build(request, self.store.ngram_len(), self.options.min_query_len)?;
        let limit = self.options.effective_limit(request.limit);

        let candidates = self.candidates(request, &plan)?;
        debug!(
            query = %request.query,
            candidates = candidates.len(),
            full_scan = plan.is_full_scan(),
            "candidate narrowing done"
        );
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let per_file: Vec<Vec<SearchMatch>> = candidates
            .par_iter()
            .map(|meta| {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                Ok(self.verify_file(meta, &plan.matcher))
            })
            .collect::<Result<_>>()?;

        let mut matches: Vec<SearchMatch> = per_file.into_iter().flatten().collect();
        rank(&mut matches);
        Ok(paginate(matches, limit, request.offset))
    }

    fn candidates(&self, request: &SearchRequest, plan: &QueryPlan) -> Result<Vec<FileMeta>> {
        let files = match &plan.grams {
            Some(grams) => self.store.candidates(grams)?,
            None => self.store.files(request.filters.repo.as_deref())?,
        };
        Ok(files
            .into_iter()
            .filter(|meta| request.filters.matches(meta))
            .collect())
    }

    fn verify_file(&self, meta: &FileMeta, matcher: &LineMatcher) -> Vec<SearchMatch> {
        let content = match self.source.read(&meta.repo, &meta.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(repo = %meta.repo, path = %meta.path, "candidate vanished from source, skipping");
                return Vec::new();
            }
            Err(e) => {
                warn!(repo = %meta.repo, path = %meta.path, error = %e, "failed to read candidate, skipping");
                return Vec::new();
            }
        };
        scan_lines(meta, &content, matcher)
    }
}

/// Match every line of `content`, producing one result per matching line.
pub fn scan_lines(meta: &FileMeta, content: &[u8], matcher: &LineMatcher) -> Vec<SearchMatch> {
    let mut matches = Vec::new();
    for (idx, raw) in content.split(|&b| b == b'\n').enumerate() {
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        let ranges = matcher.find_ranges(line);
        if ranges.is_empty() {
            continue;
        }
        matches.push(SearchMatch {
            repo: meta.repo.clone(),
            path: meta.path.clone(),
            language: meta.language.clone(),
            line: String::from_utf8_lossy(line).into_owned(),
            line_number: (idx + 1) as u32,
            match_ranges: ranges,
        });
    }
    matches
}

/// Densest lines first; ties ordered by location.
fn rank(matches: &mut [SearchMatch]) {
    matches.sort_by(|a, b| {
        b.match_ranges
            .len()
            .cmp(&a.match_ranges.len())
            .then_with(|| location_order(a, b))
    });
}

fn location_order(a: &SearchMatch, b: &SearchMatch) -> Ordering {
    a.repo
        .cmp(&b.repo)
        .then_with(|| a.path.cmp(&b.path))
        .then(a.line_number.cmp(&b.line_number))
}

fn paginate(matches: Vec<SearchMatch>, limit: usize, offset: usize) -> SearchPage {
    let total_count = matches.len();
    let has_more = offset.saturating_add(limit) < total_count;
    let results = matches.into_iter().skip(offset).take(limit).collect();
    SearchPage {
        results,
        total_count,
        has_more,
    }
}
