use crate::error::{Error, Result};
use crate::index::types::NGram;
use crate::query::matcher::LineMatcher;
use crate::query::SearchRequest;
use crate::utils::query_ngrams;

/// ASCII letters that Unicode simple case folding also maps from non-ASCII
/// characters: `k` from KELVIN SIGN, `s` from LATIN SMALL LETTER LONG S.
const UNICODE_FOLD_ALIASED: &[u8] = b"ks";

/// How a request will be executed: which n-grams narrow the candidate set
/// and which matcher verifies candidate lines.
#[derive(Debug)]
pub struct QueryPlan {
    /// `None` means no usable n-gram could be derived and every file is a
    /// candidate
    pub grams: Option<Vec<NGram>>,
    pub matcher: LineMatcher,
}

impl QueryPlan {
    /// Validate a request and build its plan. Performs no storage access,
    /// so invalid requests are rejected before the index is touched.
    pub fn build(request: &SearchRequest, ngram_len: usize, min_query_len: usize) -> Result<Self> {
        let query = request.query.as_str();
        if query.len() < min_query_len.max(1) {
            return Err(Error::QueryTooShort {
                min: min_query_len.max(1),
                actual: query.len(),
            });
        }

        let (matcher, narrowing) = if request.regex {
            let matcher = LineMatcher::pattern(query, request.case_sensitive)?;
            (matcher, extract_regex_prefix(query))
        } else {
            let matcher = LineMatcher::literal(query, request.case_sensitive);
            (matcher, Some(query.to_string()))
        };

        // The regex verifier folds case per Unicode, the index per ASCII only
        let unicode_folding = !request.case_sensitive && (request.regex || !query.is_ascii());
        let grams = narrowing
            .map(|text| {
                let mut grams = query_ngrams(text.as_bytes(), ngram_len, !request.case_sensitive);
                if unicode_folding {
                    grams.retain(|gram| !gram.iter().any(|b| UNICODE_FOLD_ALIASED.contains(b)));
                }
                grams
            })
            .filter(|grams| !grams.is_empty());

        Ok(Self { grams, matcher })
    }

    pub fn is_full_scan(&self) -> bool {
        self.grams.is_none()
    }
}

/// Extract a literal run that every match of `pattern` must contain.
///
/// Only the leading run is considered. Returns `None` when the pattern has
/// an alternation anywhere, since then no single literal is required.
fn extract_regex_prefix(pattern: &str) -> Option<String> {
    if has_alternation(pattern) {
        return None;
    }

    let mut prefix = String::new();
    let mut chars = pattern.chars().peekable();

    if chars.peek() == Some(&'^') {
        chars.next();
    }

    while let Some(ch) = chars.next() {
        let literal = match ch {
            '\\' => match chars.next() {
                Some('t') => '\t',
                Some('r') => '\r',
                // Classes and assertions such as \d, \w, \b end the run
                Some(c) if c.is_ascii_alphanumeric() => break,
                Some(c) => c,
                None => break,
            },
            '.' | '*' | '+' | '?' | '[' | ']' | '(' | ')' | '{' | '}' | '$' | '^' => break,
            c => c,
        };

        // A quantifier that allows zero repetitions makes the last char optional
        if matches!(chars.peek(), Some('?') | Some('*') | Some('{')) {
            break;
        }
        prefix.push(literal);
    }

    if prefix.is_empty() { None } else { Some(prefix) }
}

/// True if the pattern contains an unescaped `|`.
fn has_alternation(pattern: &str) -> bool {
    let mut escaped = false;
    for ch in pattern.chars() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '|' => return true,
            _ => {}
        }
    }
    false
}
