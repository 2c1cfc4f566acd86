use crate::error::{Error, Result};
use memchr::memmem;
use regex::bytes::{Regex, RegexBuilder};

/// Compiled-size cap for user supplied patterns
const REGEX_SIZE_LIMIT: usize = 8 * (1 << 20);

/// Verifies a single line and reports the byte ranges that match.
#[derive(Debug, Clone)]
pub enum LineMatcher {
    /// Case-sensitive literal
    Exact(memmem::Finder<'static>),
    /// ASCII case-insensitive literal; the needle is stored lowercased
    AsciiFolded(memmem::Finder<'static>),
    /// Regular expression, or a case-insensitive non-ASCII literal
    Pattern(Regex),
}

impl LineMatcher {
    pub fn literal(needle: &str, case_sensitive: bool) -> Self {
        if case_sensitive {
            LineMatcher::Exact(memmem::Finder::new(needle.as_bytes()).into_owned())
        } else if needle.is_ascii() {
            let folded = needle.to_ascii_lowercase();
            LineMatcher::AsciiFolded(memmem::Finder::new(folded.as_bytes()).into_owned())
        } else {
            // Escaped literals always compile
            match build_regex(&regex::escape(needle), false) {
                Ok(re) => LineMatcher::Pattern(re),
                Err(_) => LineMatcher::Exact(memmem::Finder::new(needle.as_bytes()).into_owned()),
            }
        }
    }

    pub fn pattern(pattern: &str, case_sensitive: bool) -> Result<Self> {
        build_regex(pattern, case_sensitive)
            .map(LineMatcher::Pattern)
            .map_err(|e| Error::InvalidPattern(e.to_string()))
    }

    /// Non-overlapping, non-empty match ranges within `line`, left to right.
    pub fn find_ranges(&self, line: &[u8]) -> Vec<[usize; 2]> {
        match self {
            LineMatcher::Exact(finder) => literal_ranges(finder, line),
            LineMatcher::AsciiFolded(finder) => literal_ranges(finder, &line.to_ascii_lowercase()),
            LineMatcher::Pattern(re) => re
                .find_iter(line)
                .filter(|m| !m.is_empty())
                .map(|m| [m.start(), m.end()])
                .collect(),
        }
    }

    pub fn is_match(&self, line: &[u8]) -> bool {
        match self {
            LineMatcher::Exact(finder) => finder.find(line).is_some(),
            LineMatcher::AsciiFolded(finder) => finder.find(&line.to_ascii_lowercase()).is_some(),
            LineMatcher::Pattern(re) => re.find_iter(line).any(|m| !m.is_empty()),
        }
    }
}

fn build_regex(pattern: &str, case_sensitive: bool) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

fn literal_ranges(finder: &memmem::Finder<'_>, haystack: &[u8]) -> Vec<[usize; 2]> {
    let len = finder.needle().len();
    if len == 0 {
        return Vec::new();
    }
    finder
        .find_iter(haystack)
        .map(|start| [start, start + len])
        .collect()
}
