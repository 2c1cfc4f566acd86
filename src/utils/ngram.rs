use crate::index::types::NGram;
use rustc_hash::FxHashMap;

/// Extract every n-gram of `content` together with the byte offsets at which
/// it starts.
///
/// Grams are ASCII case-folded. Folding never changes a byte's position, so
/// the offsets point into the original content. The result is sorted by gram
/// and each offset list is ascending. Offsets are `u32`; windows starting past
/// `u32::MAX` are not extracted.
pub fn extract_ngrams(content: &[u8], n: usize) -> Vec<(NGram, Vec<u32>)> {
    if n == 0 || content.len() < n {
        return Vec::new();
    }

    let folded = content.to_ascii_lowercase();
    let mut grams: FxHashMap<&[u8], Vec<u32>> = FxHashMap::default();

    for (window, pos) in folded.windows(n).zip(0..=u32::MAX) {
        grams.entry(window).or_default().push(pos);
    }

    let mut result: Vec<(NGram, Vec<u32>)> = grams
        .into_iter()
        .map(|(gram, offsets)| (gram.to_vec(), offsets))
        .collect();
    result.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    result
}

/// Extract the unique n-grams of a query string for candidate lookup.
///
/// With `ascii_only`, grams containing non-ASCII bytes are dropped: under
/// case-insensitive matching a non-ASCII character can match a different
/// byte sequence, so such grams are not guaranteed to be present in a
/// matching file.
pub fn query_ngrams(query: &[u8], n: usize, ascii_only: bool) -> Vec<NGram> {
    if n == 0 || query.len() < n {
        return Vec::new();
    }

    let folded = query.to_ascii_lowercase();
    let mut grams: Vec<NGram> = folded
        .windows(n)
        .filter(|w| !ascii_only || w.is_ascii())
        .map(|w| w.to_vec())
        .collect();
    grams.sort_unstable();
    grams.dedup();
    grams
}

/// Check if content is likely binary
pub fn is_binary(content: &[u8]) -> bool {
    let sample_size = content.len().min(8192);
    let sample = &content[..sample_size];

    // Check for null bytes
    let null_count = sample.iter().filter(|&&b| b == 0).count();
    if null_count > sample_size / 10 {
        return true;
    }

    // Check for high proportion of non-text bytes
    let non_text_count = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    non_text_count > sample_size / 8
}
