#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Every offset must point at a window that folds to its gram
    for (gram, offsets) in trigrep::utils::extract_ngrams(data, 3) {
        for offset in offsets {
            let start = offset as usize;
            assert_eq!(data[start..start + 3].to_ascii_lowercase(), gram);
        }
    }
    let _ = trigrep::utils::query_ngrams(data, 3, true);
    let _ = trigrep::utils::is_binary(data);
});
