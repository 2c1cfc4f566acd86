#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use trigrep::query::{QueryPlan, SearchRequest};

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    query: &'a str,
    regex: bool,
    case_sensitive: bool,
    line: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    // Planning must reject bad input with an error, never a panic, and any
    // produced matcher must yield in-bounds, ordered ranges
    let request = SearchRequest::new(input.query)
        .regex(input.regex)
        .case_sensitive(input.case_sensitive);
    if let Ok(plan) = QueryPlan::build(&request, 3, 3) {
        let mut last = 0;
        for [start, end] in plan.matcher.find_ranges(input.line) {
            assert!(start >= last && start < end && end <= input.line.len());
            last = end;
        }
    }
});
