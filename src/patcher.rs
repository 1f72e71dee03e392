//! String patcher (spec.md §4.2, component C2).
//!
//! Applies a set of disjoint `(range, replacement)` edits to a source
//! string. Edits need not arrive pre-sorted; [`apply`] sorts by start.

use std::ops::Range;

#[derive(Debug, Clone)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl Edit {
    pub fn new(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Edit {
            range,
            replacement: replacement.into(),
        }
    }
}

/// Apply `edits` to `source`. Panics if any two edits overlap - callers are
/// responsible for the pairwise-disjoint precondition (spec.md §4.2).
pub fn apply(source: &str, edits: &[Edit]) -> String {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|e| e.range.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    let mut prev_end = 0usize;
    for edit in sorted {
        assert!(
            edit.range.start >= prev_end,
            "edits must be pairwise disjoint and sorted: {:?} overlaps previous end {}",
            edit.range,
            prev_end
        );
        out.push_str(&source[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
        prev_end = edit.range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Return a string of `\n` characters matching the newline count inside
/// `range`, so a replacement can preserve line numbers (useful for
/// stack-trace fidelity, per spec.md §4.2).
pub fn blanks(source: &str, range: Range<usize>) -> String {
    let count = source[range].bytes().filter(|&b| b == b'\n').count();
    "\n".repeat(count)
}
