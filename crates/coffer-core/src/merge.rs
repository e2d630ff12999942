//! Ordered merge of sorted key sequences.
//!
//! The base step of the divide-and-conquer merge used by range queries:
//! two sequences already sorted under the same comparator merge into one,
//! dropping duplicates.

use std::cmp::Ordering;

use crate::operators::Comparator;

/// Merges two comparator-sorted key sequences into one sorted, deduplicated
/// sequence.
pub fn merge_pair(left: Vec<String>, right: Vec<String>, comparator: &dyn Comparator) -> Vec<String> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => match comparator.compare(a, b) {
                Ordering::Less => merged.extend(left.next()),
                Ordering::Greater => merged.extend(right.next()),
                Ordering::Equal => {
                    merged.extend(left.next());
                    right.next();
                }
            },
            (Some(_), None) => merged.extend(left.next()),
            (None, Some(_)) => merged.extend(right.next()),
            (None, None) => break,
        }
    }
    merged
}
