//! Binary search over an index-addressed ordered sequence.
//!
//! The sequence is never borrowed directly: callers supply `compare(i)` and
//! `ignore(i)` closures, so the same search runs over a slice in tests and over
//! the replicated list in the store.
//!
//! # Ignored elements
//!
//! An element for which `ignore(i)` returns true carries no ordering
//! information (it may be the entry being moved, or an entry that cannot be
//! decoded). When the midpoint is ignored the search splits and runs
//! independently over both sides of it instead of assuming the sides are
//! ordered relative to it. With no ignored elements this is a plain
//! `O(log n)` binary search; each ignored midpoint adds one extra branch, so
//! the worst case (everything ignored) is `O(n)`.

use std::cmp::Ordering;

/// Outcome of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    /// Index of an element comparing equal to the target.
    pub matched: Option<usize>,
    /// Left-most index at which the target can be inserted keeping the order.
    pub insertion_point: usize,
}

impl SearchResult {
    const fn miss(insertion_point: usize) -> Self {
        Self {
            matched: None,
            insertion_point,
        }
    }

    /// The matched index if any, otherwise the insertion point.
    pub fn position(self) -> usize {
        self.matched.unwrap_or(self.insertion_point)
    }
}

/// Searches `[0, len)` where `compare(i)` orders element `i` against the target.
///
/// `Ordering::Less` means element `i` sorts before the target.
pub fn binary_search<C>(len: usize, compare: C) -> SearchResult
where
    C: Fn(usize) -> Ordering,
{
    binary_search_ignoring(len, compare, |_| false)
}

/// Like [`binary_search`], skipping elements for which `ignore(i)` is true.
pub fn binary_search_ignoring<C, I>(len: usize, compare: C, ignore: I) -> SearchResult
where
    C: Fn(usize) -> Ordering,
    I: Fn(usize) -> bool,
{
    search_range(0, len, &compare, &ignore)
}

fn search_range<C, I>(mut left: usize, mut right: usize, compare: &C, ignore: &I) -> SearchResult
where
    C: Fn(usize) -> Ordering,
    I: Fn(usize) -> bool,
{
    while left < right {
        let mid = left + (right - left) / 2;

        if ignore(mid) {
            let lower = search_range(left, mid, compare, ignore);
            if lower.matched.is_some() {
                return lower;
            }
            let upper = search_range(mid + 1, right, compare, ignore);
            if upper.matched.is_some() {
                return upper;
            }

            let insertion_point = if lower.insertion_point < mid {
                lower.insertion_point
            } else if upper.insertion_point > mid + 1 {
                upper.insertion_point
            } else {
                mid
            };
            return SearchResult::miss(insertion_point);
        }

        match compare(mid) {
            Ordering::Less => left = mid + 1,
            Ordering::Greater => right = mid,
            Ordering::Equal => {
                return SearchResult {
                    matched: Some(mid),
                    insertion_point: mid,
                };
            }
        }
    }

    SearchResult::miss(left)
}
