//! In-process external merge sort (spec.md §4.3.1, Design Notes §9).
//!
//! The original Sleuthkit index builder shells out to the system `sort`
//! utility. Here the same external-merge-sort shape — split into
//! memory-bounded, individually-sorted runs on disk, then k-way merge them —
//! is done in-process, grounded on the teacher's `sort::core`: chunks are
//! parallel-sorted with `rayon::par_sort_unstable_by` and the runs are
//! merged with a `BinaryHeap` keyed by a sequence number for stability.

pub mod core;

pub use core::{ExternalSorter, SortEntry, DEFAULT_MEMORY_BUDGET};
