//! Near-equal contiguous partitioning of a collection across workers.
//!
//! Boundaries depend only on (length, worker count, worker index), so a
//! fixed input always partitions the same way.

use std::ops::Range;

/// Half-open element range owned by worker `index` out of `workers`.
/// The first `len % workers` workers receive one extra element.
pub fn slice_bounds(len: usize, workers: usize, index: usize) -> Range<usize> {
    assert!(workers > 0, "worker count must be positive");
    assert!(index < workers, "worker index {index} out of {workers}");
    let base = len / workers;
    let rem = len % workers;
    let start = index * base + index.min(rem);
    let end = start + base + usize::from(index < rem);
    start..end
}

/// All worker slices of `items`, in worker-index order. Trailing slices are
/// empty when there are more workers than items.
pub fn slices<T>(items: &[T], workers: usize) -> impl Iterator<Item = &[T]> {
    (0..workers).map(move |i| &items[slice_bounds(items.len(), workers, i)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(len: usize, workers: usize) {
        let items: Vec<usize> = (0..len).collect();
        let mut seen = Vec::new();
        let mut prev_end = 0;
        for (i, slice) in slices(&items, workers).enumerate() {
            let bounds = slice_bounds(len, workers, i);
            assert_eq!(bounds.start, prev_end, "gap or overlap at worker {i}");
            prev_end = bounds.end;
            seen.extend_from_slice(slice);
        }
        assert_eq!(prev_end, len);
        assert_eq!(seen, items, "each element must appear exactly once");
    }

    #[test]
    fn partitions_cover_exactly_once() {
        for (len, workers) in [(10, 3), (10, 1), (12, 4), (7, 7), (100, 13), (0, 4)] {
            assert_covers(len, workers);
        }
    }

    #[test]
    fn sizes_are_near_equal() {
        let items: Vec<u8> = vec![0; 11];
        let sizes: Vec<usize> = slices(&items, 4).map(|s| s.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 2]);
    }

    #[test]
    fn more_workers_than_items_yields_empty_tails() {
        let items = [1, 2, 3];
        let sizes: Vec<usize> = slices(&items, 5).map(|s| s.len()).collect();
        assert_eq!(sizes, vec![1, 1, 1, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "worker count must be positive")]
    fn zero_workers_is_a_programming_error() {
        slice_bounds(10, 0, 0);
    }
}
