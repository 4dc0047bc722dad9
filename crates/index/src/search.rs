//! Ordered search over ascending slices.
//!
//! Two binary searches share one contract: the slice is sorted ascending and
//! holds no duplicates. `insertion_point` answers "where would this key go" and
//! always returns a position; `find_exact` answers "where is this key" and
//! returns `None` when it is absent, so a miss can never be mistaken for
//! "insert before position 0".

/// Lists shorter than this are searched linearly when looking for an exact key.
pub const LINEAR_SCAN_LIMIT: usize = 100;

/// Returns the leftmost position whose element is not less than `key`.
///
/// Inserting `key` at the returned position keeps the slice sorted.
#[inline]
pub fn insertion_point<T: Ord>(sorted: &[T], key: &T) -> usize {
    sorted.partition_point(|probe| probe < key)
}

/// Returns the position of an element equal to `key`.
#[inline]
pub fn find_exact<T: Ord>(sorted: &[T], key: &T) -> Option<usize> {
    let idx = insertion_point(sorted, key);
    if idx < sorted.len() && sorted[idx] == *key {
        Some(idx)
    } else {
        None
    }
}

/// Finds `key`, scanning linearly on short lists and bisecting on long ones.
pub fn locate<T: Ord>(sorted: &[T], key: &T) -> Option<usize> {
    if sorted.len() < LINEAR_SCAN_LIMIT {
        sorted.iter().position(|probe| probe == key)
    } else {
        find_exact(sorted, key)
    }
}
