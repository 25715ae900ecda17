//! Decimation helper for trajectory output.

/// Keep indices `0, n, 2n, ...` strictly below `len - n`.
///
/// The last `n` elements are never included. `n == 0` yields an empty vector.
pub fn every_nth<T: Clone>(data: &[T], n: usize) -> Vec<T> {
    if n == 0 {
        return Vec::new();
    }

    data.iter()
        .take(data.len().saturating_sub(n))
        .step_by(n)
        .cloned()
        .collect()
}
