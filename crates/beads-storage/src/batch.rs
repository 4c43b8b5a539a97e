//! IN-clause batching.
//!
//! Large IN-clauses are split into chunks of at most [`MAX_IN_CLAUSE_IDS`]
//! ids per statement; a single unbounded IN is never issued.

/// Hard ceiling on ids per IN-clause.
pub const MAX_IN_CLAUSE_IDS: usize = 20;

/// Yields chunks of at most [`MAX_IN_CLAUSE_IDS`] elements.
pub fn id_chunks<T>(ids: &[T]) -> impl Iterator<Item = &[T]> {
    ids.chunks(MAX_IN_CLAUSE_IDS)
}

/// Builds a `?N,?N+1,...` placeholder list starting at `start` (1-based).
pub fn placeholders(count: usize, start: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", start + i))
        .collect::<Vec<_>>()
        .join(",")
}
