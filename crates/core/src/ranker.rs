//! Cosine-similarity top-K ranking over borrowed candidate vectors.
//!
//! Candidates without a usable vector (absent, empty, wrong dimension, or
//! containing non-finite values) are dropped before scoring, and an unusable
//! query ranks nothing. A zero-norm vector on either side scores exactly
//! `0.0`. Equal scores keep their input order.

use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub item: T,
    pub similarity: f32,
}

/// Dot product over the product of Euclidean norms, clamped to `[-1, 1]`.
/// Returns `0.0` when either vector has zero norm, the lengths differ, or the
/// sums overflow to a non-finite value.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    if !(dot.is_finite() && left_norm.is_finite() && right_norm.is_finite()) {
        return 0.0;
    }

    (dot / (left_norm.sqrt() * right_norm.sqrt())).clamp(-1.0, 1.0) as f32
}

fn is_usable(candidate: &[f32], dimension: usize) -> bool {
    !candidate.is_empty()
        && candidate.len() == dimension
        && candidate.iter().all(|value| value.is_finite())
}

/// Scores every usable candidate against `query` and keeps the `k` best,
/// highest similarity first.
pub fn top_k<T, V>(
    query: &[f32],
    candidates: impl IntoIterator<Item = (T, Option<V>)>,
    k: usize,
) -> Vec<Ranked<T>>
where
    V: AsRef<[f32]>,
{
    if k == 0 {
        return Vec::new();
    }
    if !is_usable(query, query.len()) {
        debug!(dimension = query.len(), "query vector is not usable");
        return Vec::new();
    }

    let mut skipped = 0usize;
    let mut scored = Vec::new();
    for (item, vector) in candidates {
        match vector {
            Some(vector) if is_usable(vector.as_ref(), query.len()) => scored.push(Ranked {
                similarity: cosine_similarity(query, vector.as_ref()),
                item,
            }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, scored = scored.len(), "candidates without usable vectors");
    }

    // `sort_by` is stable, so ties keep catalog order.
    scored.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
    scored.truncate(k);
    scored
}
