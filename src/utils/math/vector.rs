use std::cmp::Ordering;

use num::Float;

/// ドット積
///
/// # Arguments
/// * `a` - dense vector
/// * `b` - dense vector of the same length
///
/// # Returns
/// * `N` - dot product
#[inline]
pub fn dot<N: Float>(a: &[N], b: &[N]) -> N {
    debug_assert_eq!(
        a.len(),
        b.len(),
        "Vectors must be of the same length to compute dot product."
    );
    a.iter()
        .zip(b.iter())
        .fold(N::zero(), |acc, (&x, &y)| acc + x * y)
}

#[inline]
pub fn norm<N: Float>(a: &[N]) -> N {
    dot(a, a).sqrt()
}

/// Cosine similarity of two dense vectors
/// Returns `None` when either vector has zero norm (the angle is undefined).
pub fn cosine<N: Float>(a: &[N], b: &[N]) -> Option<N> {
    let denom = norm(a) * norm(b);
    if denom.is_zero() || !denom.is_finite() {
        return None;
    }
    Some(dot(a, b) / denom)
}

/// Sparse dot product over (index, value) pairs sorted by index ascending
///
/// Merge-join over the two index lists, O(nnz_a + nnz_b).
pub fn sparse_dot<N: Float>(a: &[(u32, N)], b: &[(u32, N)]) -> N {
    let mut result = N::zero();
    if a.is_empty() || b.is_empty() {
        return result;
    }
    let mut i = 0;
    let mut j = 0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            Ordering::Equal => {
                result = result + a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    result
}

#[inline]
pub fn sparse_norm<N: Float>(a: &[(u32, N)]) -> N {
    a.iter()
        .fold(N::zero(), |acc, &(_, v)| acc + v * v)
        .sqrt()
}

/// Cosine similarity of two sorted sparse vectors
/// `None` when either side has zero norm.
pub fn sparse_cosine<N: Float>(a: &[(u32, N)], b: &[(u32, N)]) -> Option<N> {
    let denom = sparse_norm(a) * sparse_norm(b);
    if denom.is_zero() || !denom.is_finite() {
        return None;
    }
    Some(sparse_dot(a, b) / denom)
}

/// Rescale a non-negative vector so that it sums to one
///
/// # Returns
/// * `bool` - false if the sum was zero or not finite (vector left untouched)
pub fn normalize_in_place<N: Float>(v: &mut [N]) -> bool {
    let sum = v.iter().fold(N::zero(), |acc, &x| acc + x);
    if sum.is_zero() || !sum.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x = *x / sum;
    }
    true
}

/// Index of the largest element, lowest index wins on ties
/// NaN entries are never selected.
pub fn argmax<N: Float>(v: &[N]) -> Option<usize> {
    let mut best: Option<(usize, N)> = None;
    for (idx, &x) in v.iter().enumerate() {
        if x.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if x <= b => {}
            _ => best = Some((idx, x)),
        }
    }
    best.map(|(idx, _)| idx)
}
