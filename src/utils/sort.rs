use std::cmp::Ordering;

/// u32-key LSD radix sort for SoA (ids/vals)
/// - Sorts by ids ascending
/// - Reorders vals accordingly
/// - Stable
///
/// Complexity: 4 passes, each O(n + 256)
pub fn radix_sort_u32_soa<N: Copy>(ids: &mut [u32], vals: &mut [N]) {
    assert_eq!(ids.len(), vals.len());
    let n = ids.len();
    if n <= 1 {
        return;
    }

    // 小さい入力は挿入ソートの方が速い
    if n <= 32 {
        insertion_sort_u32_soa(ids, vals);
        return;
    }

    let mut src_ids = ids.to_vec();
    let mut src_vals = vals.to_vec();
    let mut dst_ids = vec![0u32; n];
    let mut dst_vals = src_vals.clone();

    for shift in [0u32, 8, 16, 24] {
        let mut count = [0usize; 256];
        for &k in &src_ids {
            count[((k >> shift) & 0xFF) as usize] += 1;
        }

        // prefix sum -> starting positions
        let mut sum = 0usize;
        for c in count.iter_mut() {
            let tmp = *c;
            *c = sum;
            sum += tmp;
        }

        for idx in 0..n {
            let k = src_ids[idx];
            let bucket = ((k >> shift) & 0xFF) as usize;
            let pos = count[bucket];
            count[bucket] = pos + 1;
            dst_ids[pos] = k;
            dst_vals[pos] = src_vals[idx];
        }

        std::mem::swap(&mut src_ids, &mut dst_ids);
        std::mem::swap(&mut src_vals, &mut dst_vals);
    }

    ids.copy_from_slice(&src_ids);
    vals.copy_from_slice(&src_vals);
}

#[inline]
fn insertion_sort_u32_soa<N: Copy>(ids: &mut [u32], vals: &mut [N]) {
    for i in 1..ids.len() {
        let mut j = i;
        while j > 0 && ids[j] < ids[j - 1] {
            ids.swap(j, j - 1);
            vals.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Indices of `scores` ordered by descending score, ties by ascending index
/// NaN scores sort last. `limit` truncates the result.
pub fn argsort_desc(scores: &[f64], limit: Option<usize>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| desc_then_index(scores[a], a, scores[b], b));
    if let Some(limit) = limit {
        order.truncate(limit);
    }
    order
}

#[inline]
fn desc_then_index(sa: f64, ia: usize, sb: f64, ib: usize) -> Ordering {
    match (sa.is_nan(), sb.is_nan()) {
        (true, true) => ia.cmp(&ib),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => sb.total_cmp(&sa).then_with(|| ia.cmp(&ib)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// stable baseline: sort by (key, original_index)
    fn baseline_stable_sort<N: Copy>(ids: &[u32], vals: &[N]) -> (Vec<u32>, Vec<N>) {
        let mut pairs: Vec<(u32, usize, N)> = ids
            .iter()
            .copied()
            .enumerate()
            .map(|(i, k)| (k, i, vals[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        (
            pairs.iter().map(|p| p.0).collect(),
            pairs.iter().map(|p| p.2).collect(),
        )
    }

    /// tiny deterministic PRNG (xorshift32)
    struct Rng(u32);
    impl Rng {
        fn next_u32(&mut self) -> u32 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            self.0 = x;
            x
        }
    }

    #[test]
    fn radix_sort_handles_empty_and_single() {
        let mut ids: Vec<u32> = vec![];
        let mut vals: Vec<u32> = vec![];
        radix_sort_u32_soa(&mut ids, &mut vals);
        assert!(ids.is_empty());

        let mut ids = vec![42u32];
        let mut vals = vec![7u32];
        radix_sort_u32_soa(&mut ids, &mut vals);
        assert_eq!((ids, vals), (vec![42], vec![7]));
    }

    #[test]
    fn radix_sort_matches_baseline_many_sizes() {
        let mut rng = Rng(0x1234_5678);
        for &n in &[2usize, 7, 31, 32, 33, 64, 129, 1024] {
            let mut ids = Vec::with_capacity(n);
            let mut vals = Vec::with_capacity(n);
            for i in 0..n {
                ids.push(rng.next_u32() & 0x00FF_FFFF);
                vals.push(i as u32);
            }
            let (base_k, base_v) = baseline_stable_sort(&ids, &vals);
            radix_sort_u32_soa(&mut ids, &mut vals);
            assert_eq!(ids, base_k, "ids mismatch at n={n}");
            assert_eq!(vals, base_v, "vals mismatch at n={n}");
        }
    }

    #[test]
    fn argsort_desc_breaks_ties_by_index() {
        let scores = [0.2, 0.9, 0.2, f64::NAN, 0.9];
        assert_eq!(argsort_desc(&scores, None), vec![1, 4, 0, 2, 3]);
        assert_eq!(argsort_desc(&scores, Some(2)), vec![1, 4]);
    }
}
