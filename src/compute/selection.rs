//! Biased sampling without replacement.
//!
//! Each draw maps a uniform variate `u ∈ [0, 1)` to `floor(len · u^(1/bias))`
//! in the remaining pool and removes that element. `bias = 1` is plain
//! uniform sampling without replacement; `bias > 1` concentrates
//! `u^(1/bias)` near 1, so draws favour the end of the pool order. Callers
//! choose what is favoured by how they order the pool.

use rand::Rng;

use crate::error::{Result, SearchError};

/// Draw `k` distinct elements from `pool` without replacement.
pub fn biased_choice<T: Clone, R: Rng + ?Sized>(
    pool: &[T],
    k: usize,
    bias: f64,
    rng: &mut R,
) -> Result<Vec<T>> {
    let indices = biased_indices(pool.len(), k, bias, rng)?;
    Ok(indices.into_iter().map(|i| pool[i].clone()).collect())
}

/// Index form of [`biased_choice`]: positions into a pool of length `len`.
pub fn biased_indices<R: Rng + ?Sized>(
    len: usize,
    k: usize,
    bias: f64,
    rng: &mut R,
) -> Result<Vec<usize>> {
    if k > len {
        return Err(SearchError::InvalidArgument(format!(
            "cannot choose {k} items from a pool of {len}"
        )));
    }
    if !(bias > 0.0 && bias.is_finite()) {
        return Err(SearchError::InvalidArgument(format!(
            "bias exponent must be positive, got {bias}"
        )));
    }

    let mut remaining: Vec<usize> = (0..len).collect();
    let mut chosen = Vec::with_capacity(k);
    let exponent = 1.0 / bias;

    for _ in 0..k {
        let u: f64 = rng.r#gen();
        let position = ((remaining.len() as f64) * u.powf(exponent)) as usize;
        // u^(1/bias) can round up to 1.0 for u just below 1.
        let position = position.min(remaining.len() - 1);
        chosen.push(remaining.remove(position));
    }

    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_returns_k_distinct() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool: Vec<u32> = (0..50).collect();
        for k in [0, 1, 10, 50] {
            let picked = biased_choice(&pool, k, 4.0, &mut rng).unwrap();
            assert_eq!(picked.len(), k);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), k);
        }
    }

    #[test]
    fn test_full_uniform_draw_is_permutation() {
        let mut rng = StdRng::seed_from_u64(3);
        let pool: Vec<u32> = (0..20).collect();
        let mut shuffled = biased_choice(&pool, pool.len(), 1.0, &mut rng).unwrap();
        shuffled.sort_unstable();
        assert_eq!(shuffled, pool);
    }

    #[test]
    fn test_k_larger_than_pool() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = biased_choice(&[1, 2, 3], 4, 1.0, &mut rng).unwrap_err();
        assert!(matches!(err, SearchError::InvalidArgument(_)));
    }

    #[test]
    fn test_invalid_bias() {
        let mut rng = StdRng::seed_from_u64(0);
        for bias in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(biased_choice(&[1, 2, 3], 1, bias, &mut rng).is_err());
        }
    }

    #[test]
    fn test_bias_favours_end_of_pool() {
        let mut rng = StdRng::seed_from_u64(11);
        let trials = 2000;
        let mut last_hits = 0;
        let mut first_hits = 0;
        for _ in 0..trials {
            let picked = biased_indices(10, 1, 8.0, &mut rng).unwrap();
            if picked[0] == 9 {
                last_hits += 1;
            }
            if picked[0] == 0 {
                first_hits += 1;
            }
        }
        // P(index 9) = 1 - 0.9^8 ≈ 0.57, P(index 0) = 0.1^8.
        assert!(last_hits > trials / 2 - 100);
        assert_eq!(first_hits, 0);
    }

    #[test]
    fn test_reproducible_with_seed() {
        let pool: Vec<u32> = (0..30).collect();
        let a = biased_choice(&pool, 12, 3.0, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = biased_choice(&pool, 12, 3.0, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_keep_all_is_multiset_equal() {
        let pool = vec![5, 1, 4, 1, 3];
        for bias in [1.0, 2.0, 4.0, 50.0] {
            let mut rng = StdRng::seed_from_u64(bias as u64);
            let mut picked = biased_choice(&pool, 5, bias, &mut rng).unwrap();
            picked.sort_unstable();
            assert_eq!(picked, vec![1, 1, 3, 4, 5]);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn draws_are_distinct_members(
                seed in any::<u64>(),
                len in 0usize..64,
                frac in 0.0f64..=1.0,
                bias in 1.0f64..16.0,
            ) {
                let k = ((len as f64) * frac) as usize;
                let mut rng = StdRng::seed_from_u64(seed);
                let picked = biased_indices(len, k, bias, &mut rng).unwrap();
                prop_assert_eq!(picked.len(), k);
                prop_assert!(picked.iter().all(|i| *i < len));
                let unique: HashSet<_> = picked.iter().collect();
                prop_assert_eq!(unique.len(), k);
            }
        }
    }
}
