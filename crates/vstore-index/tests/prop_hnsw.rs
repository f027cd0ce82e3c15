use proptest::prelude::*;
use vstore_core::{HnswParams, Metric};
use vstore_index::{HnswIndex, VectorIndex};

const D: usize = 4;

fn arb_vector() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(-100.0..100.0, D)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Invariant 4 + the seed-determinism clause of §4.6: identical seed
    /// and insertion order produce identical search results.
    #[test]
    fn deterministic_builds_agree(vectors in proptest::collection::vec(arb_vector(), 5..40)) {
        let params = HnswParams { m: 8, ef_construction: 24, ef_search: 24, seed: 0xC0FFEE };
        let indexed: Vec<(u64, Vec<f64>)> = vectors.iter().cloned().enumerate().map(|(i, v)| (i as u64, v)).collect();

        let mut a = HnswIndex::new(D, Metric::Euclidean, params.clone());
        a.build(&indexed).unwrap();
        let mut b = HnswIndex::new(D, Metric::Euclidean, params);
        b.build(&indexed).unwrap();

        let query = vectors[0].clone();
        prop_assert_eq!(a.search(&query, 3, 0), b.search(&query, 3, 0));
    }

    /// Invariant 1 sibling: inserted vectors are always exactly `D` long
    /// by construction here, so dimension mismatches must be rejected for
    /// anything else.
    #[test]
    fn wrong_dimension_is_always_rejected(extra in 1usize..5) {
        let mut idx = HnswIndex::new(D, Metric::Euclidean, HnswParams::default());
        let bad = vec![0.0; D + extra];
        prop_assert!(idx.insert(1, &bad).is_err());
    }
}
