use super::*;
use vector::{cosine, dot, euclidean};

#[test]
fn test_euclidean_distance() {
    let a = [1.0, 2.0, 3.0];
    let b = [4.0, 5.0, 6.0];
    let dist = euclidean(&a, &b);
    assert!((dist - 27.0f64.sqrt()).abs() < 1e-9);
}

#[test]
fn test_cosine_distance() {
    let a = [1.0, 0.0];
    let b = [0.0, 1.0];
    assert!((cosine(&a, &b) - 1.0).abs() < 1e-9);

    let dist_same = cosine(&a, &a);
    assert!(dist_same.abs() < 1e-9);

    let c = [-1.0, 0.0];
    assert!((cosine(&a, &c) - 2.0).abs() < 1e-9);
}

#[test]
fn test_cosine_zero_norm_is_maximal() {
    let zero = [0.0, 0.0];
    let other = [1.0, 1.0];
    assert_eq!(cosine(&zero, &other), 1.0);
}

#[test]
fn test_dot_is_negated() {
    let a = [1.0, 2.0];
    let b = [3.0, 4.0];
    assert_eq!(dot(&a, &b), -(1.0 * 3.0 + 2.0 * 4.0));
}

#[test]
fn test_embedding_rejects_non_finite() {
    assert!(Embedding::new(vec![1.0, f64::NAN]).is_err());
    assert!(Embedding::new(vec![1.0, f64::INFINITY]).is_err());
    assert!(Embedding::new(vec![1.0, 2.0]).is_ok());
}

#[test]
fn test_embedding_dimension_check() {
    let e = Embedding::new(vec![1.0, 2.0, 3.0]).unwrap();
    assert!(e.require_dim(3).is_ok());
    assert!(matches!(
        e.require_dim(4),
        Err(VdbError::DimensionMismatch { expected: 4, got: 3 })
    ));
}

#[test]
fn test_library_rejects_zero_dimension() {
    let result = Library::new(
        "lib".into(),
        "".into(),
        0,
        Metric::Cosine,
        IndexParams::Hnsw(HnswParams::default()),
        MetadataMap::new(),
    );
    assert!(result.is_err());
}
