//! Cosine similarity over dense feature rows and sparse interaction rows.
//! A zero vector has similarity 0 with everything.

use ndarray::{Array2, ArrayView1};
use std::collections::BTreeMap;

pub fn cosine(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    let dot = a.dot(&b);
    let magnitude = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if magnitude > 0.0 {
        dot / magnitude
    } else {
        0.0
    }
}

/// Pairwise cosine similarity between the rows of `features`.
pub fn cosine_matrix(features: &Array2<f64>) -> Array2<f64> {
    let n = features.nrows();
    let mut similarity = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let s = cosine(features.row(i), features.row(j));
            similarity[[i, j]] = s;
            similarity[[j, i]] = s;
        }
    }
    similarity
}

/// Cosine similarity of two sparse rows keyed by column id.
pub fn sparse_cosine<K: Ord>(a: &BTreeMap<K, f64>, b: &BTreeMap<K, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(key, val_a)| b.get(key).map(|val_b| val_a * val_b))
        .sum();
    let magnitude = vector_magnitude(a) * vector_magnitude(b);
    if magnitude > 0.0 {
        dot / magnitude
    } else {
        0.0
    }
}

fn vector_magnitude<K>(v: &BTreeMap<K, f64>) -> f64 {
    v.values().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_cosine_basics() {
        let a: Array1<f64> = array![1.0, 0.0];
        let b: Array1<f64> = array![0.0, 2.0];
        let c: Array1<f64> = array![3.0, 0.0];
        assert_eq!(cosine(a.view(), b.view()), 0.0);
        assert!((cosine(a.view(), c.view()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_vector_similarity_is_zero() {
        let zero: Array1<f64> = array![0.0, 0.0];
        let a: Array1<f64> = array![1.0, 1.0];
        assert_eq!(cosine(zero.view(), a.view()), 0.0);
        assert_eq!(cosine(zero.view(), zero.view()), 0.0);
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let features = array![[1.0, 0.5], [0.2, 0.9], [1.0, 0.4]];
        let sim = cosine_matrix(&features);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(sim[[i, j]], sim[[j, i]]);
            }
            assert!((sim[[i, i]] - 1.0).abs() < 1e-12);
        }
        assert!(sim[[0, 2]] > sim[[0, 1]]);
    }

    #[test]
    fn test_sparse_rows() {
        let a = BTreeMap::from([(1, 5.0), (2, 3.0)]);
        let b = BTreeMap::from([(1, 5.0), (2, 3.0)]);
        let c = BTreeMap::from([(3, 4.0)]);
        assert!((sparse_cosine(&a, &b) - 1.0).abs() < 1e-12);
        assert_eq!(sparse_cosine(&a, &c), 0.0);
    }
}
