//! Ordinary least squares with intercept.
//!
//! Solves the centred normal equations `(XcᵀXc + λI) β = Xcᵀyc` by Gaussian
//! elimination with partial pivoting. λ is a vanishing ridge (scaled by the
//! Gram diagonal) so constant or collinear columns never make the system
//! singular; the result is effectively the minimum-norm OLS solution.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

const RIDGE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Fit on `x` (rows = samples) and `y`. Panics never; an empty input
    /// yields the zero model.
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>) -> Self {
        let p = x.ncols();
        let (Some(x_mean), Some(y_mean)) = (x.mean_axis(Axis(0)), y.mean()) else {
            return Self {
                coefficients: vec![0.0; p],
                intercept: 0.0,
            };
        };

        let xc = x - &x_mean;
        let yc = y - y_mean;

        let mut gram = xc.t().dot(&xc);
        let rhs = xc.t().dot(&yc);
        for i in 0..p {
            gram[[i, i]] += RIDGE * gram[[i, i]].max(1.0);
        }

        let beta = match solve(gram, rhs) {
            Some(beta) => beta,
            None => {
                warn!("Normal equations are singular, falling back to mean predictor");
                Array1::zeros(p)
            }
        };

        let intercept = y_mean - beta.dot(&x_mean);
        Self {
            coefficients: beta.to_vec(),
            intercept,
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| self.predict_row(&row.to_vec()))
            .collect()
    }
}

/// Gaussian elimination with partial pivoting. `None` when a pivot vanishes.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot_row, col]].abs() < f64::EPSILON * 1e-3 {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([col, k], [pivot_row, k]);
            }
            b.swap(col, pivot_row);
        }
        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Some(x)
}

pub fn mean_absolute_error(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    (actual - predicted).mapv(f64::abs).sum() / actual.len() as f64
}

/// Coefficient of determination. Zero when the target has no variance.
pub fn r2_score(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let Some(mean) = actual.mean() else {
        return 0.0;
    };
    let ss_tot: f64 = actual.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = (actual - predicted).mapv(|r| r * r).sum();
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_recovers_exact_linear_relation() {
        // y = 2*x0 - 3*x1 + 7
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0], [4.0, 3.0], [0.0, 0.0]];
        let y: Array1<f64> = x.rows().into_iter().map(|r| 2.0 * r[0] - 3.0 * r[1] + 7.0).collect();
        let model = LinearModel::fit(&x, &y);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-6);
        assert!((model.coefficients[1] + 3.0).abs() < 1e-6);
        assert!((model.intercept - 7.0).abs() < 1e-6);
        assert!(r2_score(&y, &model.predict(&x)) > 0.999_999);
    }

    #[test]
    fn test_constant_column_gets_zero_weight() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0]];
        let y = array![10.0, 20.0, 30.0, 40.0];
        let model = LinearModel::fit(&x, &y);
        assert!(model.coefficients[1].abs() < 1e-6);
        assert!((model.predict_row(&[5.0, 5.0]) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_collinear_columns_do_not_blow_up() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        let y = array![1.0, 2.0, 3.0];
        let model = LinearModel::fit(&x, &y);
        assert!(model.coefficients.iter().all(|c| c.is_finite()));
        assert!((model.predict_row(&[4.0, 8.0]) - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_metrics() {
        let actual = array![1.0, 2.0, 3.0];
        let predicted = array![1.0, 3.0, 2.0];
        assert!((mean_absolute_error(&actual, &predicted) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(r2_score(&array![4.0, 4.0], &array![4.0, 5.0]), 0.0);
        assert!((r2_score(&actual, &actual) - 1.0).abs() < 1e-12);
    }
}
