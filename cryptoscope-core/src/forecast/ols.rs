//! Ordinary least squares with an intercept.
//!
//! Columns are standardized on the training rows and the centered normal equations
//! are solved with a Cholesky factorization that skips dependent columns. A column
//! that is constant, or a linear combination of earlier columns, gets coefficient 0,
//! so every fit yields a model.

use super::ForecastError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use std::time::{Duration, Instant};

/// Wall-clock budget for one fit.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
        }
    }

    pub fn check(&self) -> Result<(), ForecastError> {
        match self.limit {
            Some(limit) if self.start.elapsed() > limit => Err(ForecastError::Timeout {
                elapsed_ms: self.start.elapsed().as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

/// A fitted linear model in centered form: `y = target_mean + Σ w_j (x_j - mean_j)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastModel {
    pub feature_means: Array1<f64>,
    pub coefficients: Array1<f64>,
    pub target_mean: f64,
}

impl ForecastModel {
    /// Intercept of the equivalent uncentered model.
    pub fn intercept(&self) -> f64 {
        self.target_mean - self.coefficients.dot(&self.feature_means)
    }

    pub fn predict_one(&self, features: ArrayView1<'_, f64>) -> f64 {
        let centered = &features - &self.feature_means;
        self.target_mean + self.coefficients.dot(&centered)
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_one(row)).collect()
    }
}

/// Relative tolerance below which a Cholesky pivot marks a dependent column.
const PIVOT_TOL: f64 = 1e-9;

/// Fit `y ~ x` by least squares.
///
/// # Errors
/// `DimensionMismatch` on inconsistent shapes or an empty training set, `Timeout`
/// if the deadline passes mid-fit.
pub fn fit(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    deadline: &Deadline,
) -> Result<ForecastModel, ForecastError> {
    let (n, p) = x.dim();
    if n == 0 || n != y.len() {
        return Err(ForecastError::DimensionMismatch {
            rows: n,
            targets: y.len(),
        });
    }
    let n_f = n as f64;

    let target_mean = y.sum() / n_f;
    let feature_means: Array1<f64> = x.columns().into_iter().map(|c| c.sum() / n_f).collect();
    let scales: Array1<f64> = x
        .columns()
        .into_iter()
        .zip(feature_means.iter())
        .map(|(c, &m)| (c.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n_f).sqrt())
        .collect();

    // Zero-variance columns never enter the system.
    let active: Vec<usize> = (0..p)
        .filter(|&j| scales[j] > f64::EPSILON * feature_means[j].abs().max(1.0))
        .collect();
    let k = active.len();

    // Standardized normal equations: A = Z'Z, b = Z'(y - ȳ).
    let mut a = vec![vec![0.0; k]; k];
    let mut b = vec![0.0; k];
    let mut z = vec![0.0; k];
    for (row, &target) in x.rows().into_iter().zip(y.iter()) {
        deadline.check()?;
        for (slot, &j) in z.iter_mut().zip(active.iter()) {
            *slot = (row[j] - feature_means[j]) / scales[j];
        }
        let centered_target = target - target_mean;
        for r in 0..k {
            b[r] += z[r] * centered_target;
            for c in 0..=r {
                a[r][c] += z[r] * z[c];
            }
        }
    }

    let solution = cholesky_solve_skipping(&a, &b, PIVOT_TOL * n_f, deadline)?;

    let mut coefficients = Array1::<f64>::zeros(p);
    for (idx, &j) in active.iter().enumerate() {
        coefficients[j] = solution[idx] / scales[j];
    }

    Ok(ForecastModel {
        feature_means,
        coefficients,
        target_mean,
    })
}

/// Solve `A β = b` for symmetric positive semi-definite `A` given as its lower triangle.
///
/// Columns whose remaining pivot falls below `tol` are treated as dependent and get 0.
fn cholesky_solve_skipping(
    a: &[Vec<f64>],
    b: &[f64],
    tol: f64,
    deadline: &Deadline,
) -> Result<Vec<f64>, ForecastError> {
    let k = b.len();
    // `l[m]` is row m of the factor over kept columns; `kept[m]` is its column index.
    let mut l: Vec<Vec<f64>> = Vec::with_capacity(k);
    let mut kept: Vec<usize> = Vec::with_capacity(k);

    for j in 0..k {
        deadline.check()?;
        let mut row = Vec::with_capacity(kept.len() + 1);
        for (m, &i) in kept.iter().enumerate() {
            let dot: f64 = (0..m).map(|c| row[c] * l[m][c]).sum();
            row.push((a[j][i] - dot) / l[m][m]);
        }
        let pivot = a[j][j] - row.iter().map(|v| v * v).sum::<f64>();
        if pivot <= tol {
            continue;
        }
        row.push(pivot.sqrt());
        l.push(row);
        kept.push(j);
    }

    // Forward substitution: L w = b[kept]
    let r = kept.len();
    let mut w = vec![0.0; r];
    for m in 0..r {
        let dot: f64 = (0..m).map(|c| l[m][c] * w[c]).sum();
        w[m] = (b[kept[m]] - dot) / l[m][m];
    }

    // Back substitution: L' β = w
    let mut beta_kept = vec![0.0; r];
    for m in (0..r).rev() {
        let dot: f64 = ((m + 1)..r).map(|c| l[c][m] * beta_kept[c]).sum();
        beta_kept[m] = (w[m] - dot) / l[m][m];
    }

    let mut beta = vec![0.0; k];
    for (m, &j) in kept.iter().enumerate() {
        beta[j] = beta_kept[m];
    }
    Ok(beta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn fit_unbounded(x: &Array2<f64>, y: &Array1<f64>) -> ForecastModel {
        fit(x.view(), y.view(), &Deadline::unbounded()).unwrap()
    }

    #[test]
    fn recovers_exact_linear_relation() {
        // y = 3 + 2 x1 - 0.5 x2
        let x = array![
            [1.0, 4.0],
            [2.0, 1.0],
            [3.0, 7.0],
            [4.0, 2.0],
            [5.0, 9.0],
            [6.0, 3.0]
        ];
        let y: Array1<f64> = x.rows().into_iter().map(|r| 3.0 + 2.0 * r[0] - 0.5 * r[1]).collect();
        let model = fit_unbounded(&x, &y);

        assert!((model.coefficients[0] - 2.0).abs() < 1e-9);
        assert!((model.coefficients[1] + 0.5).abs() < 1e-9);
        assert!((model.intercept() - 3.0).abs() < 1e-9);
        assert!((model.predict_one(array![10.0, 0.0].view()) - 23.0).abs() < 1e-9);
    }

    #[test]
    fn handles_epoch_scale_timestamps() {
        let t0 = 1_714_521_600.0;
        let x: Array2<f64> = Array2::from_shape_fn((9, 1), |(i, _)| t0 + 3600.0 * i as f64);
        let y: Array1<f64> = x.column(0).mapv(|t| 100.0 + 0.01 * (t - t0));
        let model = fit_unbounded(&x, &y);

        let next = t0 + 3600.0 * 9.0;
        let predicted = model.predict_one(array![next].view());
        assert!((predicted - (100.0 + 0.01 * 3600.0 * 9.0)).abs() < 1e-6);
    }

    #[test]
    fn constant_column_gets_zero_coefficient() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0], [4.0, 7.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let model = fit_unbounded(&x, &y);
        assert_eq!(model.coefficients[1], 0.0);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn collinear_column_is_skipped() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let model = fit_unbounded(&x, &y);
        assert_eq!(model.coefficients[1], 0.0);
        let fitted = model.predict(x.view());
        for (f, t) in fitted.iter().zip(y.iter()) {
            assert!((f - t).abs() < 1e-9);
        }
    }

    #[test]
    fn single_row_predicts_its_target() {
        let x = array![[5.0]];
        let y = array![42.0];
        let model = fit_unbounded(&x, &y);
        assert_eq!(model.predict_one(array![100.0].view()), 42.0);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(matches!(
            fit(x.view(), y.view(), &Deadline::unbounded()),
            Err(ForecastError::DimensionMismatch { rows: 2, targets: 1 })
        ));
    }

    #[test]
    fn expired_deadline_times_out() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 2.0, 3.0];
        let deadline = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(
            fit(x.view(), y.view(), &deadline),
            Err(ForecastError::Timeout { .. })
        ));
    }

    #[test]
    fn fit_is_deterministic() {
        let x = array![[1.0, 0.3], [2.0, 0.1], [3.0, 0.4], [4.0, 0.1], [5.0, 0.5]];
        let y = array![1.1, 2.3, 2.9, 4.2, 5.1];
        assert_eq!(fit_unbounded(&x, &y), fit_unbounded(&x, &y));
    }
}
