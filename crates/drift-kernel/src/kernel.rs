//! Kernels and bandwidth selection

use drift_core::{Error, Result};
use nalgebra::DMatrix;
use std::borrow::Cow;
use tracing::debug;

/// Positive definite kernel over instance matrices
pub trait Kernel: Send + Sync {
    /// Kernel matrix between the rows of `x` and the rows of `y`
    fn matrix(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Fix data-dependent parameters from `(x, y)`
    fn infer_parameters(&mut self, _x: &DMatrix<f64>, _y: &DMatrix<f64>) -> Result<()> {
        Ok(())
    }

    /// Whether the kernel still derives its parameters from each call's data
    fn requires_inference(&self) -> bool {
        false
    }
}

/// Pairwise squared Euclidean distances between rows
pub fn squared_distances(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    if x.ncols() != y.ncols() {
        return Err(Error::size_mismatch(x.ncols(), y.ncols(), "kernel input features"));
    }
    let xx: Vec<f64> = x.row_iter().map(|r| r.norm_squared()).collect();
    let yy: Vec<f64> = y.row_iter().map(|r| r.norm_squared()).collect();
    let cross = x * y.transpose();
    Ok(DMatrix::from_fn(x.nrows(), y.nrows(), |i, j| {
        (xx[i] + yy[j] - 2.0 * cross[(i, j)]).max(0.0)
    }))
}

/// Median heuristic for the RBF bandwidth
///
/// `dist` holds the squared distances between `x` and `y`. When `x` and `y`
/// are the same sample its zero diagonal is skipped before taking the median.
pub fn median_heuristic_sigma(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    dist: &DMatrix<f64>,
) -> Result<f64> {
    if dist.is_empty() {
        return Err(Error::empty_input("median heuristic"));
    }
    let n = if x.shape() == y.shape() && x == y { x.nrows() } else { 0 };
    let mut sorted: Vec<f64> = dist.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = (n + (sorted.len() - n) / 2).saturating_sub(1);
    let sigma = (0.5 * sorted[idx.min(sorted.len() - 1)]).sqrt();
    Ok(sigma.max(f64::EPSILON))
}

/// Gaussian RBF kernel, averaged over one or more bandwidths
///
/// `k(a, b) = mean_s exp(-|a - b|^2 / (2 sigma_s^2))`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GaussianRbf {
    sigma: Option<Vec<f64>>,
}

impl GaussianRbf {
    /// Kernel with fixed bandwidths
    pub fn new(sigma: Vec<f64>) -> Result<Self> {
        if sigma.is_empty() {
            return Err(Error::InvalidParameter("sigma must not be empty".to_string()));
        }
        if let Some(s) = sigma.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::InvalidParameter(format!(
                "sigma must be positive and finite, got {s}"
            )));
        }
        Ok(Self { sigma: Some(sigma) })
    }

    /// Kernel whose bandwidth comes from the median heuristic
    pub fn inferred() -> Self {
        Self { sigma: None }
    }

    /// Fixed bandwidths when given, the inferred kernel otherwise
    pub fn from_sigma(sigma: Option<Vec<f64>>) -> Result<Self> {
        match sigma {
            Some(s) => Self::new(s),
            None => Ok(Self::inferred()),
        }
    }

    pub fn sigma(&self) -> Option<&[f64]> {
        self.sigma.as_deref()
    }

    fn from_distances(dist: &DMatrix<f64>, sigma: &[f64]) -> DMatrix<f64> {
        let gammas: Vec<f64> = sigma.iter().map(|s| 1.0 / (2.0 * s * s)).collect();
        let n = gammas.len() as f64;
        dist.map(|d| gammas.iter().map(|g| (-g * d).exp()).sum::<f64>() / n)
    }
}

impl Kernel for GaussianRbf {
    fn matrix(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let dist = squared_distances(x, y)?;
        let sigma = match &self.sigma {
            Some(s) => Cow::Borrowed(s.as_slice()),
            None => Cow::Owned(vec![median_heuristic_sigma(x, y, &dist)?]),
        };
        Ok(Self::from_distances(&dist, &sigma))
    }

    fn infer_parameters(&mut self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<()> {
        if self.sigma.is_none() {
            let dist = squared_distances(x, y)?;
            let sigma = median_heuristic_sigma(x, y, &dist)?;
            debug!("Median heuristic bandwidth: {sigma:.6}");
            self.sigma = Some(vec![sigma]);
        }
        Ok(())
    }

    fn requires_inference(&self) -> bool {
        self.sigma.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use drift_core::data::matrix_from_rows;
    use proptest::prelude::*;

    #[test]
    fn test_squared_distances() {
        let x = matrix_from_rows(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
        let y = matrix_from_rows(&[vec![3.0, 4.0]]).unwrap();
        let d = squared_distances(&x, &y).unwrap();
        assert_abs_diff_eq!(d[(0, 0)], 25.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[(1, 0)], 13.0, epsilon = 1e-12);
        assert!(squared_distances(&x, &DMatrix::zeros(1, 3)).is_err());
    }

    #[test]
    fn test_rbf_values() {
        let k = GaussianRbf::new(vec![1.0]).unwrap();
        let x = matrix_from_rows(&[vec![0.0], vec![2.0]]).unwrap();
        let m = k.matrix(&x, &x).unwrap();
        assert_abs_diff_eq!(m[(0, 0)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m[(0, 1)], (-2.0f64).exp(), epsilon = 1e-12);

        let multi = GaussianRbf::new(vec![1.0, 2.0]).unwrap();
        let m = multi.matrix(&x, &x).unwrap();
        let expected = 0.5 * ((-2.0f64).exp() + (-0.5f64).exp());
        assert_abs_diff_eq!(m[(0, 1)], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_median_heuristic_skips_diagonal() {
        // Squared distances 1, 4, 1 off the diagonal (each twice), three zeros on it
        let x = matrix_from_rows(&[vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        let d = squared_distances(&x, &x).unwrap();
        let sigma = median_heuristic_sigma(&x, &x, &d).unwrap();
        // sorted: 0 0 0 1 1 1 1 4 4, index 3 + 3 - 1 = 5 -> 1.0
        assert_abs_diff_eq!(sigma, 0.5f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_inference_is_sticky() {
        let mut k = GaussianRbf::inferred();
        assert!(k.requires_inference());
        let x = matrix_from_rows(&[vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        k.infer_parameters(&x, &x).unwrap();
        assert!(!k.requires_inference());
        let sigma = k.sigma().unwrap().to_vec();

        let other = x.map(|v| v * 10.0);
        k.infer_parameters(&other, &other).unwrap();
        assert_eq!(k.sigma().unwrap(), sigma.as_slice());
    }

    #[test]
    fn test_invalid_sigma() {
        assert!(GaussianRbf::new(vec![]).is_err());
        assert!(GaussianRbf::new(vec![0.0]).is_err());
        assert!(GaussianRbf::new(vec![f64::NAN]).is_err());
    }

    #[test]
    fn test_identical_points_do_not_collapse_bandwidth() {
        let x = DMatrix::from_element(4, 2, 1.0);
        let k = GaussianRbf::inferred();
        let m = k.matrix(&x, &x).unwrap();
        assert!(m.iter().all(|v| v.is_finite()));
    }

    proptest! {
        #[test]
        fn prop_kernel_symmetric_and_bounded(
            values in prop::collection::vec(-5.0f64..5.0, 4..40),
        ) {
            let n = values.len() / 2;
            let x = DMatrix::from_row_slice(n, 2, &values[..2 * n]);
            let m = GaussianRbf::inferred().matrix(&x, &x).unwrap();
            for i in 0..n {
                prop_assert!((m[(i, i)] - 1.0).abs() < 1e-12);
                for j in 0..n {
                    prop_assert!((m[(i, j)] - m[(j, i)]).abs() < 1e-12);
                    prop_assert!(m[(i, j)] >= 0.0 && m[(i, j)] <= 1.0 + 1e-12);
                }
            }
        }
    }
}
