//! Dense symmetric positive-definite linear algebra on top of `ndarray`.
//!
//! Design matrices are SPD for their whole lifetime, so every inverse and
//! solve goes through a Cholesky factorisation `A = L Lᵀ`. A non-positive
//! pivot or a non-finite entry is reported as `NumericInstability` rather
//! than leaking `NaN` into a score.

use ndarray::{Array1, Array2, ArrayView1};
use reco_core::{BanditError, BanditResult};

/// Lower-triangular Cholesky factor of an SPD matrix.
#[derive(Debug, Clone)]
pub struct Cholesky {
    lower: Array2<f64>,
}

impl Cholesky {
    pub fn factor(matrix: &Array2<f64>) -> BanditResult<Self> {
        let n = matrix.nrows();
        if matrix.ncols() != n {
            return Err(BanditError::NumericInstability(format!(
                "cannot factor non-square {}x{} matrix",
                n,
                matrix.ncols()
            )));
        }

        let mut lower = Array2::<f64>::zeros((n, n));
        for j in 0..n {
            let mut diag = matrix[[j, j]];
            for k in 0..j {
                diag -= lower[[j, k]] * lower[[j, k]];
            }
            if !diag.is_finite() || diag <= 0.0 {
                return Err(BanditError::NumericInstability(format!(
                    "matrix is not positive-definite (pivot {j} = {diag})"
                )));
            }
            let pivot = diag.sqrt();
            lower[[j, j]] = pivot;

            for i in (j + 1)..n {
                let mut s = matrix[[i, j]];
                for k in 0..j {
                    s -= lower[[i, k]] * lower[[j, k]];
                }
                lower[[i, j]] = s / pivot;
            }
        }

        Ok(Self { lower })
    }

    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// Solve `L y = rhs`.
    fn forward(&self, rhs: ArrayView1<f64>) -> Array1<f64> {
        let n = self.dim();
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let mut s = rhs[i];
            for k in 0..i {
                s -= self.lower[[i, k]] * y[k];
            }
            y[i] = s / self.lower[[i, i]];
        }
        y
    }

    /// Solve `Lᵀ x = rhs`.
    pub fn solve_upper(&self, rhs: ArrayView1<f64>) -> Array1<f64> {
        let n = self.dim();
        let mut x = Array1::<f64>::zeros(n);
        for i in (0..n).rev() {
            let mut s = rhs[i];
            for k in (i + 1)..n {
                s -= self.lower[[k, i]] * x[k];
            }
            x[i] = s / self.lower[[i, i]];
        }
        x
    }

    /// Solve `A x = rhs`.
    pub fn solve(&self, rhs: ArrayView1<f64>) -> BanditResult<Array1<f64>> {
        let x = self.solve_upper(self.forward(rhs).view());
        ensure_finite(x.view(), "linear solve")?;
        Ok(x)
    }

    /// `A⁻¹`, column by column.
    pub fn inverse(&self) -> BanditResult<Array2<f64>> {
        let n = self.dim();
        let mut inv = Array2::<f64>::zeros((n, n));
        let mut unit = Array1::<f64>::zeros(n);
        for j in 0..n {
            unit[j] = 1.0;
            let col = self.solve_upper(self.forward(unit.view()).view());
            inv.column_mut(j).assign(&col);
            unit[j] = 0.0;
        }
        if inv.iter().any(|v| !v.is_finite()) {
            return Err(BanditError::NumericInstability(
                "matrix inverse produced non-finite values".to_string(),
            ));
        }
        Ok(inv)
    }

    /// `xᵀ A⁻¹ x`, computed as `‖L⁻¹ x‖²`.
    pub fn inverse_quadratic_form(&self, x: ArrayView1<f64>) -> f64 {
        let y = self.forward(x);
        y.dot(&y)
    }
}

pub fn ensure_finite(values: ArrayView1<f64>, what: &str) -> BanditResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(BanditError::NumericInstability(format!(
            "{what} produced non-finite values"
        )))
    }
}

pub fn ensure_finite_scalar(value: f64, what: &str) -> BanditResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(BanditError::NumericInstability(format!(
            "{what} is non-finite ({value})"
        )))
    }
}

pub fn is_symmetric(matrix: &Array2<f64>, tolerance: f64) -> bool {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return false;
    }
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (matrix[[i, j]], matrix[[j, i]]);
            if (a - b).abs() > tolerance * a.abs().max(b.abs()).max(1.0) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_factor_and_inverse() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let chol = Cholesky::factor(&a).unwrap();
        let inv = chol.inverse().unwrap();
        let identity = a.dot(&inv);
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((identity[[i, j]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_solve_matches_inverse() {
        let a = array![[2.0, 0.5, 0.0], [0.5, 3.0, 0.25], [0.0, 0.25, 1.5]];
        let b = array![1.0, -2.0, 0.5];
        let chol = Cholesky::factor(&a).unwrap();
        let x = chol.solve(b.view()).unwrap();
        let via_inverse = chol.inverse().unwrap().dot(&b);
        for i in 0..3 {
            assert!((x[i] - via_inverse[i]).abs() < 1e-12);
        }
        let residual = a.dot(&x) - &b;
        assert!(residual.iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn test_quadratic_form() {
        let a = array![[2.0, 0.0], [0.0, 1.0]];
        let chol = Cholesky::factor(&a).unwrap();
        let q = chol.inverse_quadratic_form(array![1.0, 0.0].view());
        assert!((q - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            Cholesky::factor(&a),
            Err(BanditError::NumericInstability(_))
        ));

        let nan = array![[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(Cholesky::factor(&nan).is_err());
    }

    #[test]
    fn test_symmetry_check() {
        assert!(is_symmetric(&array![[1.0, 0.3], [0.3, 2.0]], 1e-9));
        assert!(!is_symmetric(&array![[1.0, 0.3], [0.4, 2.0]], 1e-9));
    }
}
