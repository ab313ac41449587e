use crate::kernel::{ConfigError, ExecInvariantViolation};
use nalgebra::DVector;

/// Tolerances for inverse iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InverseIterationOptions {
    /// Residual `‖(T − λI)v‖ / ‖T‖` accepted as converged.
    pub tolerance: f64,
    /// Maximum number of solves per eigenvector.
    pub max_iterations: usize,
}

impl Default for InverseIterationOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 20,
        }
    }
}

/// Real symmetric tridiagonal matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SymTridiagonal {
    diag: DVector<f64>,
    off: DVector<f64>,
}

/// `LU` factorisation with partial pivoting of `T − σI`.
///
/// `U` has two super-diagonals after pivoting.
struct PivotedLu {
    u0: Vec<f64>,
    u1: Vec<f64>,
    u2: Vec<f64>,
    multipliers: Vec<f64>,
    swapped: Vec<bool>,
}

impl SymTridiagonal {
    /// Build from the diagonal and the off-diagonal (`diag.len() - 1` entries).
    pub fn new(diag: Vec<f64>, off: Vec<f64>) -> Result<Self, ConfigError> {
        if diag.is_empty() {
            return Err(ConfigError::EmptyInput { arg: "diag" });
        }
        if off.len() + 1 != diag.len() {
            return Err(ConfigError::LengthMismatch {
                arg: "off",
                expected: diag.len() - 1,
                got: off.len(),
            });
        }
        if diag.iter().chain(off.iter()).any(|v| !v.is_finite()) {
            return Err(ConfigError::NonFinite { arg: "matrix" });
        }
        Ok(Self {
            diag: DVector::from_vec(diag),
            off: DVector::from_vec(off),
        })
    }

    /// Matrix dimension.
    pub fn len(&self) -> usize {
        self.diag.len()
    }

    /// Always `false`; construction rejects empty matrices.
    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }

    /// Infinity norm, used to scale tolerances.
    pub fn norm(&self) -> f64 {
        (0..self.len())
            .map(|i| {
                let left = if i > 0 { self.off[i - 1].abs() } else { 0.0 };
                let right = if i + 1 < self.len() { self.off[i].abs() } else { 0.0 };
                self.diag[i].abs() + left + right
            })
            .fold(0.0, f64::max)
    }

    /// Gershgorin interval enclosing the spectrum.
    fn gershgorin(&self) -> (f64, f64) {
        let n = self.len();
        (0..n).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), i| {
            let left = if i > 0 { self.off[i - 1].abs() } else { 0.0 };
            let right = if i + 1 < n { self.off[i].abs() } else { 0.0 };
            let r = left + right;
            (lo.min(self.diag[i] - r), hi.max(self.diag[i] + r))
        })
    }

    /// Sturm count: number of eigenvalues strictly below `x`.
    fn count_below(&self, x: f64) -> usize {
        let tiny = f64::MIN_POSITIVE.sqrt();
        let mut count = 0;
        let mut q = 1.0;
        for i in 0..self.len() {
            let coupling = if i > 0 {
                self.off[i - 1] * self.off[i - 1] / q
            } else {
                0.0
            };
            q = self.diag[i] - x - coupling;
            if q == 0.0 {
                q = -tiny;
            }
            if q < 0.0 {
                count += 1;
            }
        }
        count
    }

    /// Eigenvalue of ascending index `index` by bisection.
    fn eigenvalue(&self, index: usize, lo: f64, hi: f64) -> f64 {
        let (mut lo, mut hi) = (lo, hi);
        // Bisection halves the bracket; 1100 steps exhaust any f64 interval.
        for _ in 0..1100 {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            if self.count_below(mid) > index {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// The `k` largest eigenvalues, in descending order.
    pub fn largest_eigenvalues(&self, k: usize) -> Vec<f64> {
        let n = self.len();
        let k = k.min(n);
        let (lo, hi) = self.gershgorin();
        let pad = f64::EPSILON * (lo.abs().max(hi.abs()) + 1.0);
        (0..k)
            .map(|j| self.eigenvalue(n - 1 - j, lo - pad, hi + pad))
            .collect()
    }

    fn factor_shifted(&self, shift: f64) -> PivotedLu {
        let n = self.len();
        let guard = f64::EPSILON * self.norm().max(f64::MIN_POSITIVE);
        let mut u0: Vec<f64> = self.diag.iter().map(|d| d - shift).collect();
        let mut u1: Vec<f64> = self.off.iter().copied().collect();
        let mut u2 = vec![0.0; n.saturating_sub(2)];
        let mut multipliers = vec![0.0; n.saturating_sub(1)];
        let mut swapped = vec![false; n.saturating_sub(1)];

        for i in 0..n.saturating_sub(1) {
            let sub = self.off[i];
            let has_next_super = i + 1 < n - 1;
            if u0[i].abs() >= sub.abs() {
                if u0[i] == 0.0 {
                    u0[i] = guard;
                }
                let m = sub / u0[i];
                multipliers[i] = m;
                u0[i + 1] -= m * u1[i];
            } else {
                let m = u0[i] / sub;
                multipliers[i] = m;
                swapped[i] = true;
                let (old_u1, old_next_diag) = (u1[i], u0[i + 1]);
                let old_next_super = if has_next_super { u1[i + 1] } else { 0.0 };
                u0[i] = sub;
                u1[i] = old_next_diag;
                if has_next_super {
                    u2[i] = old_next_super;
                    u1[i + 1] = -m * old_next_super;
                }
                u0[i + 1] = old_u1 - m * old_next_diag;
            }
        }
        for u in &mut u0 {
            if *u == 0.0 {
                *u = guard;
            }
        }
        PivotedLu {
            u0,
            u1,
            u2,
            multipliers,
            swapped,
        }
    }

    fn residual(&self, v: &DVector<f64>, lambda: f64) -> f64 {
        let n = self.len();
        let mut acc = 0.0;
        for i in 0..n {
            let mut tv = (self.diag[i] - lambda) * v[i];
            if i > 0 {
                tv += self.off[i - 1] * v[i - 1];
            }
            if i + 1 < n {
                tv += self.off[i] * v[i + 1];
            }
            acc += tv * tv;
        }
        acc.sqrt()
    }

    /// Eigenvector for eigenvalue `lambda` by inverse iteration.
    ///
    /// The iterate is kept orthogonal to `previous`, so repeated calls over a
    /// spectrum yield an orthonormal set even for close eigenvalues.
    pub fn eigenvector(
        &self,
        lambda: f64,
        previous: &[DVector<f64>],
        options: &InverseIterationOptions,
    ) -> Result<DVector<f64>, ExecInvariantViolation> {
        let n = self.len();
        if n == 1 {
            return Ok(DVector::from_element(1, 1.0));
        }
        let lu = self.factor_shifted(lambda);
        let scale = self.norm().max(f64::MIN_POSITIVE);
        // A ramp has non-zero projection on both symmetric and antisymmetric vectors.
        let mut v = DVector::from_fn(n, |i, _| 0.5 + (i + 1) as f64 / n as f64);
        v.normalize_mut();

        for _ in 0..options.max_iterations {
            let mut z = lu.solve(v.as_slice());
            for p in previous {
                let proj = z.dot(p);
                z.axpy(-proj, p, 1.0);
            }
            let norm = z.norm();
            if !norm.is_finite() || norm == 0.0 {
                break;
            }
            v = z / norm;
            if self.residual(&v, lambda) <= options.tolerance * scale {
                return Ok(v);
            }
        }
        Err(ExecInvariantViolation::NoConvergence {
            stage: "inverse iteration",
            iterations: options.max_iterations,
        })
    }
}

impl PivotedLu {
    fn solve(&self, rhs: &[f64]) -> DVector<f64> {
        let n = self.u0.len();
        let mut b = rhs.to_vec();
        for i in 0..n.saturating_sub(1) {
            if self.swapped[i] {
                b.swap(i, i + 1);
            }
            b[i + 1] -= self.multipliers[i] * b[i];
        }
        let mut x = DVector::zeros(n);
        for i in (0..n).rev() {
            let mut acc = b[i];
            if i + 1 < n {
                acc -= self.u1[i] * x[i + 1];
            }
            if i + 2 < n {
                acc -= self.u2[i] * x[i + 2];
            }
            x[i] = acc / self.u0[i];
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;

    fn laplacian(n: usize) -> SymTridiagonal {
        SymTridiagonal::new(vec![2.0; n], vec![-1.0; n - 1]).expect("valid matrix")
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(SymTridiagonal::new(vec![], vec![]).is_err());
        assert!(matches!(
            SymTridiagonal::new(vec![1.0, 2.0], vec![]),
            Err(ConfigError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn eigenvalues_match_closed_form() {
        // Eigenvalues of the 1D Laplacian are 2 - 2cos(kπ/(n+1)).
        let n = 12;
        let t = laplacian(n);
        let top = t.largest_eigenvalues(4);
        for (j, lambda) in top.iter().enumerate() {
            let k = (n - j) as f64;
            let expected = 2.0 - 2.0 * (k * core::f64::consts::PI / (n as f64 + 1.0)).cos();
            assert_abs_diff_eq!(*lambda, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn eigenvectors_agree_with_dense_solver() {
        let diag = vec![4.0, 1.0, 3.0, -2.0, 0.5, 2.5];
        let off = vec![1.0, -0.5, 2.0, 0.25, 1.5];
        let t = SymTridiagonal::new(diag.clone(), off.clone()).expect("valid matrix");
        let dense = DMatrix::from_fn(6, 6, |i, j| {
            if i == j {
                diag[i]
            } else if i + 1 == j {
                off[i]
            } else if j + 1 == i {
                off[j]
            } else {
                0.0
            }
        });
        let opts = InverseIterationOptions::default();
        let mut found: Vec<DVector<f64>> = Vec::new();
        for lambda in t.largest_eigenvalues(3) {
            let v = t.eigenvector(lambda, &found, &opts).expect("converges");
            let residual = (&dense * &v - &v * lambda).norm();
            assert!(residual < 1e-8, "residual {residual}");
            found.push(v);
        }
        for i in 0..found.len() {
            for j in 0..found.len() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(found[i].dot(&found[j]), expected, epsilon = 1e-10);
            }
        }
    }
}
