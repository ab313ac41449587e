//! Taper families: discrete prolate spheroidal sequences and sine tapers.

mod dpss;
mod sine;

pub use dpss::*;
pub use sine::*;

use ndarray::{Array2, ArrayView1, ArrayView2};

/// DPSS tapers with their concentration eigenvalues.
///
/// Rows of [`TaperSet::tapers`] are orthonormal over the `n` samples of the
/// signal support, and eigenvalues are sorted in descending order in `[0, 1)`.
/// A set is computed once per setup and shared (behind an `Arc`) by every
/// estimator that analyses series on the same basis.
#[derive(Debug, Clone, PartialEq)]
pub struct TaperSet {
    tapers: Array2<f64>,
    eigenvalues: Vec<f64>,
    nw: f64,
}

impl TaperSet {
    pub(crate) fn from_parts(tapers: Array2<f64>, eigenvalues: Vec<f64>, nw: f64) -> Self {
        debug_assert_eq!(tapers.nrows(), eigenvalues.len());
        Self {
            tapers,
            eigenvalues,
            nw,
        }
    }

    /// Signal length the tapers were generated for.
    pub fn n(&self) -> usize {
        self.tapers.ncols()
    }

    /// Number of tapers.
    pub fn n_tapers(&self) -> usize {
        self.tapers.nrows()
    }

    /// Time-bandwidth product.
    pub fn nw(&self) -> f64 {
        self.nw
    }

    /// Taper matrix, `n_tapers × n`.
    pub fn tapers(&self) -> ArrayView2<'_, f64> {
        self.tapers.view()
    }

    /// A single taper.
    pub fn taper(&self, k: usize) -> ArrayView1<'_, f64> {
        self.tapers.row(k)
    }

    /// Concentration eigenvalues, descending.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.eigenvalues
    }

    /// Zero-frequency response `U_k(0) = Σ_t v_k(t)` of each taper.
    ///
    /// Antisymmetric tapers have `U_k(0) ≈ 0`.
    pub fn dc_values(&self) -> Vec<f64> {
        self.tapers.rows().into_iter().map(|row| row.sum()).collect()
    }

    /// Whether `other` was generated with the same length, bandwidth and count.
    pub fn same_basis(&self, other: &TaperSet) -> bool {
        self.n() == other.n() && self.n_tapers() == other.n_tapers() && self.nw == other.nw
    }
}
