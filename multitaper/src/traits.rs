//! Trait interfaces for the estimation pipeline.
//!
//! Estimators are constructed through [`crate::kernel::KernelLifecycle`] and then
//! exposed through the capabilities below, so the univariate DPSS and sine-taper
//! paths (and their bivariate counterparts) can be consumed interchangeably.

use crate::kernel::ExecInvariantViolation;
use crate::spectral::{CrossSpectralEstimate, SpectralEstimate};
use crate::taper::TaperSet;

/// Taper-family generation capability.
pub trait TaperGenerate {
    /// Generate the taper set.
    fn run(&self) -> Result<TaperSet, ExecInvariantViolation>;
}

/// Univariate spectral estimator.
pub trait SpectralEstimator {
    /// One-sided frequency bins in cycles per unit of `delta_t`.
    fn frequencies(&self) -> &[f64];

    /// One-sided power spectral density.
    fn psd(&self) -> &[f64];

    /// Effective degrees of freedom per bin.
    fn dof(&self) -> &[f64];

    /// Collect the estimate into an owned result bundle.
    fn estimate(&self) -> SpectralEstimate;
}

/// Bivariate spectral estimator.
pub trait CrossSpectralEstimator {
    /// Borrow the cross-spectral result bundle.
    fn cross_estimate(&self) -> &CrossSpectralEstimate;
}
