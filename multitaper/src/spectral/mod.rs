//! Multitaper estimators and their result bundles.

mod eigenspec;
mod mtcross;
mod mtspec;
mod sine;
mod weighting;

pub use eigenspec::*;
pub use mtcross::*;
pub use mtspec::*;
pub use sine::*;
pub use weighting::*;

use num_complex::Complex;

/// Univariate estimate bundle.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectralEstimate {
    /// One-sided frequency bins, `k / (n_fft · delta_t)`.
    pub frequencies: Vec<f64>,
    /// One-sided power spectral density.
    pub psd: Vec<f64>,
    /// Effective degrees of freedom per bin.
    pub dof: Vec<f64>,
    /// Harmonic F statistic per bin, when the estimator provides one.
    pub f_statistic: Option<Vec<f64>>,
}

/// Pointwise lower/upper bounds at a stated two-sided confidence level.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConfidenceInterval {
    /// Confidence level in `(0, 1)`.
    pub confidence: f64,
    /// Lower bound per bin.
    pub lower: Vec<f64>,
    /// Upper bound per bin.
    pub upper: Vec<f64>,
}

/// Bivariate estimate bundle.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrossSpectralEstimate {
    /// One-sided frequency bins.
    pub frequencies: Vec<f64>,
    /// One-sided cross power `S_AB`.
    pub cross_power: Vec<Complex<f64>>,
    /// Magnitude-squared coherence in `[0, 1]`.
    pub coherence: Vec<f64>,
    /// Cross-spectral phase `arg S_AB` in `(−π, π]`.
    pub phase: Vec<f64>,
    /// Transfer function in the configured direction.
    pub transfer: Vec<Complex<f64>>,
    /// Effective degrees of freedom per bin.
    pub dof: Vec<f64>,
    /// Coherence bounds.
    pub coherence_bounds: ConfidenceInterval,
    /// Phase bounds in radians.
    pub phase_bounds: ConfidenceInterval,
    /// Transfer-function gain bounds.
    pub gain_bounds: ConfidenceInterval,
}

/// A harmonic line detected by the F-test.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpectralLine {
    /// Line frequency.
    pub frequency: f64,
    /// Index of the frequency bin.
    pub bin: usize,
    /// Complex amplitude estimate `μ`.
    pub amplitude: Complex<f64>,
    /// F statistic at the line.
    pub f_statistic: f64,
    /// Power carried by the line, `2|μ|²` for a real series.
    pub power: f64,
}

/// Background spectrum after line removal.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReshapedSpectrum {
    /// One-sided frequency bins.
    pub frequencies: Vec<f64>,
    /// One-sided PSD with the detected lines removed.
    pub psd: Vec<f64>,
    /// Degrees of freedom of the background estimate.
    pub dof: Vec<f64>,
    /// Removed lines, in ascending frequency.
    pub lines: Vec<SpectralLine>,
}

pub(crate) fn onesided_freqs(n_fft: usize, delta_t: f64) -> Vec<f64> {
    let n_freq = n_fft / 2 + 1;
    let scale = 1.0 / (n_fft as f64 * delta_t);
    (0..n_freq).map(|k| k as f64 * scale).collect()
}

/// `2` on interior bins, `1` at DC and at the Nyquist bin of an even transform.
pub(crate) fn onesided_factor(k: usize, n_fft: usize) -> f64 {
    if k == 0 || (n_fft.is_multiple_of(2) && k == n_fft / 2) {
        1.0
    } else {
        2.0
    }
}

pub(crate) fn onesided<T>(values: impl IntoIterator<Item = T>, n_fft: usize) -> Vec<T>
where
    T: core::ops::Mul<f64, Output = T>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(k, v)| v * onesided_factor(k, n_fft))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onesided_doubling_skips_dc_and_nyquist() {
        assert_eq!(onesided(vec![1.0; 5], 8), vec![1.0, 2.0, 2.0, 2.0, 1.0]);
        assert_eq!(onesided(vec![1.0; 4], 7), vec![1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn frequencies_scale_with_sampling_interval() {
        let f = onesided_freqs(8, 0.5);
        assert_eq!(f, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }
}
