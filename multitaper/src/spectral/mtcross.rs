use super::{onesided_factor, ConfidenceInterval, CrossSpectralEstimate, MtSpec, Weights};
use crate::kernel::{ConfigError, ExecInvariantViolation, KernelLifecycle};
use crate::setup::MultitaperSetup;
use crate::stats::{mean, normal_quantile, upper_tail};
use crate::traits::{CrossSpectralEstimator, SpectralEstimator};
use core::f64::consts::PI;
use ndarray::ArrayView2;
use num_complex::Complex;
use std::sync::Arc;

/// Which series is treated as the input of the transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferDirection {
    /// `H = conj(S_AB) / S_AA`, so that `B ≈ H · A`.
    #[default]
    AToB,
    /// `H = S_AB / S_BB`, so that `A ≈ H · B`.
    BToA,
}

/// Constructor config for [`CrossKernel`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrossConfig {
    /// Transfer-function direction.
    pub direction: TransferDirection,
    /// Two-sided confidence level of the reported bounds.
    pub confidence: f64,
}

impl Default for CrossConfig {
    fn default() -> Self {
        Self {
            direction: TransferDirection::AToB,
            confidence: 0.95,
        }
    }
}

/// Validated bivariate estimator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossKernel {
    direction: TransferDirection,
    confidence: f64,
}

impl KernelLifecycle for CrossKernel {
    type Config = CrossConfig;

    fn try_new(config: Self::Config) -> Result<Self, ConfigError> {
        if !(config.confidence > 0.0 && config.confidence < 1.0) {
            return Err(ConfigError::InvalidArgument {
                arg: "confidence",
                reason: "confidence level must lie in (0, 1)",
            });
        }
        Ok(Self {
            direction: config.direction,
            confidence: config.confidence,
        })
    }
}

impl CrossKernel {
    /// Transfer-function direction.
    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    /// Confidence level of the bounds.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Combine two estimates computed on the same basis.
    pub fn run(&self, a: &MtSpec, b: &MtSpec) -> Result<MtCross, ExecInvariantViolation> {
        check_basis(a, b)?;
        let n_tapers = a.setup().n_tapers();
        let wa = a.weights().weights();
        let wb = b.weights().weights();
        let columns: Vec<Vec<f64>> = (0..wa.ncols())
            .map(|f| {
                wa.column(f)
                    .iter()
                    .zip(wb.column(f).iter())
                    .map(|(x, y)| x.min(*y))
                    .collect()
            })
            .collect();
        let shared = Weights::from_columns(columns, n_tapers);
        let water_level = match self.direction {
            TransferDirection::AToB => a.setup().water_level(),
            TransferDirection::BToA => b.setup().water_level(),
        };
        let stats = cross_statistics(
            a.eigenspectra().coefficients(),
            b.eigenspectra().coefficients(),
            &shared,
            a.frequencies().to_vec(),
            a.setup().delta_t(),
            water_level,
            self,
        )?;
        Ok(MtCross {
            kernel: *self,
            weights: shared,
            stats,
        })
    }
}

fn check_basis(a: &MtSpec, b: &MtSpec) -> Result<(), ExecInvariantViolation> {
    if !Arc::ptr_eq(a.tapers(), b.tapers()) && !a.tapers().same_basis(b.tapers()) {
        return Err(ExecInvariantViolation::BasisMismatch {
            reason: "taper sets differ in length, bandwidth or count",
        });
    }
    if a.setup().n_fft() != b.setup().n_fft() {
        return Err(ExecInvariantViolation::BasisMismatch {
            reason: "transform lengths differ",
        });
    }
    if a.setup().delta_t() != b.setup().delta_t() {
        return Err(ExecInvariantViolation::BasisMismatch {
            reason: "sampling intervals differ",
        });
    }
    Ok(())
}

/// Cross-spectral statistics of two series.
///
/// Both series are weighted with `min(w_A, w_B)` per taper and bin, renormalised,
/// so the coherence is a proper ratio of spectra sharing one weighting.
#[derive(Debug, Clone)]
pub struct MtCross {
    kernel: CrossKernel,
    weights: Weights,
    stats: CrossStatistics,
}

/// Estimate plus the auto-spectra recomputed with the shared weights.
#[derive(Debug, Clone)]
pub(crate) struct CrossStatistics {
    pub(crate) estimate: CrossSpectralEstimate,
    pub(crate) psd_a: Vec<f64>,
    pub(crate) psd_b: Vec<f64>,
}

impl MtCross {
    /// Cross-analyse two estimates that share a taper basis.
    pub fn new(
        a: &MtSpec,
        b: &MtSpec,
        config: CrossConfig,
    ) -> Result<Self, ExecInvariantViolation> {
        CrossKernel::try_new(config)?.run(a, b)
    }

    /// Build one taper basis and cross-analyse two setups on it.
    pub fn from_setups(
        a: MultitaperSetup,
        b: MultitaperSetup,
        config: CrossConfig,
    ) -> Result<Self, ExecInvariantViolation> {
        let kernel = CrossKernel::try_new(config)?;
        let a = MtSpec::new(a)?;
        let b = MtSpec::with_tapers(b, Arc::clone(a.tapers()))?;
        kernel.run(&a, &b)
    }

    /// Settings used for this analysis.
    pub fn kernel(&self) -> &CrossKernel {
        &self.kernel
    }

    /// Shared per-bin weights.
    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// PSD of series A under the shared weights.
    pub fn psd_a(&self) -> &[f64] {
        &self.stats.psd_a
    }

    /// PSD of series B under the shared weights.
    pub fn psd_b(&self) -> &[f64] {
        &self.stats.psd_b
    }

    /// Consume the analysis and return its result bundle.
    pub fn into_estimate(self) -> CrossSpectralEstimate {
        self.stats.estimate
    }
}

impl CrossSpectralEstimator for MtCross {
    fn cross_estimate(&self) -> &CrossSpectralEstimate {
        &self.stats.estimate
    }
}

/// Per-bin cross statistics from eigencoefficients and normalised shared weights.
///
/// Only the first `weights.weights().nrows()` rows of `ya` and `yb` are used. The
/// transfer-function denominator is floored at `water_level` times the mean
/// auto-spectrum of the input series.
pub(crate) fn cross_statistics(
    ya: ArrayView2<'_, Complex<f64>>,
    yb: ArrayView2<'_, Complex<f64>>,
    weights: &Weights,
    frequencies: Vec<f64>,
    delta_t: f64,
    water_level: f64,
    kernel: &CrossKernel,
) -> Result<CrossStatistics, ExecInvariantViolation> {
    let n_fft = ya.ncols();
    if yb.ncols() != n_fft {
        return Err(ExecInvariantViolation::LengthMismatch {
            arg: "yb",
            expected: n_fft,
            got: yb.ncols(),
        });
    }
    let z = normal_quantile(upper_tail(kernel.confidence)?)?;
    let w = weights.weights();
    let n_freq = w.ncols();

    let mut cross_power = Vec::with_capacity(n_freq);
    let mut psd_a = Vec::with_capacity(n_freq);
    let mut psd_b = Vec::with_capacity(n_freq);
    for f in 0..n_freq {
        let scale = delta_t * onesided_factor(f, n_fft);
        let mut cross = Complex::new(0.0, 0.0);
        let mut saa = 0.0;
        let mut sbb = 0.0;
        for (k, wk) in w.column(f).iter().enumerate() {
            let w2 = wk * wk;
            let (a, b) = (ya[[k, f]], yb[[k, f]]);
            cross += a * b.conj() * w2;
            saa += w2 * a.norm_sqr();
            sbb += w2 * b.norm_sqr();
        }
        cross_power.push(cross * scale);
        psd_a.push(saa * scale);
        psd_b.push(sbb * scale);
    }

    let input_psd = match kernel.direction {
        TransferDirection::AToB => &psd_a,
        TransferDirection::BToA => &psd_b,
    };
    let (mean_input, _): (f64, usize) = mean(input_psd.iter());
    let floor = water_level * mean_input;

    let mut estimate = CrossSpectralEstimate {
        frequencies,
        dof: weights.dof().to_vec(),
        coherence_bounds: bounds(kernel.confidence, n_freq),
        phase_bounds: bounds(kernel.confidence, n_freq),
        gain_bounds: bounds(kernel.confidence, n_freq),
        ..CrossSpectralEstimate::default()
    };
    for (f, &cross) in cross_power.iter().enumerate() {
        let (saa, sbb) = (psd_a[f], psd_b[f]);
        let denom = saa * sbb;
        let coherence = if denom > 0.0 {
            (cross.norm_sqr() / denom).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let transfer = match kernel.direction {
            TransferDirection::AToB if saa.max(floor) > 0.0 => cross.conj() / saa.max(floor),
            TransferDirection::BToA if sbb.max(floor) > 0.0 => cross / sbb.max(floor),
            _ => Complex::new(0.0, 0.0),
        };
        let phase = cross.arg();
        let nu = estimate.dof[f];

        let (lo, hi) = coherence_bounds(coherence, nu, z);
        estimate.coherence_bounds.lower.push(lo);
        estimate.coherence_bounds.upper.push(hi);

        let spread = relative_spread(coherence, nu, z);
        let half = spread.min(PI);
        estimate.phase_bounds.lower.push(phase - half);
        estimate.phase_bounds.upper.push(phase + half);

        let gain = transfer.norm();
        let (lo, hi) = if spread.is_finite() {
            ((gain * (1.0 - spread)).max(0.0), gain * (1.0 + spread))
        } else {
            (0.0, f64::INFINITY)
        };
        estimate.gain_bounds.lower.push(lo);
        estimate.gain_bounds.upper.push(hi);

        estimate.coherence.push(coherence);
        estimate.phase.push(phase);
        estimate.transfer.push(transfer);
    }
    estimate.cross_power = cross_power;
    Ok(CrossStatistics {
        estimate,
        psd_a,
        psd_b,
    })
}

fn bounds(confidence: f64, capacity: usize) -> ConfidenceInterval {
    ConfidenceInterval {
        confidence,
        lower: Vec::with_capacity(capacity),
        upper: Vec::with_capacity(capacity),
    }
}

/// `z · √((1 − C) / (ν C))`, the normal-theory relative error of phase and gain.
fn relative_spread(coherence: f64, nu: f64, z: f64) -> f64 {
    if coherence > 0.0 {
        z * ((1.0 - coherence) / (nu * coherence)).sqrt()
    } else {
        f64::INFINITY
    }
}

/// Fisher-transform interval for magnitude-squared coherence.
fn coherence_bounds(coherence: f64, nu: f64, z: f64) -> (f64, f64) {
    if nu <= 2.0 {
        return (0.0, 1.0);
    }
    if coherence >= 1.0 {
        return (1.0, 1.0);
    }
    let centre = coherence.sqrt().atanh();
    let delta = z / (nu - 2.0).sqrt();
    let lo = (centre - delta).max(0.0).tanh().powi(2);
    let hi = (centre + delta).tanh().powi(2);
    (lo.clamp(0.0, 1.0), hi.clamp(0.0, 1.0))
}
