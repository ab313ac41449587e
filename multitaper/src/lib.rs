//! Multitaper spectral analysis.
//!
//! Power spectral density, harmonic F-test, cross-spectrum, coherence and
//! transfer-function estimates from discrete prolate spheroidal (DPSS) tapers,
//! plus an adaptive sine-taper estimator.
//!
//! Every estimator starts from a validated [`MultitaperSetup`]:
//!
//! ```
//! use multitaper::{KernelLifecycle, MtSpec, MultitaperConfig, MultitaperSetup, SpectralEstimator};
//!
//! let x: Vec<f64> = (0..512)
//!     .map(|t| (2.0 * std::f64::consts::PI * 0.1 * t as f64).sin())
//!     .collect();
//! let setup = MultitaperSetup::try_new(MultitaperConfig {
//!     nw: 4.0,
//!     ..MultitaperConfig::new(x)
//! })?;
//! let spec = MtSpec::new(setup)?;
//! let peak = spec
//!     .psd()
//!     .iter()
//!     .enumerate()
//!     .max_by(|a, b| a.1.total_cmp(b.1))
//!     .map(|(i, _)| spec.frequencies()[i]);
//! assert!((peak.unwrap() - 0.1).abs() < 1e-2);
//! # Ok::<(), multitaper::ExecInvariantViolation>(())
//! ```
//!
//! Enable the `parallel` feature to spread per-taper transforms and per-bin
//! weighting across a rayon pool, and `serde` for serialisable configs and results.

pub mod kernel;
pub mod linalg;
pub mod setup;
pub mod spectral;
pub mod stats;
pub mod taper;
pub mod traits;

pub use kernel::{ConfigError, ExecInvariantViolation, KernelLifecycle, Read1D};
pub use setup::{MultitaperConfig, MultitaperSetup};
pub use spectral::{
    AdaptiveOptions, ConfidenceInterval, CrossConfig, CrossSpectralEstimate, MtCross, MtSine,
    MtSpec, ReshapedSpectrum, SineConfig, SineCross, SpectralEstimate, SpectralLine,
    TransferDirection, WeightingScheme,
};
pub use taper::{dpss, sine_tapers, TaperSet};
pub use traits::{CrossSpectralEstimator, SpectralEstimator, TaperGenerate};

use kernel::read_series;

/// Univariate multitaper PSD of `x` with default settings and the given `nw`.
///
/// ```
/// let x = vec![0.5, -1.0, 2.0, 0.0, 1.5, -0.5, 0.25, 1.0];
/// let est = multitaper::mtspec(&x, 1.0, 1.5).unwrap();
/// assert_eq!(est.psd.len(), 9);
/// ```
pub fn mtspec<I>(x: &I, delta_t: f64, nw: f64) -> Result<SpectralEstimate, ExecInvariantViolation>
where
    I: Read1D<f64> + ?Sized,
{
    let setup = MultitaperSetup::try_new(MultitaperConfig {
        nw,
        delta_t,
        ..MultitaperConfig::new(read_series(x, "x")?)
    })?;
    Ok(MtSpec::new(setup)?.estimate())
}

/// Coherence, phase and transfer function between `a` and `b` on one DPSS basis.
pub fn mtcross<A, B>(
    a: &A,
    b: &B,
    delta_t: f64,
    nw: f64,
) -> Result<CrossSpectralEstimate, ExecInvariantViolation>
where
    A: Read1D<f64> + ?Sized,
    B: Read1D<f64> + ?Sized,
{
    let a = read_series(a, "a")?;
    let b = read_series(b, "b")?;
    if a.len() != b.len() {
        return Err(ConfigError::LengthMismatch {
            arg: "b",
            expected: a.len(),
            got: b.len(),
        }
        .into());
    }
    let setup = |x: &[f64]| {
        MultitaperSetup::try_new(MultitaperConfig {
            nw,
            delta_t,
            ..MultitaperConfig::new(x)
        })
    };
    Ok(MtCross::from_setups(setup(a)?, setup(b)?, CrossConfig::default())?.into_estimate())
}

/// Adaptive sine multitaper PSD of `x` with default settings.
pub fn mtsine<I>(x: &I, delta_t: f64) -> Result<SpectralEstimate, ExecInvariantViolation>
where
    I: Read1D<f64> + ?Sized,
{
    let x = read_series(x, "x")?;
    // The sine path ignores nw; keep it valid for short series.
    let nw = (x.len() as f64 / 4.0).min(4.0);
    let setup = MultitaperSetup::try_new(MultitaperConfig {
        nw,
        n_tapers: Some(7.min(x.len())),
        delta_t,
        ..MultitaperConfig::new(x)
    })?;
    Ok(MtSine::new(&setup)?.estimate())
}
