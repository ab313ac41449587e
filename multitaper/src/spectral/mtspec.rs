use super::{
    onesided, onesided_freqs, ConfidenceInterval, EigenSpectra, ReshapedSpectrum,
    SpectralEstimate, SpectralLine, Weights,
};
use crate::kernel::{ExecInvariantViolation, KernelLifecycle};
use crate::linalg::InverseIterationOptions;
use crate::setup::MultitaperSetup;
use crate::stats::{chi_squared_quantile, f2_critical, students_t_quantile, upper_tail, variance};
use crate::taper::{DpssConfig, DpssKernel, TaperSet};
use crate::traits::{SpectralEstimator, TaperGenerate};
use core::f64::consts::PI;
use itertools::Itertools;
use ndarray::Array2;
use num_complex::Complex;
use std::sync::Arc;

/// DPSS multitaper estimate of a single series.
///
/// Construction runs the whole pipeline (tapers, eigenspectra, weights) once;
/// the derived statistics are cheap reads or short computations on top of it.
///
/// ```
/// use multitaper::{KernelLifecycle, MtSpec, MultitaperConfig, MultitaperSetup, SpectralEstimator};
/// let x: Vec<f64> = (0..256).map(|t| (0.2 * t as f64).sin()).collect();
/// let setup = MultitaperSetup::try_new(MultitaperConfig::new(x)).unwrap();
/// let spec = MtSpec::new(setup).unwrap();
/// assert_eq!(spec.psd().len(), spec.frequencies().len());
/// ```
#[derive(Debug, Clone)]
pub struct MtSpec {
    setup: MultitaperSetup,
    tapers: Arc<TaperSet>,
    spectra: EigenSpectra,
    powers: Array2<f64>,
    weights: Weights,
    frequencies: Vec<f64>,
    psd: Vec<f64>,
    amplitudes: Vec<Complex<f64>>,
    f_statistic: Vec<f64>,
}

/// Generate the DPSS basis described by `setup`.
pub(crate) fn dpss_basis(setup: &MultitaperSetup) -> Result<TaperSet, ExecInvariantViolation> {
    DpssKernel::try_new(DpssConfig {
        n: setup.n(),
        nw: setup.nw(),
        n_tapers: setup.n_tapers(),
        options: InverseIterationOptions::default(),
    })?
    .run()
}

impl MtSpec {
    /// Compute tapers for `setup` and estimate the spectrum.
    pub fn new(setup: MultitaperSetup) -> Result<Self, ExecInvariantViolation> {
        let tapers = Arc::new(dpss_basis(&setup)?);
        Self::with_tapers(setup, tapers)
    }

    /// Estimate the spectrum on an existing taper basis.
    pub fn with_tapers(
        setup: MultitaperSetup,
        tapers: Arc<TaperSet>,
    ) -> Result<Self, ExecInvariantViolation> {
        if tapers.n() != setup.n() {
            return Err(ExecInvariantViolation::BasisMismatch {
                reason: "taper length differs from the series length",
            });
        }
        if tapers.n_tapers() != setup.n_tapers() || tapers.nw() != setup.nw() {
            return Err(ExecInvariantViolation::BasisMismatch {
                reason: "taper count or time-bandwidth product differs from the setup",
            });
        }
        log::trace!(
            "mtspec: n = {}, nw = {}, K = {}, n_fft = {}",
            setup.n(),
            setup.nw(),
            setup.n_tapers(),
            setup.n_fft()
        );

        let x = setup.prepared_series();
        let spectra = EigenSpectra::compute(&x, tapers.tapers(), setup.n_fft());
        let powers = spectra.powers(setup.delta_t());
        let (sigma2, _): (f64, usize) = variance(x.iter());
        let weights = setup.weighting_scheme().combine(
            powers.view(),
            tapers.eigenvalues(),
            sigma2 * setup.delta_t(),
            setup.water_level(),
            &setup.adaptive(),
        );
        let psd = onesided(weights.apply(powers.view()), setup.n_fft());
        let (amplitudes, f_statistic) = harmonic_fit(&spectra, &tapers.dc_values());

        Ok(Self {
            frequencies: onesided_freqs(setup.n_fft(), setup.delta_t()),
            setup,
            tapers,
            spectra,
            powers,
            weights,
            psd,
            amplitudes,
            f_statistic,
        })
    }

    /// The setup this estimate was computed from.
    pub fn setup(&self) -> &MultitaperSetup {
        &self.setup
    }

    /// Shared taper basis.
    pub fn tapers(&self) -> &Arc<TaperSet> {
        &self.tapers
    }

    /// Complex eigencoefficients.
    pub fn eigenspectra(&self) -> &EigenSpectra {
        &self.spectra
    }

    /// Per-bin taper weights.
    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Eigenspectral powers `delta_t |y_k(f)|²`, `n_tapers × n_freq`.
    pub(crate) fn powers(&self) -> &Array2<f64> {
        &self.powers
    }

    /// Harmonic F statistic per bin, distributed F(2, 2K−2) under the null.
    ///
    /// For a single taper every value is zero.
    pub fn f_test(&self) -> &[f64] {
        &self.f_statistic
    }

    /// Complex line amplitude `μ(f)` per bin.
    pub fn amplitudes(&self) -> &[Complex<f64>] {
        &self.amplitudes
    }

    /// F(2, 2K−2) critical value at significance `alpha`; `+inf` for one taper.
    pub fn f_critical(&self, alpha: f64) -> f64 {
        f2_critical(alpha, 2.0 * self.setup.n_tapers() as f64 - 2.0)
    }

    /// Conventional line-detection significance, `1/n`.
    ///
    /// At this level about one false detection is expected per spectrum.
    pub fn default_line_alpha(&self) -> f64 {
        1.0 / self.setup.n() as f64
    }

    /// Search half-width for F-test maxima, `⌈nw · n_fft / n⌉` bins.
    fn bandwidth_bins(&self) -> usize {
        (self.setup.nw() * self.setup.n_fft() as f64 / self.setup.n() as f64).ceil() as usize
    }

    /// Significant harmonic lines at level `alpha`.
    ///
    /// A bin is a line when its F statistic exceeds the critical value and is the
    /// largest within the analysis bandwidth around it. DC and Nyquist are skipped.
    pub fn lines(&self, alpha: f64) -> Result<Vec<SpectralLine>, ExecInvariantViolation> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ExecInvariantViolation::InvalidState {
                reason: "significance level must lie in (0, 1)",
            });
        }
        let critical = self.f_critical(alpha);
        let n_fft = self.setup.n_fft();
        let n_freq = self.f_statistic.len();
        let half = self.bandwidth_bins();
        let nyquist = n_fft.is_multiple_of(2).then_some(n_fft / 2);

        let lines = (1..n_freq)
            .filter(|&j| Some(j) != nyquist && self.f_statistic[j] > critical)
            .filter(|&j| {
                let lo = j.saturating_sub(half);
                let hi = (j + half).min(n_freq - 1);
                self.f_statistic[lo..=hi]
                    .iter()
                    .position_max_by(|a, b| a.total_cmp(b))
                    .map(|p| lo + p)
                    == Some(j)
            })
            .map(|j| SpectralLine {
                frequency: self.frequencies[j],
                bin: j,
                amplitude: self.amplitudes[j],
                f_statistic: self.f_statistic[j],
                power: 2.0 * self.amplitudes[j].norm_sqr(),
            })
            .collect();
        Ok(lines)
    }

    /// Remove significant lines and re-estimate the background spectrum.
    ///
    /// Each line `μ_j` at bin `j` is subtracted from the series as the real
    /// sinusoid `2 Re(μ_j e^{2πi j t / n_fft})`, which removes `μ_j H_k(f − f_j)`
    /// and its mirror from every eigenspectrum. The background is recombined with
    /// the configured weighting on the same taper basis.
    pub fn reshape(&self, alpha: f64) -> Result<ReshapedSpectrum, ExecInvariantViolation> {
        let lines = self.lines(alpha)?;
        log::debug!("reshape: removing {} lines at alpha = {alpha}", lines.len());
        if lines.is_empty() {
            return Ok(ReshapedSpectrum {
                frequencies: self.frequencies.clone(),
                psd: self.psd.clone(),
                dof: self.weights.dof().to_vec(),
                lines,
            });
        }

        let n_fft = self.setup.n_fft() as f64;
        let mut x = self.setup.prepared_series();
        for line in &lines {
            let omega = 2.0 * PI * line.bin as f64 / n_fft;
            for (t, xt) in x.iter_mut().enumerate() {
                let phasor = Complex::from_polar(1.0, omega * t as f64);
                *xt -= 2.0 * (line.amplitude * phasor).re;
            }
        }
        let background =
            MtSpec::with_tapers(self.setup.with_series(x), Arc::clone(&self.tapers))?;
        Ok(ReshapedSpectrum {
            frequencies: background.frequencies,
            psd: background.psd,
            dof: background.weights.dof().to_vec(),
            lines,
        })
    }

    /// Jackknife confidence interval for the PSD.
    ///
    /// Delete-one estimates are formed by dropping each taper in turn and
    /// renormalising the remaining weights; the variance of their logarithms
    /// gives a Student-t interval with `K − 1` degrees of freedom.
    pub fn jackknife_interval(
        &self,
        confidence: f64,
    ) -> Result<ConfidenceInterval, ExecInvariantViolation> {
        let n_tapers = self.setup.n_tapers();
        if n_tapers < 2 {
            return Err(ExecInvariantViolation::InvalidState {
                reason: "jackknife needs at least two tapers",
            });
        }
        let t = students_t_quantile(upper_tail(confidence)?, n_tapers as f64 - 1.0)?;
        let kk = n_tapers as f64;
        let w = self.weights.weights();

        let mut lower = Vec::with_capacity(self.psd.len());
        let mut upper = Vec::with_capacity(self.psd.len());
        for (f, &s) in self.psd.iter().enumerate() {
            let w2: Vec<f64> = w.column(f).iter().map(|v| v * v).collect();
            let total: f64 = w2.iter().zip(self.powers.column(f)).map(|(a, b)| a * b).sum();
            let w_total: f64 = w2.iter().sum();
            let logs: Option<Vec<f64>> = (0..n_tapers)
                .map(|i| {
                    let num = total - w2[i] * self.powers[[i, f]];
                    let den = w_total - w2[i];
                    (num > 0.0 && den > 0.0).then(|| (num / den).ln())
                })
                .collect();
            match logs {
                Some(logs) if s > 0.0 => {
                    let centre = logs.iter().sum::<f64>() / kk;
                    let spread2: f64 = logs.iter().map(|l| (l - centre).powi(2)).sum();
                    let var = (kk - 1.0) / kk * spread2;
                    let spread = (t * var.sqrt()).exp();
                    lower.push(s / spread);
                    upper.push(s * spread);
                }
                _ => {
                    lower.push(s);
                    upper.push(s);
                }
            }
        }
        Ok(ConfidenceInterval {
            confidence,
            lower,
            upper,
        })
    }

    /// Chi-square confidence interval for the PSD using the per-bin dof.
    pub fn chi2_interval(
        &self,
        confidence: f64,
    ) -> Result<ConfidenceInterval, ExecInvariantViolation> {
        let p = upper_tail(confidence)?;
        let mut lower = Vec::with_capacity(self.psd.len());
        let mut upper = Vec::with_capacity(self.psd.len());
        for (&s, &nu) in self.psd.iter().zip(self.weights.dof()) {
            lower.push(nu * s / chi_squared_quantile(p, nu)?);
            upper.push(nu * s / chi_squared_quantile(1.0 - p, nu)?);
        }
        Ok(ConfidenceInterval {
            confidence,
            lower,
            upper,
        })
    }
}

/// Least-squares line amplitudes and F statistics for every one-sided bin.
fn harmonic_fit(spectra: &EigenSpectra, dc: &[f64]) -> (Vec<Complex<f64>>, Vec<f64>) {
    let n_freq = spectra.n_freq();
    let n_tapers = spectra.n_tapers();
    let u2: f64 = dc.iter().map(|u| u * u).sum();
    if !(u2 > 0.0) {
        return (vec![Complex::new(0.0, 0.0); n_freq], vec![0.0; n_freq]);
    }
    let y = spectra.coefficients();
    (0..n_freq)
        .map(|f| {
            let column = y.column(f);
            let mu = column
                .iter()
                .zip(dc)
                .map(|(yk, u)| *yk * *u)
                .sum::<Complex<f64>>()
                / u2;
            if n_tapers < 2 {
                return (mu, 0.0);
            }
            let explained = (n_tapers as f64 - 1.0) * mu.norm_sqr() * u2;
            let residual: f64 = column
                .iter()
                .zip(dc)
                .map(|(yk, u)| (*yk - mu * *u).norm_sqr())
                .sum();
            let f_stat = if residual > 0.0 {
                explained / residual
            } else if explained > 0.0 {
                f64::INFINITY
            } else {
                0.0
            };
            (mu, f_stat)
        })
        .unzip()
}

impl SpectralEstimator for MtSpec {
    fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    fn psd(&self) -> &[f64] {
        &self.psd
    }

    fn dof(&self) -> &[f64] {
        self.weights.dof()
    }

    fn estimate(&self) -> SpectralEstimate {
        SpectralEstimate {
            frequencies: self.frequencies.clone(),
            psd: self.psd.clone(),
            dof: self.weights.dof().to_vec(),
            f_statistic: Some(self.f_statistic.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::MultitaperConfig;
    use crate::spectral::WeightingScheme;
    use crate::stats::mean_square;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).expect("normal");
        (0..n).map(|_| normal.sample(&mut rng)).collect()
    }

    fn spec(config: MultitaperConfig) -> MtSpec {
        MtSpec::new(MultitaperSetup::try_new(config).expect("setup")).expect("mtspec")
    }

    #[test]
    fn psd_integrates_to_series_power() {
        let x = noise(512, 7);
        let (ms, _): (f64, usize) = mean_square(x.iter());
        for scheme in [
            WeightingScheme::Unity,
            WeightingScheme::Eigenvalue,
            WeightingScheme::Adaptive,
        ] {
            let s = spec(MultitaperConfig {
                weighting_scheme: scheme,
                remove_mean: false,
                ..MultitaperConfig::new(x.clone())
            });
            let df = s.frequencies()[1];
            let integral: f64 = s.psd().iter().sum::<f64>() * df;
            assert_relative_eq!(integral, ms, max_relative = 0.1);
        }
    }

    #[test]
    fn dc_offset_does_not_collapse_adaptive_weights() {
        let x: Vec<f64> = noise(512, 21).into_iter().map(|v| v + 100.0).collect();
        let s = spec(MultitaperConfig {
            remove_mean: false,
            ..MultitaperConfig::new(x)
        });
        let two_k = 2.0 * s.setup().n_tapers() as f64;
        let band = &s.dof()[50..450];
        let mean_dof = band.iter().sum::<f64>() / band.len() as f64;
        assert!(mean_dof > 0.9 * two_k, "mean dof {mean_dof} of {two_k}");
    }

    #[test]
    fn dof_lies_within_bounds() {
        let x = noise(300, 11);
        for scheme in [
            WeightingScheme::Unity,
            WeightingScheme::Eigenvalue,
            WeightingScheme::Adaptive,
        ] {
            let s = spec(MultitaperConfig {
                weighting_scheme: scheme,
                ..MultitaperConfig::new(x.clone())
            });
            assert!(s.dof().iter().all(|d| (2.0..=14.0 + 1e-9).contains(d)));
        }
    }

    #[test]
    fn single_taper_has_zero_f_and_infinite_critical_value() {
        let s = spec(MultitaperConfig {
            nw: 1.0,
            n_tapers: Some(1),
            ..MultitaperConfig::new(noise(64, 3))
        });
        assert!(s.f_test().iter().all(|f| *f == 0.0));
        assert!(s.f_critical(0.01).is_infinite());
        assert!(s.lines(0.01).expect("lines").is_empty());
        assert!(s.jackknife_interval(0.95).is_err());
    }

    #[test]
    fn detects_and_removes_a_sinusoid() {
        let n = 1024;
        let mut x = noise(n, 21);
        for (t, v) in x.iter_mut().enumerate() {
            *v += 2.0 * (2.0 * PI * 0.125 * t as f64 + 0.3).cos();
        }
        let s = spec(MultitaperConfig {
            n_fft: Some(2048),
            ..MultitaperConfig::new(x)
        });
        let lines = s.lines(s.default_line_alpha()).expect("lines");
        assert!(lines.iter().any(|l| l.bin == 256));
        let line = lines.iter().find(|l| l.bin == 256).expect("line at 0.125");
        assert_relative_eq!(line.frequency, 0.125);
        assert_relative_eq!(line.power, 2.0, max_relative = 0.1);

        let reshaped = s.reshape(s.default_line_alpha()).expect("reshape");
        assert_eq!(reshaped.lines.len(), lines.len());
        assert!(reshaped.psd[256] < 0.05 * s.psd()[256]);
        // Far from the line the background is untouched.
        assert_relative_eq!(reshaped.psd[700], s.psd()[700], max_relative = 0.05);
    }

    #[test]
    fn lines_reject_invalid_alpha() {
        let s = spec(MultitaperConfig::new(noise(128, 5)));
        assert!(s.lines(0.0).is_err());
        assert!(s.lines(1.0).is_err());
        assert!(s.reshape(f64::NAN).is_err());
    }

    #[test]
    fn intervals_bracket_the_estimate() {
        let s = spec(MultitaperConfig::new(noise(256, 9)));
        let jk = s.jackknife_interval(0.95).expect("jackknife");
        let chi = s.chi2_interval(0.95).expect("chi2");
        for (i, p) in s.psd().iter().enumerate() {
            assert!(jk.lower[i] <= *p && *p <= jk.upper[i]);
            assert!(chi.lower[i] <= *p && *p <= chi.upper[i]);
        }
        assert!(s.chi2_interval(1.5).is_err());
    }

    #[test]
    fn basis_must_match_setup() {
        let a = spec(MultitaperConfig::new(noise(128, 1)));
        let other = MultitaperSetup::try_new(MultitaperConfig::new(noise(100, 2))).expect("setup");
        assert!(matches!(
            MtSpec::with_tapers(other, Arc::clone(a.tapers())),
            Err(ExecInvariantViolation::BasisMismatch { .. })
        ));
    }

    #[test]
    fn estimate_bundles_all_fields() {
        let s = spec(MultitaperConfig {
            delta_t: 0.5,
            ..MultitaperConfig::new(noise(64, 4))
        });
        let e = s.estimate();
        assert_eq!(e.frequencies.len(), 65);
        assert_relative_eq!(*e.frequencies.last().expect("bins"), 64.0 / (129.0 * 0.5));
        assert_eq!(e.psd, s.psd());
        assert_eq!(e.f_statistic.as_deref(), Some(s.f_test()));
    }
}
