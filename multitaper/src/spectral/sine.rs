use super::mtcross::{cross_statistics, CrossKernel, CrossStatistics};
use super::{onesided, onesided_freqs, CrossConfig, CrossSpectralEstimate, EigenSpectra};
use super::{SpectralEstimate, TransferDirection, Weights};
use crate::kernel::{ConfigError, ExecInvariantViolation, KernelLifecycle};
use crate::setup::MultitaperSetup;
use crate::taper::{parabolic_weights, sine_tapers};
use crate::traits::{CrossSpectralEstimator, SpectralEstimator};

/// Constructor config for [`SineKernel`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SineConfig {
    /// Number of curvature/taper-count refinement passes after the pilot estimate.
    pub n_iterations: usize,
    /// Smallest taper count any bin may use.
    pub min_tapers: usize,
    /// Largest taper count any bin may use. Defaults to `max(K_pilot, ⌈√n⌉)`.
    pub max_tapers: Option<usize>,
}

impl Default for SineConfig {
    fn default() -> Self {
        Self {
            n_iterations: 3,
            min_tapers: 1,
            max_tapers: None,
        }
    }
}

/// Adaptive sine multitaper estimator (Riedel & Sidorenko).
///
/// A pilot estimate with `setup.n_tapers()` sine tapers is refined by choosing,
/// per bin, the taper count that minimises the estimated mean-square error
///
/// ```text
/// MSE(K) / S² = 6 / (5K) + (R K² / (40 (n + 1)²))²,   R = S'' / S
/// ```
///
/// where the log-curvature `R` is measured on the previous estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SineKernel {
    n_iterations: usize,
    min_tapers: usize,
    max_tapers: Option<usize>,
}

impl KernelLifecycle for SineKernel {
    type Config = SineConfig;

    fn try_new(config: Self::Config) -> Result<Self, ConfigError> {
        if config.min_tapers == 0 {
            return Err(ConfigError::InvalidArgument {
                arg: "min_tapers",
                reason: "at least one taper is required",
            });
        }
        if let Some(max) = config.max_tapers {
            if max < config.min_tapers {
                return Err(ConfigError::InvalidArgument {
                    arg: "max_tapers",
                    reason: "maximum taper count is below the minimum",
                });
            }
        }
        Ok(Self {
            n_iterations: config.n_iterations,
            min_tapers: config.min_tapers,
            max_tapers: config.max_tapers,
        })
    }
}

/// Per-bin taper-count search.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TaperSearch {
    Growing { k: usize, mse: f64 },
    Committed(usize),
}

fn relative_mse(k: usize, curvature: f64, n: usize) -> f64 {
    let kk = k as f64;
    let bias = curvature * kk * kk / (40.0 * (n as f64 + 1.0).powi(2));
    6.0 / (5.0 * kk) + bias * bias
}

/// Grow `K` from `min` while the MSE keeps falling, up to `max`.
fn optimal_tapers(curvature: f64, n: usize, min: usize, max: usize) -> usize {
    let mut state = TaperSearch::Growing {
        k: min,
        mse: relative_mse(min, curvature, n),
    };
    loop {
        state = match state {
            TaperSearch::Committed(k) => return k,
            TaperSearch::Growing { k, .. } if k >= max => TaperSearch::Committed(k),
            TaperSearch::Growing { k, mse } => {
                let next = relative_mse(k + 1, curvature, n);
                if next < mse {
                    TaperSearch::Growing { k: k + 1, mse: next }
                } else {
                    TaperSearch::Committed(k)
                }
            }
        };
    }
}

/// `S''/S` per (cycles per sample)² from a quadratic fit of `ln S` around each bin.
///
/// The fit spans `±max(K_f, 2)` bins and reflects the spectrum at both ends.
fn log_curvature(psd: &[f64], tapers: &[usize], n_fft: usize) -> Vec<f64> {
    let n_freq = psd.len();
    let logs: Vec<f64> = psd.iter().map(|s| s.max(f64::MIN_POSITIVE).ln()).collect();
    let last = n_freq.saturating_sub(1) as isize;
    let reflect = |i: isize| -> usize {
        if last == 0 {
            return 0;
        }
        let period = 2 * last;
        let m = i.rem_euclid(period);
        (if m > last { period - m } else { m }) as usize
    };
    let bins2 = (n_fft as f64).powi(2);
    (0..n_freq)
        .map(|f| {
            let h = tapers[f].max(2) as isize;
            let m = (2 * h + 1) as f64;
            let (mut s1, mut sj, mut sj2) = (0.0, 0.0, 0.0);
            let (mut j2, mut j4) = (0.0, 0.0);
            for j in -h..=h {
                let y = logs[reflect(f as isize + j)];
                let jf = j as f64;
                s1 += y;
                sj += jf * y;
                sj2 += jf * jf * y;
                j2 += jf * jf;
                j4 += jf.powi(4);
            }
            let slope = sj / j2;
            let quad = (sj2 - j2 / m * s1) / (j4 - j2 * j2 / m);
            (2.0 * quad + slope * slope) * bins2
        })
        .collect()
}

/// Limit neighbouring taper counts to differ by at most one.
fn limit_slope(tapers: &mut [usize]) {
    for i in 1..tapers.len() {
        tapers[i] = tapers[i].min(tapers[i - 1] + 1);
    }
    for i in (0..tapers.len().saturating_sub(1)).rev() {
        tapers[i] = tapers[i].min(tapers[i + 1] + 1);
    }
}

/// Parabolic-weight columns for the given per-bin taper counts, padded to `rows`.
fn sine_weights(tapers: &[usize], rows: usize) -> Weights {
    let columns: Vec<Vec<f64>> = tapers
        .iter()
        .map(|&k| {
            let mut column: Vec<f64> =
                parabolic_weights(k).into_iter().map(f64::sqrt).collect();
            column.resize(rows, 0.0);
            column
        })
        .collect();
    Weights::from_columns(columns, rows)
}

impl SineKernel {
    /// Estimate the spectrum of `setup` with adaptively chosen sine-taper counts.
    pub fn run(&self, setup: &MultitaperSetup) -> Result<MtSine, ExecInvariantViolation> {
        let n = setup.n();
        let n_fft = setup.n_fft();
        let cap = n.min(n_fft - 1);
        let default_max = setup.n_tapers().max((n as f64).sqrt().ceil() as usize);
        let max = self.max_tapers.unwrap_or(default_max).min(cap);
        let min = self.min_tapers.min(max);
        let pilot = setup.n_tapers().clamp(min, max);
        log::trace!("mtsine: n = {n}, n_fft = {n_fft}, K in [{min}, {max}], pilot = {pilot}");

        let x = setup.prepared_series();
        let basis = sine_tapers(n, max)?;
        let spectra = EigenSpectra::compute(&x, basis.view(), n_fft);
        let powers = spectra.powers(setup.delta_t());
        let n_freq = spectra.n_freq();

        let mut tapers = vec![pilot; n_freq];
        let mut weights = sine_weights(&tapers, max);
        let mut psd = onesided(weights.apply(powers.view()), n_fft);
        for iteration in 0..self.n_iterations {
            let curvature = log_curvature(&psd, &tapers, n_fft);
            tapers = curvature
                .iter()
                .map(|r| optimal_tapers(*r, n, min, max))
                .collect();
            limit_slope(&mut tapers);
            weights = sine_weights(&tapers, max);
            psd = onesided(weights.apply(powers.view()), n_fft);
            log::debug!(
                "mtsine iteration {}: mean taper count {:.2}",
                iteration + 1,
                tapers.iter().sum::<usize>() as f64 / n_freq as f64
            );
        }

        Ok(MtSine {
            setup: setup.clone(),
            frequencies: onesided_freqs(n_fft, setup.delta_t()),
            spectra,
            weights,
            tapers,
            psd,
        })
    }
}

/// Adaptive sine multitaper estimate of a single series.
#[derive(Debug, Clone)]
pub struct MtSine {
    setup: MultitaperSetup,
    spectra: EigenSpectra,
    weights: Weights,
    tapers: Vec<usize>,
    frequencies: Vec<f64>,
    psd: Vec<f64>,
}

impl MtSine {
    /// Estimate with [`SineConfig::default`].
    pub fn new(setup: &MultitaperSetup) -> Result<Self, ExecInvariantViolation> {
        SineKernel::try_new(SineConfig::default())?.run(setup)
    }

    /// The setup this estimate was computed from.
    pub fn setup(&self) -> &MultitaperSetup {
        &self.setup
    }

    /// Number of sine tapers used at each bin.
    pub fn tapers_per_bin(&self) -> &[usize] {
        &self.tapers
    }

    /// Sine-taper eigencoefficients, one row per taper up to the maximum count.
    pub fn eigenspectra(&self) -> &EigenSpectra {
        &self.spectra
    }

    /// Per-bin parabolic weights (zero beyond each bin's taper count).
    pub fn weights(&self) -> &Weights {
        &self.weights
    }
}

impl SpectralEstimator for MtSine {
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
            f_statistic: None,
        }
    }
}

/// Cross-spectral statistics of two sine multitaper estimates.
///
/// Each bin uses `min(K_A, K_B)` tapers with parabolic weights.
#[derive(Debug, Clone)]
pub struct SineCross {
    tapers: Vec<usize>,
    stats: CrossStatistics,
}

impl SineCross {
    /// Cross-analyse two sine estimates of equally long, equally sampled series.
    pub fn new(
        a: &MtSine,
        b: &MtSine,
        config: CrossConfig,
    ) -> Result<Self, ExecInvariantViolation> {
        let kernel = CrossKernel::try_new(config)?;
        if a.setup.n() != b.setup.n() {
            return Err(ExecInvariantViolation::BasisMismatch {
                reason: "series lengths differ",
            });
        }
        if a.setup.n_fft() != b.setup.n_fft() {
            return Err(ExecInvariantViolation::BasisMismatch {
                reason: "transform lengths differ",
            });
        }
        if a.setup.delta_t() != b.setup.delta_t() {
            return Err(ExecInvariantViolation::BasisMismatch {
                reason: "sampling intervals differ",
            });
        }
        let tapers: Vec<usize> = a
            .tapers
            .iter()
            .zip(&b.tapers)
            .map(|(ka, kb)| *ka.min(kb))
            .collect();
        let rows = a.spectra.n_tapers().min(b.spectra.n_tapers());
        let weights = sine_weights(&tapers, rows);
        let water_level = match kernel.direction() {
            TransferDirection::AToB => a.setup.water_level(),
            TransferDirection::BToA => b.setup.water_level(),
        };
        let stats = cross_statistics(
            a.spectra.coefficients(),
            b.spectra.coefficients(),
            &weights,
            a.frequencies.clone(),
            a.setup.delta_t(),
            water_level,
            &kernel,
        )?;
        Ok(Self { tapers, stats })
    }

    /// Number of tapers used at each bin.
    pub fn tapers_per_bin(&self) -> &[usize] {
        &self.tapers
    }

    /// PSD of series A under the shared weights.
    pub fn psd_a(&self) -> &[f64] {
        &self.stats.psd_a
    }

    /// PSD of series B under the shared weights.
    pub fn psd_b(&self) -> &[f64] {
        &self.stats.psd_b
    }
}

impl CrossSpectralEstimator for SineCross {
    fn cross_estimate(&self) -> &CrossSpectralEstimate {
        &self.stats.estimate
    }
}
