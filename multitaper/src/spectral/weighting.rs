use ndarray::{Array2, ArrayView1, ArrayView2};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// How eigenspectra are combined into a single estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WeightingScheme {
    /// Thomson's adaptive weights, iterated per bin.
    #[default]
    Adaptive,
    /// Equal weights for every taper.
    Unity,
    /// Weights proportional to the concentration eigenvalues.
    Eigenvalue,
}

/// Convergence controls for adaptive weighting.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdaptiveOptions {
    /// Relative change of the bin estimate below which iteration stops.
    pub tolerance: f64,
    /// Iteration cap per bin. The last iterate is kept when it is reached.
    pub max_iterations: usize,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 100,
        }
    }
}

/// Per-bin taper weights and the effective degrees of freedom they imply.
///
/// Columns of [`Weights::weights`] satisfy `Σ_k w_k² = 1`, so a weighted spectrum
/// is `Σ_k w_k² Ŝ_k`. Bins without any energy carry a floor value instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    weights: Array2<f64>,
    dof: Vec<f64>,
    floored: Vec<bool>,
    floor: f64,
}

impl Weights {
    /// Weight matrix, `n_tapers × n_freq`.
    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    /// Degrees of freedom per bin, in `[2, 2·n_tapers]`.
    pub fn dof(&self) -> &[f64] {
        &self.dof
    }

    /// Combine eigenspectral powers bin by bin (not yet one-sided).
    pub fn apply(&self, powers: ArrayView2<'_, f64>) -> Vec<f64> {
        (0..self.weights.ncols())
            .map(|f| {
                if self.floored[f] {
                    return self.floor;
                }
                self.weights
                    .column(f)
                    .iter()
                    .zip(powers.column(f).iter())
                    .map(|(w, s)| w * w * s)
                    .sum()
            })
            .collect()
    }

    /// Build weights from explicit per-bin columns of unnormalised weights.
    pub(crate) fn from_columns(columns: Vec<Vec<f64>>, n_tapers: usize) -> Self {
        let n_freq = columns.len();
        let mut weights = Array2::zeros((n_tapers, n_freq));
        let mut dof = Vec::with_capacity(n_freq);
        for (f, column) in columns.iter().enumerate() {
            let normalised = normalise(column);
            dof.push(effective_dof(&normalised));
            for (k, w) in normalised.into_iter().enumerate() {
                weights[[k, f]] = w;
            }
        }
        Self {
            weights,
            dof,
            floored: vec![false; n_freq],
            floor: 0.0,
        }
    }
}

/// Scale `d` so that `Σ d² = 1`; an all-zero vector becomes uniform.
fn normalise(d: &[f64]) -> Vec<f64> {
    let total: f64 = d.iter().map(|v| v * v).sum();
    if total > 0.0 {
        let scale = total.sqrt().recip();
        d.iter().map(|v| v * scale).collect()
    } else {
        let w = (d.len() as f64).sqrt().recip();
        vec![w; d.len()]
    }
}

/// `2 / Σ w⁴` for normalised weights, clamped into `[2, 2K]`.
fn effective_dof(w: &[f64]) -> f64 {
    let quartic: f64 = w.iter().map(|v| v.powi(4)).sum();
    let upper = 2.0 * w.len() as f64;
    if quartic > 0.0 {
        (2.0 / quartic).clamp(2.0, upper)
    } else {
        upper
    }
}

/// Running state of Thomson's iteration at one bin.
#[derive(Debug, Clone)]
struct AdaptiveState {
    spectrum: f64,
    d: Vec<f64>,
    iterations: usize,
}

enum BinOutcome {
    Converged(Vec<f64>),
    Exhausted(Vec<f64>),
    Degenerate,
}

impl AdaptiveState {
    fn start(powers: ArrayView1<'_, f64>) -> Self {
        let spectrum = match powers.len() {
            0 => 0.0,
            1 => powers[0],
            _ => 0.5 * (powers[0] + powers[1]),
        };
        let spectrum = if spectrum > 0.0 {
            spectrum
        } else {
            powers.sum() / powers.len() as f64
        };
        Self {
            spectrum,
            d: vec![0.0; powers.len()],
            iterations: 0,
        }
    }

    /// One update of `d_k` and the bin estimate. Returns `false` on a zero denominator.
    fn step(
        &mut self,
        powers: ArrayView1<'_, f64>,
        lambda: &[f64],
        noise: f64,
        floor: f64,
    ) -> bool {
        let s = self.spectrum;
        for (d, &l) in self.d.iter_mut().zip(lambda) {
            let denom = (l * s + (1.0 - l) * noise).max(floor);
            if !(denom > 0.0) {
                return false;
            }
            *d = l.sqrt() * s / denom;
        }
        let d2: f64 = self.d.iter().map(|d| d * d).sum();
        if !(d2 > 0.0) {
            return false;
        }
        self.spectrum = self
            .d
            .iter()
            .zip(powers.iter())
            .map(|(d, p)| d * d * p)
            .sum::<f64>()
            / d2;
        self.iterations += 1;
        true
    }

    fn run(
        mut self,
        powers: ArrayView1<'_, f64>,
        lambda: &[f64],
        noise: f64,
        floor: f64,
        options: &AdaptiveOptions,
    ) -> BinOutcome {
        while self.iterations < options.max_iterations {
            let previous = self.spectrum;
            if !self.step(powers, lambda, noise, floor) {
                return BinOutcome::Degenerate;
            }
            if (self.spectrum - previous).abs() <= options.tolerance * self.spectrum {
                return BinOutcome::Converged(self.d);
            }
        }
        BinOutcome::Exhausted(self.d)
    }
}

struct BinWeights {
    weights: Vec<f64>,
    floored: bool,
    converged: bool,
}

fn eigenvalue_weights(lambda: &[f64]) -> Vec<f64> {
    lambda.iter().map(|l| l.max(0.0).sqrt()).collect()
}

fn adaptive_bin(
    powers: ArrayView1<'_, f64>,
    lambda: &[f64],
    noise: f64,
    floor: f64,
    options: &AdaptiveOptions,
) -> BinWeights {
    if !(powers.sum() > 0.0) {
        return BinWeights {
            weights: eigenvalue_weights(lambda),
            floored: true,
            converged: true,
        };
    }
    match AdaptiveState::start(powers).run(powers, lambda, noise, floor, options) {
        BinOutcome::Converged(d) => BinWeights {
            weights: d,
            floored: false,
            converged: true,
        },
        BinOutcome::Exhausted(d) => BinWeights {
            weights: d,
            floored: false,
            converged: false,
        },
        BinOutcome::Degenerate => BinWeights {
            weights: eigenvalue_weights(lambda),
            floored: true,
            converged: true,
        },
    }
}

impl WeightingScheme {
    /// Combine eigenspectral powers into per-bin weights.
    ///
    /// `powers` is the `n_tapers × n_freq` matrix of `Ŝ_k(f) = delta_t |y_k(f)|²`,
    /// `eigenvalues` the taper concentrations and `noise` the variance of the
    /// prepared series times `delta_t`. Adaptive weighting solves, per bin,
    ///
    /// ```text
    /// d_k = √λ_k S / max(λ_k S + (1 − λ_k) σ², water_level · σ²)
    /// S   = Σ d_k² Ŝ_k / Σ d_k²
    /// ```
    ///
    /// until `S` changes by less than `options.tolerance` relative to itself.
    pub fn combine(
        &self,
        powers: ArrayView2<'_, f64>,
        eigenvalues: &[f64],
        noise: f64,
        water_level: f64,
        options: &AdaptiveOptions,
    ) -> Weights {
        let n_tapers = powers.nrows();
        let n_freq = powers.ncols();
        debug_assert_eq!(eigenvalues.len(), n_tapers);
        log::trace!("combining {n_tapers} eigenspectra with {self:?} weights");
        match self {
            WeightingScheme::Unity => {
                Weights::from_columns(vec![vec![1.0; n_tapers]; n_freq], n_tapers)
            }
            WeightingScheme::Eigenvalue => {
                Weights::from_columns(vec![eigenvalue_weights(eigenvalues); n_freq], n_tapers)
            }
            WeightingScheme::Adaptive => {
                let floor = water_level * noise;
                let solve =
                    |f: usize| adaptive_bin(powers.column(f), eigenvalues, noise, floor, options);

                #[cfg(feature = "parallel")]
                let bins: Vec<BinWeights> = (0..n_freq).into_par_iter().map(solve).collect();
                #[cfg(not(feature = "parallel"))]
                let bins: Vec<BinWeights> = (0..n_freq).map(solve).collect();

                let exhausted = bins.iter().filter(|b| !b.converged).count();
                if exhausted > 0 {
                    log::debug!(
                        "adaptive weighting: {exhausted} of {n_freq} bins hit the {} iteration cap",
                        options.max_iterations
                    );
                }
                let floored: Vec<bool> = bins.iter().map(|b| b.floored).collect();
                let mut weights =
                    Weights::from_columns(bins.into_iter().map(|b| b.weights).collect(), n_tapers);
                weights.floored = floored;
                weights.floor = floor;
                weights
            }
        }
    }
}
