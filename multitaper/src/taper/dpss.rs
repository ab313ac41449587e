use super::TaperSet;
use crate::kernel::{ConfigError, ExecInvariantViolation, KernelLifecycle};
use crate::linalg::{InverseIterationOptions, SymTridiagonal};
use crate::traits::TaperGenerate;
use core::f64::consts::PI;
use nalgebra::DVector;
use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Constructor config for [`DpssKernel`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DpssConfig {
    /// Taper length.
    pub n: usize,
    /// Time-bandwidth product.
    pub nw: f64,
    /// Number of tapers to generate.
    pub n_tapers: usize,
    /// Inverse-iteration tolerances.
    pub options: InverseIterationOptions,
}

/// Discrete prolate spheroidal sequence generator.
///
/// Solves Slepian's commuting tridiagonal eigenproblem
///
/// ```text
/// diag[t] = ((n − 1 − 2t) / 2)² · cos(2πW),   off[t] = (t + 1)(n − t − 1) / 2
/// ```
///
/// with `W = nw / n`. Tapers are sign-normalised so symmetric tapers have a
/// positive sum and antisymmetric tapers start positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DpssKernel {
    n: usize,
    nw: f64,
    n_tapers: usize,
    options: InverseIterationOptions,
}

impl KernelLifecycle for DpssKernel {
    type Config = DpssConfig;

    fn try_new(config: Self::Config) -> Result<Self, ConfigError> {
        if config.n == 0 {
            return Err(ConfigError::InvalidArgument {
                arg: "n",
                reason: "taper length must be > 0",
            });
        }
        if !config.nw.is_finite() || config.nw <= 0.0 {
            return Err(ConfigError::InvalidArgument {
                arg: "nw",
                reason: "time-bandwidth product must be finite and > 0",
            });
        }
        if config.nw >= config.n as f64 / 2.0 {
            return Err(ConfigError::InvalidArgument {
                arg: "nw",
                reason: "time-bandwidth product must be < n / 2",
            });
        }
        if config.n_tapers == 0 || config.n_tapers > config.n {
            return Err(ConfigError::InvalidArgument {
                arg: "n_tapers",
                reason: "number of tapers must lie in [1, n]",
            });
        }
        if !(config.options.tolerance > 0.0) || config.options.max_iterations == 0 {
            return Err(ConfigError::InvalidArgument {
                arg: "options",
                reason: "inverse iteration needs a positive tolerance and iteration cap",
            });
        }
        Ok(Self {
            n: config.n,
            nw: config.nw,
            n_tapers: config.n_tapers,
            options: config.options,
        })
    }
}

impl DpssKernel {
    fn half_bandwidth(&self) -> f64 {
        self.nw / self.n as f64
    }

    fn slepian_matrix(&self) -> Result<SymTridiagonal, ConfigError> {
        let n = self.n;
        let cos_w = (2.0 * PI * self.half_bandwidth()).cos();
        let centre = (n as f64 - 1.0) / 2.0;
        let diag = (0..n)
            .map(|t| {
                let d = centre - t as f64;
                d * d * cos_w
            })
            .collect();
        let off = (1..n).map(|t| (t * (n - t)) as f64 / 2.0).collect();
        SymTridiagonal::new(diag, off)
    }
}

impl TaperGenerate for DpssKernel {
    fn run(&self) -> Result<TaperSet, ExecInvariantViolation> {
        log::trace!(
            "generating {} dpss tapers (n = {}, nw = {})",
            self.n_tapers,
            self.n,
            self.nw
        );
        let matrix = self.slepian_matrix()?;
        let mut vectors: Vec<DVector<f64>> = Vec::with_capacity(self.n_tapers);
        for lambda in matrix.largest_eigenvalues(self.n_tapers) {
            let v = matrix
                .eigenvector(lambda, &vectors, &self.options)
                .inspect_err(|err| log::error!("dpss eigensolver failed: {err}"))?;
            vectors.push(v);
        }

        let mut tapers = Array2::zeros((self.n_tapers, self.n));
        for (k, v) in vectors.iter().enumerate() {
            let sign = sign_convention(k, v.as_slice());
            for (dst, src) in tapers.row_mut(k).iter_mut().zip(v.iter()) {
                *dst = sign * src;
            }
        }

        let w = self.half_bandwidth();
        let mut planner = FftPlanner::<f64>::new();
        let mut eigenvalues: Vec<f64> = vectors
            .iter()
            .map(|v| concentration(v.as_slice(), w, &mut planner))
            .collect();
        // Concentrations within rounding of 1 can come out of order.
        for k in 1..eigenvalues.len() {
            eigenvalues[k] = eigenvalues[k].min(eigenvalues[k - 1]);
        }
        Ok(TaperSet::from_parts(tapers, eigenvalues, self.nw))
    }
}

/// `±1` so that even tapers sum positive and odd tapers start positive.
fn sign_convention(k: usize, v: &[f64]) -> f64 {
    if k % 2 == 0 {
        if v.iter().sum::<f64>() < 0.0 {
            -1.0
        } else {
            1.0
        }
    } else {
        let threshold = (1.0 / v.len() as f64).max(1e-7);
        match v.iter().find(|s| s.abs() > threshold) {
            Some(s) if *s < 0.0 => -1.0,
            _ => 1.0,
        }
    }
}

/// Fraction of a taper's energy inside `[-W, W]`.
///
/// `λ = Σ_τ r(τ) sin(2πWτ) / (πτ)`, with the autocorrelation `r` evaluated by FFT.
fn concentration(v: &[f64], w: f64, planner: &mut FftPlanner<f64>) -> f64 {
    let n = v.len();
    let m = (2 * n - 1).next_power_of_two();
    let forward = planner.plan_fft_forward(m);
    let inverse = planner.plan_fft_inverse(m);
    let mut buf = vec![Complex::new(0.0, 0.0); m];
    for (dst, src) in buf.iter_mut().zip(v.iter()) {
        *dst = Complex::new(*src, 0.0);
    }
    forward.process(&mut buf);
    for c in buf.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buf);
    let scale = 1.0 / m as f64;

    let lagged: f64 = (1..n)
        .map(|tau| {
            let tau_f = tau as f64;
            buf[tau].re * scale * (2.0 * PI * w * tau_f).sin() / (PI * tau_f)
        })
        .sum();
    let lambda = 2.0 * w * buf[0].re * scale + 2.0 * lagged;
    lambda.clamp(0.0, 1.0 - f64::EPSILON)
}

/// Generate `n_tapers` DPSS tapers of length `n` with time-bandwidth product `nw`.
pub fn dpss(n: usize, nw: f64, n_tapers: usize) -> Result<TaperSet, ExecInvariantViolation> {
    let kernel = DpssKernel::try_new(DpssConfig {
        n,
        nw,
        n_tapers,
        options: InverseIterationOptions::default(),
    })?;
    kernel.run()
}
