use ndarray::{Array2, ArrayView1, ArrayView2};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Tapered, zero-padded Fourier transforms of a series, one row per taper.
///
/// `coefficients()[[k, f]]` is `y_k(f) = Σ_t v_k(t) x(t) e^{−2πi f t / n_fft}`
/// over the full two-sided grid of `n_fft` bins.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenSpectra {
    coefficients: Array2<Complex<f64>>,
}

impl EigenSpectra {
    /// Transform `x` with every row of `tapers` at `n_fft` points.
    ///
    /// `x.len()` must equal the taper length and not exceed `n_fft`.
    pub fn compute(x: &[f64], tapers: ArrayView2<'_, f64>, n_fft: usize) -> Self {
        debug_assert_eq!(x.len(), tapers.ncols());
        debug_assert!(n_fft >= x.len());
        log::trace!(
            "eigenspectra: {} tapers, n = {}, n_fft = {}",
            tapers.nrows(),
            x.len(),
            n_fft
        );
        let fft = FftPlanner::<f64>::new().plan_fft_forward(n_fft);
        let transform = |k: usize| tapered_fft(x, tapers.row(k), n_fft, &fft);

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<Complex<f64>>> = (0..tapers.nrows())
            .into_par_iter()
            .map(transform)
            .collect();
        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<Complex<f64>>> = (0..tapers.nrows()).map(transform).collect();

        let mut coefficients = Array2::zeros((tapers.nrows(), n_fft));
        for (mut dst, src) in coefficients.rows_mut().into_iter().zip(rows.iter()) {
            dst.assign(&ArrayView1::from(src.as_slice()));
        }
        Self { coefficients }
    }

    /// Number of tapers.
    pub fn n_tapers(&self) -> usize {
        self.coefficients.nrows()
    }

    /// Transform length.
    pub fn n_fft(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Number of one-sided bins.
    pub fn n_freq(&self) -> usize {
        self.n_fft() / 2 + 1
    }

    /// Complex eigencoefficients, `n_tapers × n_fft`.
    pub fn coefficients(&self) -> ArrayView2<'_, Complex<f64>> {
        self.coefficients.view()
    }

    /// Eigenspectral powers `Ŝ_k(f) = delta_t · |y_k(f)|²` on the one-sided grid.
    pub fn powers(&self, delta_t: f64) -> Array2<f64> {
        Array2::from_shape_fn((self.n_tapers(), self.n_freq()), |(k, f)| {
            delta_t * self.coefficients[[k, f]].norm_sqr()
        })
    }
}

fn tapered_fft(
    x: &[f64],
    taper: ArrayView1<'_, f64>,
    n_fft: usize,
    fft: &Arc<dyn Fft<f64>>,
) -> Vec<Complex<f64>> {
    let mut buf = vec![Complex::new(0.0, 0.0); n_fft];
    for ((dst, xi), vi) in buf.iter_mut().zip(x.iter()).zip(taper.iter()) {
        *dst = Complex::new(xi * vi, 0.0);
    }
    fft.process(&mut buf);
    buf
}
