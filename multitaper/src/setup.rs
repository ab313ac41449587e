//! Validated multitaper setup.

use crate::kernel::{ConfigError, KernelLifecycle};
use crate::spectral::{AdaptiveOptions, WeightingScheme};
use crate::stats::mean;

/// User-facing parameters; `None` fields take their documented default.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultitaperConfig {
    /// Input series of length `n`.
    pub x: Vec<f64>,
    /// Time-bandwidth product. Defaults to `4.0`.
    pub nw: f64,
    /// Number of tapers. Defaults to `round(2·nw − 1)`.
    pub n_tapers: Option<usize>,
    /// Sampling interval. Defaults to `1.0`.
    pub delta_t: f64,
    /// Transform length. Defaults to `2·n + 1`.
    pub n_fft: Option<usize>,
    /// Eigenspectrum combination scheme. Defaults to adaptive weighting.
    pub weighting_scheme: WeightingScheme,
    /// Denominator floor for adaptive weighting, relative to the series variance.
    ///
    /// Cross analyses also floor the transfer-function denominator at this
    /// fraction of the input series' mean auto-spectrum.
    pub water_level: f64,
    /// Subtract the sample mean before tapering. Defaults to `true`.
    pub remove_mean: bool,
    /// Convergence controls for adaptive weighting.
    pub adaptive: AdaptiveOptions,
}

impl MultitaperConfig {
    /// Default parameters for the series `x`.
    pub fn new(x: impl Into<Vec<f64>>) -> Self {
        Self {
            x: x.into(),
            ..Self::default()
        }
    }
}

impl Default for MultitaperConfig {
    fn default() -> Self {
        Self {
            x: Vec::new(),
            nw: 4.0,
            n_tapers: None,
            delta_t: 1.0,
            n_fft: None,
            weighting_scheme: WeightingScheme::default(),
            water_level: 0.0,
            remove_mean: true,
            adaptive: AdaptiveOptions::default(),
        }
    }
}

/// Immutable, validated estimation setup.
///
/// Constructed only through [`KernelLifecycle::try_new`]; every accessor can be
/// relied upon to satisfy `n_fft ≥ n`, `1 ≤ n_tapers ≤ min(n, n_fft − 1)`,
/// `0 < nw < n/2`, `delta_t > 0` and `water_level ≥ 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultitaperSetup {
    x: Vec<f64>,
    nw: f64,
    n_tapers: usize,
    delta_t: f64,
    n_fft: usize,
    weighting_scheme: WeightingScheme,
    water_level: f64,
    remove_mean: bool,
    adaptive: AdaptiveOptions,
}

impl KernelLifecycle for MultitaperSetup {
    type Config = MultitaperConfig;

    fn try_new(config: Self::Config) -> Result<Self, ConfigError> {
        let n = config.x.len();
        if n == 0 {
            return Err(ConfigError::EmptyInput { arg: "x" });
        }
        if config.x.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::NonFinite { arg: "x" });
        }
        if !config.nw.is_finite() || config.nw <= 0.0 {
            return Err(ConfigError::InvalidArgument {
                arg: "nw",
                reason: "time-bandwidth product must be positive",
            });
        }
        if config.nw >= n as f64 / 2.0 {
            return Err(ConfigError::InvalidArgument {
                arg: "nw",
                reason: "time-bandwidth product must be < n / 2",
            });
        }
        if !config.delta_t.is_finite() || config.delta_t <= 0.0 {
            return Err(ConfigError::InvalidArgument {
                arg: "delta_t",
                reason: "sampling interval must be positive",
            });
        }
        let n_fft = config.n_fft.unwrap_or(2 * n + 1);
        if n_fft == 0 {
            return Err(ConfigError::InvalidArgument {
                arg: "n_fft",
                reason: "number of FFT points must be positive",
            });
        }
        if n > n_fft {
            return Err(ConfigError::InvalidArgument {
                arg: "n_fft",
                reason: "input vector size exceeds number of FFT points",
            });
        }
        let n_tapers = config
            .n_tapers
            .unwrap_or_else(|| (2.0 * config.nw - 1.0).round().max(0.0) as usize);
        if n_tapers < 1 {
            return Err(ConfigError::InvalidArgument {
                arg: "n_tapers",
                reason: "number of tapers must be positive",
            });
        }
        if n_tapers > n || n_tapers >= n_fft {
            return Err(ConfigError::InvalidArgument {
                arg: "n_tapers",
                reason: "number of tapers must not exceed n and must be below n_fft",
            });
        }
        if !config.water_level.is_finite() || config.water_level < 0.0 {
            return Err(ConfigError::InvalidArgument {
                arg: "water_level",
                reason: "water level must be non-negative",
            });
        }
        if !(config.adaptive.tolerance > 0.0) || config.adaptive.max_iterations == 0 {
            return Err(ConfigError::InvalidArgument {
                arg: "adaptive",
                reason: "adaptive weighting needs a positive tolerance and iteration cap",
            });
        }
        Ok(Self {
            x: config.x,
            nw: config.nw,
            n_tapers,
            delta_t: config.delta_t,
            n_fft,
            weighting_scheme: config.weighting_scheme,
            water_level: config.water_level,
            remove_mean: config.remove_mean,
            adaptive: config.adaptive,
        })
    }
}

impl MultitaperSetup {
    /// Raw input series.
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    /// Series length.
    pub fn n(&self) -> usize {
        self.x.len()
    }

    /// Time-bandwidth product.
    pub fn nw(&self) -> f64 {
        self.nw
    }

    /// Number of tapers.
    pub fn n_tapers(&self) -> usize {
        self.n_tapers
    }

    /// Sampling interval.
    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    /// Transform length.
    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    /// Number of one-sided frequency bins, `n_fft / 2 + 1`.
    pub fn n_freq(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Eigenspectrum combination scheme.
    pub fn weighting_scheme(&self) -> WeightingScheme {
        self.weighting_scheme
    }

    /// Adaptive-weighting water level.
    pub fn water_level(&self) -> f64 {
        self.water_level
    }

    /// Whether the sample mean is removed before tapering.
    pub fn remove_mean(&self) -> bool {
        self.remove_mean
    }

    /// Adaptive-weighting convergence controls.
    pub fn adaptive(&self) -> AdaptiveOptions {
        self.adaptive
    }

    /// Half-bandwidth `W = nw / (n · delta_t)` in frequency units.
    pub fn bandwidth(&self) -> f64 {
        self.nw / (self.n() as f64 * self.delta_t)
    }

    /// The series handed to the transform: mean-removed when configured.
    pub fn prepared_series(&self) -> Vec<f64> {
        if !self.remove_mean {
            return self.x.clone();
        }
        let (avg, _): (f64, usize) = mean(self.x.iter());
        self.x.iter().map(|v| v - avg).collect()
    }

    /// Copy of this setup analysing a different series of the same length.
    pub(crate) fn with_series(&self, x: Vec<f64>) -> Self {
        debug_assert_eq!(x.len(), self.n());
        Self { x, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> Vec<f64> {
        (0..1337).map(|i| ((i * 7919) % 101) as f64 / 101.0).collect()
    }

    #[test]
    fn defaults_follow_documented_values() {
        let setup = MultitaperSetup::try_new(MultitaperConfig::new(series())).expect("valid");
        assert_eq!(setup.n(), 1337);
        assert_eq!(setup.nw(), 4.0);
        assert_eq!(setup.n_tapers(), 7);
        assert_eq!(setup.delta_t(), 1.0);
        assert_eq!(setup.n_fft(), 2 * 1337 + 1);
        assert_eq!(setup.n_freq(), 1338);
        assert_eq!(setup.weighting_scheme(), WeightingScheme::Adaptive);
        assert_eq!(setup.water_level(), 0.0);
        assert!(setup.remove_mean());
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let x = series();
        let cases = [
            MultitaperConfig::new(Vec::new()),
            MultitaperConfig {
                nw: 0.0,
                ..MultitaperConfig::new(x.clone())
            },
            MultitaperConfig {
                n_tapers: Some(0),
                ..MultitaperConfig::new(x.clone())
            },
            MultitaperConfig {
                delta_t: 0.0,
                ..MultitaperConfig::new(x.clone())
            },
            MultitaperConfig {
                n_fft: Some(0),
                ..MultitaperConfig::new(x.clone())
            },
            MultitaperConfig {
                n_fft: Some(x.len() / 2),
                ..MultitaperConfig::new(x.clone())
            },
            MultitaperConfig {
                water_level: -1.0,
                ..MultitaperConfig::new(x.clone())
            },
            MultitaperConfig::new(vec![1.0, f64::INFINITY, 2.0]),
        ];
        for config in cases {
            assert!(MultitaperSetup::try_new(config).is_err());
        }
    }

    #[test]
    fn error_names_the_failed_constraint() {
        let err = MultitaperSetup::try_new(MultitaperConfig {
            n_fft: Some(10),
            ..MultitaperConfig::new(series())
        })
        .expect_err("n_fft too small");
        assert_eq!(
            err,
            ConfigError::InvalidArgument {
                arg: "n_fft",
                reason: "input vector size exceeds number of FFT points",
            }
        );
        assert_eq!(
            MultitaperSetup::try_new(MultitaperConfig::new(Vec::new())),
            Err(ConfigError::EmptyInput { arg: "x" })
        );
    }

    #[test]
    fn small_nw_defaults_to_at_least_one_taper_or_fails() {
        let err = MultitaperSetup::try_new(MultitaperConfig {
            nw: 0.5,
            ..MultitaperConfig::new(series())
        })
        .expect_err("round(2·0.5 − 1) = 0 tapers");
        assert!(matches!(err, ConfigError::InvalidArgument { arg: "n_tapers", .. }));

        let setup = MultitaperSetup::try_new(MultitaperConfig {
            nw: 0.5,
            n_tapers: Some(1),
            ..MultitaperConfig::new(series())
        })
        .expect("explicit taper count");
        assert_eq!(setup.n_tapers(), 1);
    }

    #[test]
    fn prepared_series_removes_mean() {
        let err = MultitaperSetup::try_new(MultitaperConfig::new(vec![1.0, 2.0, 3.0, 6.0]))
            .expect_err("nw = 4 is too wide for 4 samples");
        assert!(matches!(err, ConfigError::InvalidArgument { arg: "nw", .. }));

        let setup = MultitaperSetup::try_new(MultitaperConfig {
            nw: 1.5,
            ..MultitaperConfig::new(vec![1.0, 2.0, 3.0, 6.0])
        })
        .expect("valid");
        assert_eq!(setup.prepared_series(), vec![-2.0, -1.0, 0.0, 3.0]);
    }
}
