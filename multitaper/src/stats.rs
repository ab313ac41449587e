//! Moments and reference distributions used by the estimators.

use crate::kernel::ExecInvariantViolation;
use core::borrow::Borrow;
use num_traits::Float;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal, StudentsT};

///
/// Compute the mean of the data.
///
/// Returns `(mean, count)`; an empty iterator gives `(0, 0)`.
///
/// ```
/// use multitaper::stats::mean;
/// let y = [1.0f64, 2.0, 3.0, 4.0];
/// assert_eq!(mean::<_, f64>(y.iter()), (2.5, 4));
/// ```
pub fn mean<YI, F>(y: YI) -> (F, usize)
where
    F: Float,
    YI: Iterator,
    YI::Item: Borrow<F>,
{
    let (sum, count) = y.fold((F::zero(), 0usize), |acc, yi| (acc.0 + *yi.borrow(), acc.1 + 1));
    match F::from(count) {
        Some(n) if count > 0 => (sum / n, count),
        _ => (F::zero(), 0),
    }
}

///
/// Compute the mean square of the data, `Σy²/n`.
///
pub fn mean_square<YI, F>(y: YI) -> (F, usize)
where
    F: Float,
    YI: Iterator,
    YI::Item: Borrow<F>,
{
    mean(y.map(|yi| {
        let v = *yi.borrow();
        v * v
    }))
}

///
/// Compute the (population) variance of the data.
///
pub fn variance<YI, F>(y: YI) -> (F, usize)
where
    F: Float,
    YI: Iterator + Clone,
    YI::Item: Borrow<F>,
{
    let (avg, n): (F, usize) = mean(y.clone());
    let (ms, _) = mean_square(y.map(|f| *f.borrow() - avg));
    (ms, n)
}

/// Survival function `P(F > f)` of the F(2, m) distribution.
///
/// The two-numerator-degree case has the closed form `(1 + 2f/m)^(-m/2)`.
pub fn f2_survival(f: f64, m: f64) -> f64 {
    if f <= 0.0 {
        return 1.0;
    }
    if m <= 0.0 {
        return 0.0;
    }
    (1.0 + 2.0 * f / m).powf(-m / 2.0)
}

/// Critical value of F(2, m) at significance level `alpha`.
///
/// Returns `+inf` when `m == 0` (a single taper carries no residual degrees of freedom).
pub fn f2_critical(alpha: f64, m: f64) -> f64 {
    if m <= 0.0 {
        return f64::INFINITY;
    }
    m / 2.0 * (alpha.powf(-2.0 / m) - 1.0)
}

/// Quantile of the standard normal distribution.
pub fn normal_quantile(p: f64) -> Result<f64, ExecInvariantViolation> {
    let normal = Normal::new(0.0, 1.0).map_err(|_| ExecInvariantViolation::InvalidState {
        reason: "standard normal distribution could not be constructed",
    })?;
    Ok(normal.inverse_cdf(p))
}

/// Quantile of Student's t distribution with `dof` degrees of freedom.
pub fn students_t_quantile(p: f64, dof: f64) -> Result<f64, ExecInvariantViolation> {
    let t = StudentsT::new(0.0, 1.0, dof).map_err(|_| ExecInvariantViolation::InvalidState {
        reason: "student t distribution requires positive degrees of freedom",
    })?;
    Ok(t.inverse_cdf(p))
}

/// Quantile of the chi-square distribution with `dof` degrees of freedom.
pub fn chi_squared_quantile(p: f64, dof: f64) -> Result<f64, ExecInvariantViolation> {
    let chi2 = ChiSquared::new(dof).map_err(|_| ExecInvariantViolation::InvalidState {
        reason: "chi-square distribution requires positive degrees of freedom",
    })?;
    Ok(chi2.inverse_cdf(p))
}

/// Validate a two-sided confidence level and return its upper tail probability.
pub(crate) fn upper_tail(confidence: f64) -> Result<f64, ExecInvariantViolation> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(ExecInvariantViolation::InvalidState {
            reason: "confidence level must lie in (0, 1)",
        });
    }
    Ok(0.5 + confidence / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_variance_match_reference() {
        let input = [1.0f64, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(mean::<_, f64>(input.iter()), (3.0, 5));
        assert_relative_eq!(variance::<_, f64>(input.iter()).0, 2.0);
        assert_relative_eq!(mean_square::<_, f64>(input.iter()).0, 11.0);
    }

    #[test]
    fn empty_mean_is_zero() {
        let input: [f64; 0] = [];
        assert_eq!(mean::<_, f64>(input.iter()), (0.0, 0));
    }

    #[test]
    fn f2_critical_inverts_survival() {
        // F(2, 12) 95% quantile from standard tables.
        let crit = f2_critical(0.05, 12.0);
        assert_relative_eq!(crit, 3.885, epsilon = 1e-3);
        assert_relative_eq!(f2_survival(crit, 12.0), 0.05, epsilon = 1e-12);
        assert!(f2_critical(0.05, 0.0).is_infinite());
    }

    #[test]
    fn quantiles_match_tables() {
        assert_relative_eq!(normal_quantile(0.975).expect("normal"), 1.959964, epsilon = 1e-5);
        assert_relative_eq!(
            students_t_quantile(0.975, 6.0).expect("t"),
            2.446912,
            epsilon = 1e-5
        );
        assert_relative_eq!(
            chi_squared_quantile(0.975, 14.0).expect("chi2"),
            26.118948,
            epsilon = 1e-3
        );
    }

    #[test]
    fn confidence_level_is_validated() {
        assert!(upper_tail(1.0).is_err());
        assert!(upper_tail(0.0).is_err());
        assert_relative_eq!(upper_tail(0.95).expect("valid"), 0.975);
    }
}
