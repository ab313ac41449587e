use crate::kernel::ConfigError;
use core::f64::consts::PI;
use ndarray::Array2;

/// Sine tapers `v_k(t) = √(2/(n+1)) · sin(πk(t+1)/(n+1))` for `k = 1..=n_tapers`.
///
/// Row `k − 1` holds taper `k`. The family is orthonormal for `n_tapers ≤ n`, and
/// taper `k` concentrates its energy around `±k / (2(n+1))` cycles per sample.
pub fn sine_tapers(n: usize, n_tapers: usize) -> Result<Array2<f64>, ConfigError> {
    if n == 0 {
        return Err(ConfigError::EmptyInput { arg: "n" });
    }
    if n_tapers == 0 || n_tapers > n {
        return Err(ConfigError::InvalidArgument {
            arg: "n_tapers",
            reason: "number of sine tapers must lie in [1, n]",
        });
    }
    let scale = (2.0 / (n as f64 + 1.0)).sqrt();
    let step = PI / (n as f64 + 1.0);
    Ok(Array2::from_shape_fn((n_tapers, n), |(k, t)| {
        scale * ((k + 1) as f64 * (t + 1) as f64 * step).sin()
    }))
}

/// Parabolic power weights `∝ 1 − ((k − 1)/K)²` for `k = 1..=K`, summing to one.
///
/// These minimise the local bias of a sine multitaper average (Riedel & Sidorenko).
pub fn parabolic_weights(n_tapers: usize) -> Vec<f64> {
    if n_tapers == 0 {
        return Vec::new();
    }
    let kk = n_tapers as f64;
    let raw: Vec<f64> = (0..n_tapers)
        .map(|j| 1.0 - (j as f64 / kk).powi(2))
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sine_tapers_are_orthonormal() {
        let v = sine_tapers(50, 10).expect("sine tapers");
        let gram = v.dot(&v.t());
        for i in 0..10 {
            for j in 0..10 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn rejects_too_many_tapers() {
        assert!(sine_tapers(8, 9).is_err());
        assert!(sine_tapers(0, 1).is_err());
    }

    #[test]
    fn parabolic_weights_sum_to_one_and_decay() {
        let w = parabolic_weights(6);
        assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(w.windows(2).all(|p| p[0] > p[1]));
        assert_eq!(parabolic_weights(1), vec![1.0]);
    }
}
