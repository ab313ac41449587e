use multitaper::{KernelLifecycle, MtSpec, MultitaperConfig, MultitaperSetup, SpectralEstimator};
use std::f64::consts::PI;

fn pure_sine(n: usize, f0: f64) -> Vec<f64> {
    (0..n).map(|t| (2.0 * PI * f0 * t as f64).sin()).collect()
}

fn nearest_bin(frequencies: &[f64], f0: f64) -> usize {
    frequencies
        .iter()
        .enumerate()
        .min_by(|a, b| (a.1 - f0).abs().total_cmp(&(b.1 - f0).abs()))
        .map(|(i, _)| i)
        .expect("non-empty grid")
}

#[test]
fn peak_and_f_test_at_injected_frequency() {
    let _ = env_logger::builder().is_test(true).try_init();
    let n = 1024;
    let f0 = 0.1;
    let setup = MultitaperSetup::try_new(MultitaperConfig {
        nw: 4.0,
        delta_t: 1.0,
        ..MultitaperConfig::new(pure_sine(n, f0))
    })
    .expect("valid setup");
    assert_eq!(setup.n_tapers(), 7);
    let spec = MtSpec::new(setup).expect("mtspec");

    let bin = nearest_bin(spec.frequencies(), f0);
    let psd = spec.psd();
    let peak = psd[bin];

    // The multitaper line is a plateau of width 2W = 2·nw/n around f0; the
    // comparison bins sit just outside it.
    let w_bins = (2.0 * 4.0 / n as f64 * spec.setup().n_fft() as f64).ceil() as usize;
    for offset in [w_bins + 2, w_bins + 10, 3 * w_bins] {
        assert!(peak > 10.0 * psd[bin - offset], "below: offset {offset}");
        assert!(peak > 10.0 * psd[bin + offset], "above: offset {offset}");
    }
    let global_max = psd.iter().copied().fold(0.0, f64::max);
    assert!(peak >= 0.5 * global_max);

    let f = spec.f_test()[bin];
    assert!(f > 20.0, "F = {f}");
    let lines = spec.lines(spec.default_line_alpha()).expect("lines");
    assert!(lines.iter().any(|l| l.bin.abs_diff(bin) <= 1));
}

#[test]
fn line_power_matches_sinusoid_variance() {
    let n = 1024;
    let x: Vec<f64> = (0..n)
        .map(|t| 3.0 * (2.0 * PI * 128.0 * t as f64 / 2048.0 + 1.0).cos())
        .collect();
    let spec = MtSpec::new(
        MultitaperSetup::try_new(MultitaperConfig {
            n_fft: Some(2048),
            ..MultitaperConfig::new(x)
        })
        .expect("valid setup"),
    )
    .expect("mtspec");
    let line = spec
        .lines(0.001)
        .expect("lines")
        .into_iter()
        .find(|l| l.bin == 128)
        .expect("line at bin 128");
    assert!((line.power - 4.5).abs() < 0.05, "power {}", line.power);
    assert!((line.amplitude.arg() - 1.0).abs() < 1e-3, "phase {}", line.amplitude.arg());

    let reshaped = spec.reshape(0.001).expect("reshape");
    assert!(reshaped.psd[128] < 1e-3 * spec.psd()[128]);
}
