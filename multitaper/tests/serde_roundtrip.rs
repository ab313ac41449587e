#![cfg(feature = "serde")]

use multitaper::{
    mtspec, AdaptiveOptions, KernelLifecycle, MtSpec, MultitaperConfig, MultitaperSetup,
    ReshapedSpectrum, SpectralEstimate, WeightingScheme,
};
use std::f64::consts::PI;

fn tone_in_noise(n: usize) -> Vec<f64> {
    (0..n)
        .map(|t| {
            let t = t as f64;
            (2.0 * PI * 0.125 * t).cos() + 0.3 * (0.71 * t * t).sin()
        })
        .collect()
}

#[test]
fn config_survives_json() {
    let config = MultitaperConfig {
        nw: 3.5,
        n_tapers: Some(6),
        delta_t: 0.01,
        n_fft: Some(512),
        weighting_scheme: WeightingScheme::Eigenvalue,
        water_level: 0.25,
        remove_mean: false,
        adaptive: AdaptiveOptions {
            tolerance: 1e-6,
            max_iterations: 50,
        },
        ..MultitaperConfig::new(tone_in_noise(256))
    };
    let json = serde_json::to_string(&config).expect("serialize config");
    let back: MultitaperConfig = serde_json::from_str(&json).expect("deserialize config");
    assert_eq!(back, config);
}

#[test]
fn estimates_survive_json() {
    let est = mtspec(&tone_in_noise(256), 1.0, 4.0).expect("mtspec");
    let json = serde_json::to_string(&est).expect("serialize estimate");
    let back: SpectralEstimate = serde_json::from_str(&json).expect("deserialize estimate");
    assert_eq!(back, est);

    let spec = MtSpec::new(
        MultitaperSetup::try_new(MultitaperConfig::new(tone_in_noise(256))).expect("setup"),
    )
    .expect("mtspec");
    let reshaped = spec.reshape(0.01).expect("reshape");
    assert!(!reshaped.lines.is_empty());
    let json = serde_json::to_string(&reshaped).expect("serialize reshaped");
    let back: ReshapedSpectrum = serde_json::from_str(&json).expect("deserialize reshaped");
    assert_eq!(back, reshaped);
}
