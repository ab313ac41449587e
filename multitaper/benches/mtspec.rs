use criterion::{criterion_group, criterion_main, Criterion};
use multitaper::kernel::KernelLifecycle;
use multitaper::taper::{DpssConfig, DpssKernel};
use multitaper::traits::TaperGenerate;
use multitaper::{CrossConfig, MtCross, MtSine, MtSpec, MultitaperConfig, MultitaperSetup};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::hint::black_box;
use std::sync::Arc;

fn noisy_tone(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 0.5).expect("valid normal distribution");
    (0..n)
        .map(|t| (2.0 * std::f64::consts::PI * 0.05 * t as f64).sin() + normal.sample(&mut rng))
        .collect()
}

fn dpss_4096(c: &mut Criterion) {
    let kernel = DpssKernel::try_new(DpssConfig {
        n: 4096,
        nw: 4.0,
        n_tapers: 7,
        options: Default::default(),
    })
    .expect("valid dpss kernel config");

    c.bench_function("dpss_4096_nw4_k7", |b| {
        b.iter(|| {
            black_box(
                kernel
                    .run()
                    .expect("benchmark input should satisfy dpss preconditions"),
            );
        });
    });
}

fn mtspec_adaptive_4096(c: &mut Criterion) {
    let setup = MultitaperSetup::try_new(MultitaperConfig::new(noisy_tone(4096, 1)))
        .expect("valid multitaper setup");
    let spec = MtSpec::new(setup.clone()).expect("mtspec");
    let tapers = Arc::clone(spec.tapers());

    c.bench_function("mtspec_adaptive_4096_shared_tapers", |b| {
        b.iter(|| {
            black_box(
                MtSpec::with_tapers(setup.clone(), Arc::clone(&tapers))
                    .expect("benchmark input should satisfy mtspec preconditions"),
            );
        });
    });
}

fn mtcross_4096(c: &mut Criterion) {
    let a = MultitaperSetup::try_new(MultitaperConfig::new(noisy_tone(4096, 2)))
        .expect("valid multitaper setup");
    let b = MultitaperSetup::try_new(MultitaperConfig::new(noisy_tone(4096, 3)))
        .expect("valid multitaper setup");

    c.bench_function("mtcross_4096", |bench| {
        bench.iter(|| {
            black_box(
                MtCross::from_setups(a.clone(), b.clone(), CrossConfig::default())
                    .expect("benchmark input should satisfy mtcross preconditions"),
            );
        });
    });
}

fn mtsine_4096(c: &mut Criterion) {
    let setup = MultitaperSetup::try_new(MultitaperConfig::new(noisy_tone(4096, 4)))
        .expect("valid multitaper setup");

    c.bench_function("mtsine_4096", |b| {
        b.iter(|| {
            black_box(
                MtSine::new(&setup).expect("benchmark input should satisfy mtsine preconditions"),
            );
        });
    });
}

criterion_group!(
    benches,
    dpss_4096,
    mtspec_adaptive_4096,
    mtcross_4096,
    mtsine_4096,
);
criterion_main!(benches);
