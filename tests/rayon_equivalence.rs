#![cfg(feature = "rayon")]

mod common;

use pivcorr::{CpuBackend, ImageView, PassConfig, PivConfig, PivProcessor};

#[test]
fn parallel_matches_sequential() {
    let size = 128;
    let (a, b) = common::shifted_pair(size, -0.9, 1.7, 12);
    let va = ImageView::from_slice(&a, size, size).unwrap();
    let vb = ImageView::from_slice(&b, size, size).unwrap();
    let config = |parallel| PivConfig {
        passes: vec![PassConfig::new(32, 0.5), PassConfig::new(16, 0.5)],
        parallel,
        ..PivConfig::default()
    };

    let sequential = PivProcessor::with_backend(config(false), CpuBackend::new().with_parallel(false))
        .process(va, vb)
        .unwrap();
    let parallel = PivProcessor::with_backend(config(true), CpuBackend::new().with_parallel(true))
        .process(va, vb)
        .unwrap();
    assert_eq!(sequential.field, parallel.field);
    assert_eq!(sequential.passes, parallel.passes);
}
