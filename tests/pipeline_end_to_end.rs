mod common;

use pivcorr::{ImageView, PassConfig, PivConfig, PivProcessor, ShiftScheme};

fn run(size: usize, a: &[f32], b: &[f32], config: PivConfig) -> pivcorr::PivOutput {
    let va = ImageView::from_slice(a, size, size).unwrap();
    let vb = ImageView::from_slice(b, size, size).unwrap();
    PivProcessor::new(config).process(va, vb).unwrap()
}

#[test]
fn single_pass_recovers_subpixel_shift() {
    let size = 192;
    let (dx, dy) = (0.3f32, -0.2f32);
    let (a, b) = common::shifted_pair(size, dx, dy, 11);
    let config = PivConfig {
        passes: vec![PassConfig::new(64, 0.5)],
        ..PivConfig::default()
    };
    let out = run(size, &a, &b, config);

    let mut valid = 0;
    for (r, c, v) in out.field.iter().filter(|(_, _, v)| v.status.valid) {
        assert!((v.dx - dx).abs() < 0.05, "({r}, {c}) dx {}", v.dx);
        assert!((v.dy - dy).abs() < 0.05, "({r}, {c}) dy {}", v.dy);
        valid += 1;
    }
    assert!(valid * 2 >= out.field.len(), "{valid} valid vectors");
}

#[test]
fn multi_pass_recovers_uniform_shift() {
    let size = 256;
    let (dx, dy) = (2.3f32, -1.1f32);
    let (a, b) = common::shifted_pair(size, dx, dy, 2024);
    let config = PivConfig {
        passes: vec![PassConfig::new(64, 0.5), PassConfig::new(32, 0.75)],
        ..PivConfig::default()
    };
    let threshold = config.validation.snr_threshold;
    let out = run(size, &a, &b, config);

    assert_eq!(out.passes.len(), 2);
    assert_eq!(out.grid.window_size(), 32);
    assert_eq!(out.grid.spacing(), 8);

    for v in out.field.as_slice().iter().filter(|v| v.status.valid) {
        assert!((v.dx - dx).abs() < 0.1, "dx {}", v.dx);
        assert!((v.dy - dy).abs() < 0.1, "dy {}", v.dy);
    }
    let total = out.field.len();
    let strong = out
        .field
        .as_slice()
        .iter()
        .filter(|v| v.snr > threshold)
        .count();
    assert!(strong * 100 >= total * 95, "{strong} of {total} above threshold");
    assert!(out.passes[1].residual < out.passes[0].residual);
}

#[test]
fn forward_scheme_also_converges() {
    let size = 160;
    let (dx, dy) = (-1.6f32, 0.7f32);
    let (a, b) = common::shifted_pair(size, dx, dy, 5);
    let config = PivConfig {
        passes: vec![PassConfig::new(48, 0.5), PassConfig::new(32, 0.5)],
        shift_scheme: ShiftScheme::Forward,
        ..PivConfig::default()
    };
    let out = run(size, &a, &b, config);
    let (r, c) = (out.grid.rows() / 2, out.grid.cols() / 2);
    let v = out.field.get(r, c).unwrap();
    assert!((v.dx - dx).abs() < 0.1, "dx {}", v.dx);
    assert!((v.dy - dy).abs() < 0.1, "dy {}", v.dy);
}

#[test]
fn uniform_frames_give_zero_snr_without_error() {
    let size = 96;
    let a = vec![80.0f32; size * size];
    let config = PivConfig {
        passes: vec![PassConfig::new(32, 0.5)],
        ..PivConfig::default()
    };
    let out = run(size, &a, &a, config);
    assert_eq!(out.field.valid_count(), 0);
    assert!(out.field.as_slice().iter().all(|v| v.snr == 0.0));
    assert_eq!(out.unresolved.len(), out.field.len());
    assert_eq!(out.passes[0].degenerate, out.field.len());
}

#[test]
fn early_stop_ends_repeated_schedule() {
    let size = 128;
    let (a, b) = common::shifted_pair(size, 1.0, 0.5, 77);
    let config = PivConfig {
        passes: vec![PassConfig::new(32, 0.5); 6],
        early_stop_tolerance: Some(0.2),
        ..PivConfig::default()
    };
    let out = run(size, &a, &b, config);
    assert!(out.passes.len() < 6, "ran {} passes", out.passes.len());
    assert!(out.passes.len() >= 2);
}

#[test]
fn trust_first_pass_skips_first_validation() {
    let size = 128;
    let (a, b) = common::shifted_pair(size, 0.8, 0.4, 9);
    let config = PivConfig {
        passes: vec![PassConfig::new(32, 0.5)],
        trust_first_pass: true,
        ..PivConfig::default()
    };
    let out = run(size, &a, &b, config);
    assert_eq!(out.passes[0].invalid, 0);
    assert_eq!(out.passes[0].replaced, 0);
}

#[test]
fn skipped_validation_still_flags_degenerate_cells() {
    let size = 96;
    let a = vec![80.0f32; size * size];
    let config = PivConfig {
        passes: vec![PassConfig::new(32, 0.5)],
        trust_first_pass: true,
        ..PivConfig::default()
    };
    let out = run(size, &a, &a, config);
    assert_eq!(out.passes[0].invalid, 0);
    assert_eq!(out.unresolved.len(), out.field.len());
    assert_eq!(out.passes[0].unresolved, out.field.len());
    assert!(out.field.as_slice().iter().all(|v| !v.status.valid));
}

#[test]
fn right_edge_column_is_unbiased() {
    // windows in the last column reach past the frame edge once shifted
    let size = 256;
    let (dx, dy) = (2.3f32, -1.1f32);
    let (a, b) = common::shifted_pair(size, dx, dy, 3);
    let config = PivConfig {
        passes: vec![PassConfig::new(64, 0.5), PassConfig::new(32, 0.75)],
        ..PivConfig::default()
    };
    let out = run(size, &a, &b, config);
    let last = out.grid.cols() - 1;
    for r in 0..out.grid.rows() {
        let v = out.field.get(r, last).unwrap();
        if v.status.valid {
            assert!((v.dx - dx).abs() < 0.1, "({r}, {last}) dx {}", v.dx);
            assert!((v.dy - dy).abs() < 0.1, "({r}, {last}) dy {}", v.dy);
        }
    }
}
