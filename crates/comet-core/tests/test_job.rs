mod common;

use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use comet_core::config::{AlignmentConfig, LinearFitConfig, OperandConfig};
use comet_core::frame::{Delta, FrameData};
use comet_core::homography::Homography;
use comet_core::image::PixelBuffer;
use comet_core::interpolation::{InterpolationConfig, PixelInterpolation};
use comet_core::io::EmbeddedMetadata;
use comet_core::job::{AlignmentJob, DrizzleSource, JobContext};
use comet_core::progress::{CancelToken, JobMonitor, JobState};

use common::{f32_channel, gray_f32};

const SIZE: usize = 16;

fn target_value(_r: usize, c: usize) -> f32 {
    0.5 + 0.01 * c as f32
}

fn operand_value(r: usize, c: usize) -> f32 {
    0.1 + 0.001 * (r * SIZE + c) as f32
}

fn frame(path: &str, buffer: PixelBuffer) -> FrameData {
    FrameData {
        path: PathBuf::from(path),
        buffer,
        metadata: EmbeddedMetadata::default(),
    }
}

fn config(operand: Option<OperandConfig>) -> AlignmentConfig {
    AlignmentConfig {
        operand,
        interpolation: InterpolationConfig::new(PixelInterpolation::NearestNeighbor),
        ..Default::default()
    }
}

fn operand_config(subtract_mode: bool, normalize: bool, fit: bool) -> OperandConfig {
    OperandConfig {
        subtract_mode,
        normalize,
        linear_fit: LinearFitConfig {
            enabled: fit,
            ..Default::default()
        },
        ..OperandConfig::new("/virtual/operand.tif")
    }
}

fn job(
    config: &AlignmentConfig,
    target: PixelBuffer,
    operand: Option<PixelBuffer>,
    delta: Delta,
    drizzle: Option<DrizzleSource>,
) -> AlignmentJob {
    let context = Arc::new(JobContext::new(config, operand.map(Arc::new)));
    AlignmentJob::new(
        0,
        frame("/virtual/target.tif", target),
        delta,
        drizzle,
        context,
        Arc::new(JobMonitor::new()),
    )
}

fn median(values: &Array2<f32>) -> f64 {
    let mut v: Vec<f64> = values.iter().map(|&x| x as f64).collect();
    v.sort_by(f64::total_cmp);
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

fn normalized(values: &Array2<f32>) -> Array2<f32> {
    let m = median(values);
    values.mapv(|v| if v > 0.0 { (v as f64 - m) as f32 } else { v })
}

/// Operand shifted the way the motion (2, 1) inverse warp moves it.
fn shifted_operand() -> Array2<f32> {
    Array2::from_shape_fn((SIZE, SIZE), |(r, c)| {
        if r >= 1 && c >= 2 {
            operand_value(r - 1, c - 2)
        } else {
            0.0
        }
    })
}

#[test]
fn test_align_only() {
    let config = config(None);
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        None,
        Delta::new(2.0, 1.0),
        None,
    );
    job.run(&CancelToken::new());

    assert_eq!(job.state(), JobState::Finished);
    assert_eq!(job.monitor().status(), "Done");
    assert!(job.fits().is_empty());
    let out = f32_channel(&job.target().buffer, 0);
    assert_eq!(out[[3, 4]], target_value(4, 6));
    assert_eq!(out[[SIZE - 1, 0]], 0.0);
    assert_eq!(out[[0, SIZE - 2]], 0.0);
}

#[test]
fn test_subtract_mode_aligns_operand_to_target() {
    let config = config(Some(operand_config(true, true, false)));
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(SIZE, SIZE, operand_value)),
        Delta::new(2.0, 1.0),
        None,
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());

    let op = normalized(&shifted_operand());
    let out = f32_channel(&job.target().buffer, 0);
    for r in 0..SIZE {
        for c in 0..SIZE {
            let expected = (target_value(r, c) as f64 - op[[r, c]] as f64).clamp(0.0, 1.0);
            assert_abs_diff_eq!(out[[r, c]] as f64, expected, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_star_mode_subtracts_then_aligns() {
    let config = config(Some(operand_config(false, true, false)));
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(SIZE, SIZE, operand_value)),
        Delta::new(2.0, 1.0),
        None,
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());

    let op = normalized(&Array2::from_shape_fn((SIZE, SIZE), |(r, c)| operand_value(r, c)));
    let out = f32_channel(&job.target().buffer, 0);
    for r in 0..SIZE - 1 {
        for c in 0..SIZE - 2 {
            let (sr, sc) = (r + 1, c + 2);
            let expected = (target_value(sr, sc) as f64 - op[[sr, sc]] as f64).clamp(0.0, 1.0);
            assert_abs_diff_eq!(out[[r, c]] as f64, expected, epsilon = 1e-6);
        }
    }
    assert_eq!(out[[SIZE - 1, 3]], 0.0);
}

#[test]
fn test_linear_fit_removes_matching_operand() {
    let config = config(Some(operand_config(true, false, true)));
    let shifted = shifted_operand();
    let target = gray_f32(SIZE, SIZE, |r, c| {
        if shifted[[r, c]] > 0.0 {
            shifted[[r, c]]
        } else {
            0.3
        }
    });
    let mut job = job(
        &config,
        target,
        Some(gray_f32(SIZE, SIZE, operand_value)),
        Delta::new(2.0, 1.0),
        None,
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());

    assert_eq!(job.fits().len(), 1);
    assert_abs_diff_eq!(job.fits()[0].slope, 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(job.fits()[0].intercept, 0.0, epsilon = 1e-4);
    let out = f32_channel(&job.target().buffer, 0);
    assert_abs_diff_eq!(out[[8, 8]], 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(out[[0, 0]], 0.3, epsilon = 1e-6);
}

#[test]
fn test_cancelled_job_is_aborted() {
    let config = config(None);
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        None,
        Delta::new(1.0, 1.0),
        None,
    );
    let cancel = CancelToken::new();
    cancel.cancel();
    job.run(&cancel);
    assert_eq!(job.state(), JobState::Aborted);
    assert_eq!(job.monitor().status(), "Aborted");
    assert!(job.error().is_none());
}

#[test]
fn test_failure_is_recorded() {
    let config = config(Some(operand_config(true, true, false)));
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(8, 8, operand_value)),
        Delta::new(1.0, 1.0),
        None,
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Failed);
    assert!(job.monitor().status().starts_with("Error: "));
    assert!(job.error().is_some());
}

#[test]
fn test_fit_failure_is_recorded() {
    let config = config(Some(operand_config(true, true, true)));
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(SIZE, SIZE, |_, _| 0.97)),
        Delta::default(),
        None,
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Failed);
    assert!(job.error().unwrap().contains("channel 0"), "{:?}", job.error());
}

#[test]
fn test_drizzle_source_reconstruction() {
    let mut cfg = config(Some(operand_config(true, false, false)));
    cfg.drizzle.save_star_aligned = true;
    let source_value = |r: usize, c: usize| 0.6 + 0.005 * (r + c) as f32;
    let drizzle = DrizzleSource {
        path: PathBuf::from("/virtual/raw.fit"),
        matrix: Homography::translation(1.0, 0.0),
        data: Some(frame("/virtual/raw.fit", gray_f32(SIZE, SIZE, source_value))),
    };
    let mut job = job(
        &cfg,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(SIZE, SIZE, operand_value)),
        Delta::new(2.0, 1.0),
        Some(drizzle),
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());

    // Drizzle matrix (1, 0) composed with motion (2, 1).
    let source = job.drizzle().unwrap().data.as_ref().unwrap();
    let out = f32_channel(&source.buffer, 0);
    for (r, c) in [(0, 0), (1, 3), (5, 7), (15, 15)] {
        let op = if r >= 1 && c >= 3 {
            operand_value(r - 1, c - 3)
        } else {
            0.0
        };
        let expected = (source_value(r, c) as f64 - op as f64).clamp(0.0, 1.0);
        assert_abs_diff_eq!(out[[r, c]] as f64, expected, epsilon = 1e-6);
    }

    let star_aligned = f32_channel(job.star_aligned().unwrap(), 0);
    assert_eq!(star_aligned[[5, 6]], out[[5, 7]]);
    assert!(job.comet_aligned().is_none());
    assert!(job.drizzle_fits().is_empty());
}

#[test]
fn test_drizzle_without_data_is_untouched() {
    let cfg = config(None);
    let drizzle = DrizzleSource {
        path: PathBuf::from("/virtual/raw.fit"),
        matrix: Homography::IDENTITY,
        data: None,
    };
    let mut job = job(
        &cfg,
        gray_f32(SIZE, SIZE, target_value),
        None,
        Delta::default(),
        Some(drizzle),
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished);
    assert!(job.star_aligned().is_none());
}

/// Operand value between pixel centres; the operand is linear in row and
/// column, so bilinear sampling reproduces it exactly.
fn operand_at(r: f64, c: f64) -> f64 {
    0.1 + 0.001 * (r * SIZE as f64 + c)
}

fn drizzle_integration_config(subtract_mode: bool) -> AlignmentConfig {
    let mut operand = operand_config(subtract_mode, false, false);
    operand.drizzle_integration = true;
    AlignmentConfig {
        interpolation: InterpolationConfig::new(PixelInterpolation::Bilinear),
        ..config(Some(operand))
    }
}

#[test]
fn test_drizzle_integration_operand_subtract_mode() {
    let config = drizzle_integration_config(true);
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(SIZE, SIZE, operand_value)),
        Delta::new(2.0, 1.0),
        None,
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());

    // Operand warped through (translation(2, 1) * translation(0.5, 0.5))^-1.
    let out = f32_channel(&job.target().buffer, 0);
    for r in 0..SIZE {
        for c in 0..SIZE {
            let op = if r >= 2 && c >= 3 {
                operand_at(r as f64 - 1.5, c as f64 - 2.5)
            } else {
                0.0
            };
            let expected = target_value(r, c) as f64 - op;
            assert_abs_diff_eq!(out[[r, c]] as f64, expected, epsilon = 1e-5);
        }
    }
    assert_abs_diff_eq!(out[[5, 5]] as f64, 0.55 - 0.1585, epsilon = 1e-5);
}

#[test]
fn test_drizzle_integration_operand_star_mode() {
    let config = drizzle_integration_config(false);
    let mut job = job(
        &config,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(SIZE, SIZE, operand_value)),
        Delta::new(2.0, 1.0),
        None,
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());

    // Operand moved by translation(0.5, 0.5)^-1 and subtracted, then the
    // result is aligned through translation(2, 1).
    let out = f32_channel(&job.target().buffer, 0);
    for r in 0..SIZE - 1 {
        for c in 0..SIZE - 2 {
            let (sr, sc) = (r + 1, c + 2);
            let expected = target_value(sr, sc) as f64 - operand_at(sr as f64 - 0.5, sc as f64 - 0.5);
            assert_abs_diff_eq!(out[[r, c]] as f64, expected, epsilon = 1e-5);
        }
    }
    assert_eq!(out[[SIZE - 1, 0]], 0.0);
}

#[test]
fn test_drizzle_integration_source_reconstruction() {
    let cfg = drizzle_integration_config(true);
    let source_value = |r: usize, c: usize| 0.6 + 0.005 * (r + c) as f32;
    let drizzle = DrizzleSource {
        path: PathBuf::from("/virtual/raw.fit"),
        matrix: Homography::translation(1.0, 0.0),
        data: Some(frame("/virtual/raw.fit", gray_f32(SIZE, SIZE, source_value))),
    };
    let mut job = job(
        &cfg,
        gray_f32(SIZE, SIZE, target_value),
        Some(gray_f32(SIZE, SIZE, operand_value)),
        Delta::new(2.0, 1.0),
        Some(drizzle),
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());

    // translation(1, 0) * translation(2, 1) * translation(0.5, 0.5), inverted.
    let source = job.drizzle().unwrap().data.as_ref().unwrap();
    let out = f32_channel(&source.buffer, 0);
    for r in 0..SIZE {
        for c in 0..SIZE {
            let op = if r >= 2 && c >= 4 {
                operand_at(r as f64 - 1.5, c as f64 - 3.5)
            } else {
                0.0
            };
            let expected = source_value(r, c) as f64 - op;
            assert_abs_diff_eq!(out[[r, c]] as f64, expected, epsilon = 1e-5);
        }
    }
}
