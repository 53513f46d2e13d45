mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use comet_core::config::{AlignmentConfig, LinearFitConfig, OperandConfig};
use comet_core::drizzle::read_drizzle_file;
use comet_core::frame::{Delta, FrameData};
use comet_core::homography::Homography;
use comet_core::image::PixelBuffer;
use comet_core::io::{EmbeddedMetadata, FormatCapabilities, Keyword};
use comet_core::job::{AlignmentJob, DrizzleSource, JobContext};
use comet_core::linear_fit::LinearFit;
use comet_core::output::{unique_path, FrameWriter};
use comet_core::progress::{CancelToken, JobMonitor, JobState};

use common::{gradient, gray_f32, MemoryCodec};

fn output_config(dir: &Path) -> AlignmentConfig {
    let mut config = AlignmentConfig::default();
    config.output.directory = dir.to_path_buf();
    config
}

fn metadata() -> EmbeddedMetadata {
    EmbeddedMetadata {
        keywords: vec![Keyword::new("EXPTIME", "120", "seconds")],
        icc_profile: Some(vec![1, 2, 3]),
        xml: Some(b"<xmp/>".to_vec()),
        ..Default::default()
    }
}

fn finished_job(
    config: &AlignmentConfig,
    target_path: &Path,
    operand: Option<PixelBuffer>,
    drizzle: Option<DrizzleSource>,
) -> AlignmentJob {
    let context = Arc::new(JobContext::new(config, operand.map(Arc::new)));
    let mut job = AlignmentJob::new(
        0,
        FrameData {
            path: target_path.to_path_buf(),
            buffer: gradient(16, 16),
            metadata: metadata(),
        },
        Delta::new(3.0, -1.5),
        drizzle,
        context,
        Arc::new(JobMonitor::new()),
    );
    job.run(&CancelToken::new());
    assert_eq!(job.state(), JobState::Finished, "{:?}", job.error());
    job
}

#[test]
fn test_output_path_naming() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = output_config(dir.path());
    config.output.prefix = "pre_".into();
    config.output.extension = "png".into();
    let codec = MemoryCodec::new();
    let writer = FrameWriter::new(&config, &codec);

    let path = writer
        .output_path(Path::new("/elsewhere/light_001.fit"), "_x")
        .unwrap();
    assert_eq!(path, dir.path().join("pre_light_001_x.png"));

    config.output.extension = ".tif".into();
    let writer = FrameWriter::new(&config, &codec);
    let path = writer
        .output_path(Path::new("/elsewhere/light_001.fit"), "")
        .unwrap();
    assert_eq!(path, dir.path().join("pre_light_001.tif"));
}

#[test]
fn test_output_path_next_to_source() {
    let config = AlignmentConfig::default();
    let codec = MemoryCodec::new();
    let writer = FrameWriter::new(&config, &codec);
    assert_eq!(
        writer.output_path(Path::new("/nonexistent/raw/m1.fit"), "_ca").unwrap(),
        Path::new("/nonexistent/raw/m1_ca.tif")
    );
    assert_eq!(
        writer.output_path(Path::new("m1.fit"), "_ca").unwrap(),
        Path::new("./m1_ca.tif")
    );
}

#[test]
fn test_existing_output_gets_unique_name() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("m1_ca.tif"), b"x").unwrap();
    fs::write(dir.path().join("m1_ca_1.tif"), b"x").unwrap();

    let config = output_config(dir.path());
    let codec = MemoryCodec::new();
    let writer = FrameWriter::new(&config, &codec);
    assert_eq!(
        writer.output_path(Path::new("m1.fit"), "_ca").unwrap(),
        dir.path().join("m1_ca_2.tif")
    );
}

#[test]
fn test_existing_output_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("m1_ca.tif"), b"x").unwrap();

    let mut config = output_config(dir.path());
    config.output.overwrite = true;
    let codec = MemoryCodec::new();
    let writer = FrameWriter::new(&config, &codec);
    assert_eq!(
        writer.output_path(Path::new("m1.fit"), "_ca").unwrap(),
        dir.path().join("m1_ca.tif")
    );
}

#[test]
fn test_unique_path_without_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack");
    fs::write(&path, b"x").unwrap();
    assert_eq!(unique_path(&path), dir.path().join("stack_1"));
}

#[test]
fn test_metadata_stripped_when_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let config = output_config(dir.path());
    let codec = MemoryCodec::new();
    let job = finished_job(&config, Path::new("/virtual/m1.fit"), None, None);

    let outputs = FrameWriter::new(&config, &codec).save_job(&job).unwrap();
    assert_eq!(outputs.target, dir.path().join("m1_ca.tif"));
    assert!(outputs.drizzle_file.is_none());

    let (_, _, written) = &codec.written()[0];
    assert!(written.keywords.is_empty());
    assert!(written.icc_profile.is_none());
    assert!(written.xml.is_none());
}

#[test]
fn test_provenance_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let config = output_config(dir.path());
    let codec = MemoryCodec::with_capabilities(FormatCapabilities {
        keywords: true,
        icc_profile: true,
        metadata: true,
    });
    let job = finished_job(&config, Path::new("/virtual/m1.fit"), None, None);
    FrameWriter::new(&config, &codec).save_job(&job).unwrap();

    let (_, _, written) = &codec.written()[0];
    assert_eq!(written.keywords[0], Keyword::new("EXPTIME", "120", "seconds"));
    let history: Vec<&str> = written
        .keywords
        .iter()
        .filter(|k| k.name == "HISTORY")
        .map(|k| k.comment.as_str())
        .collect();
    assert_eq!(history, ["CometAlign.X: 3", "CometAlign.Y: -1.5"]);
    assert!(written.keywords.iter().any(|k| k.name == "COMMENT"));
    assert_eq!(written.icc_profile.as_deref(), Some(&[1u8, 2, 3][..]));
}

#[test]
fn test_provenance_with_operand() {
    let mut config = AlignmentConfig::default();
    config.operand = Some(OperandConfig {
        linear_fit: LinearFitConfig {
            reject_high: 0.8,
            ..Default::default()
        },
        ..OperandConfig::new("/data/comet_stack.xisf")
    });
    let codec = MemoryCodec::new();
    let writer = FrameWriter::new(&config, &codec);
    let fit = LinearFit {
        intercept: 0.01,
        slope: 0.9,
        adev: 0.002,
    };
    let history: Vec<String> = writer
        .provenance(&[fit], Delta::new(1.0, 2.0))
        .into_iter()
        .filter(|k| k.name == "HISTORY")
        .map(|k| k.comment)
        .collect();
    assert_eq!(
        history,
        [
            "CometAlign.Subtract: /data/comet_stack.xisf",
            "CometAlign.Mode: true",
            "CometAlign.LinearFit: true",
            "CometAlign.RejectLow: 0",
            "CometAlign.RejectHigh: 0.8",
            "CometAlign.Linear fit functions:",
            "y0 = +0.010000 + 0.900000 * x0",
            "sigma0 = +0.002000",
            "CometAlign.Normalize: true",
            "CometAlign.X: 1",
            "CometAlign.Y: 2",
        ]
    );
}

#[test]
fn test_drizzle_outputs_with_operand() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = output_config(dir.path());
    config.operand = Some(OperandConfig {
        normalize: false,
        linear_fit: LinearFitConfig {
            enabled: false,
            ..Default::default()
        },
        ..OperandConfig::new("/virtual/operand.tif")
    });
    config.drizzle.save_star_aligned = true;
    config.drizzle.save_comet_aligned = true;

    let drizzle_matrix = Homography::translation(0.5, 2.0);
    let drizzle = DrizzleSource {
        path: PathBuf::from("/virtual/raw/m1.fit"),
        matrix: drizzle_matrix,
        data: Some(FrameData {
            path: PathBuf::from("/virtual/raw/m1.fit"),
            buffer: gradient(16, 16),
            metadata: EmbeddedMetadata::default(),
        }),
    };
    let operand = gray_f32(16, 16, |_, _| 0.05);
    let job = finished_job(&config, Path::new("/virtual/reg/m1_r.fit"), Some(operand), Some(drizzle));

    let codec = MemoryCodec::new();
    let outputs = FrameWriter::new(&config, &codec).save_job(&job).unwrap();
    assert_eq!(outputs.target, dir.path().join("m1_r_ca.tif"));
    assert_eq!(outputs.drizzle_source, Some(dir.path().join("m1.tif")));
    assert_eq!(outputs.star_aligned, Some(dir.path().join("m1_sa.tif")));
    assert_eq!(outputs.comet_aligned, Some(dir.path().join("m1_ca.tif")));
    assert_eq!(codec.written().len(), 4);

    // Subtract mode output is star aligned: the matrix is kept as is.
    let drz = outputs.drizzle_file.unwrap();
    assert_eq!(drz, dir.path().join("m1_r_ca.drz"));
    let record = read_drizzle_file(&drz).unwrap();
    assert_eq!(record.source, dir.path().join("m1.tif"));
    assert_eq!(record.target, outputs.target);
    assert_eq!(record.matrix, drizzle_matrix);
}

#[test]
fn test_drizzle_matrix_follows_comet_without_operand() {
    let dir = tempfile::tempdir().unwrap();
    let config = output_config(dir.path());
    let drizzle_matrix = Homography::translation(-1.0, 4.0);
    let drizzle = DrizzleSource {
        path: PathBuf::from("/virtual/raw/m1.fit"),
        matrix: drizzle_matrix,
        data: None,
    };
    let job = finished_job(&config, Path::new("/virtual/reg/m1_r.fit"), None, Some(drizzle));

    let codec = MemoryCodec::new();
    let outputs = FrameWriter::new(&config, &codec).save_job(&job).unwrap();
    assert!(outputs.drizzle_source.is_none());
    let record = read_drizzle_file(&outputs.drizzle_file.unwrap()).unwrap();
    assert_eq!(record.source, Path::new("/virtual/raw/m1.fit"));
    assert_eq!(
        record.matrix,
        drizzle_matrix.compose(&Homography::translation(3.0, -1.5))
    );
    assert_eq!((record.width, record.height), (16, 16));
}
