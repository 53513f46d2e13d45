use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CometError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{}: Empty image file", .0.display())]
    EmptyImage(PathBuf),

    #[error("{}: Multiple image files are not supported", .0.display())]
    MultipleImages(PathBuf),

    #[error("Image geometry {actual_width}x{actual_height} does not match {width}x{height}")]
    GeometryMismatch {
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Degenerate homography: point ({x}, {y}) maps to infinity")]
    DegenerateTransform { x: f64, y: f64 },

    #[error("Singular alignment matrix")]
    SingularMatrix,

    #[error("Insufficient data (channel {channel})")]
    InsufficientData { channel: usize },

    #[error("Invalid linear fit (channel {channel})")]
    InvalidFit { channel: usize },

    #[error("Surface splines are not supported for drizzle data")]
    SplinesUnsupported,

    #[error("The drizzle data has no image alignment data")]
    NoAlignmentData,

    #[error("The drizzle data does not define an alignment matrix")]
    MissingAlignmentMatrix,

    #[error("Drizzle data is missing the {0} definition")]
    MissingDrizzleField(&'static str),

    #[error("Malformed drizzle data: {0}")]
    MalformedDrizzle(String),

    #[error("Source and target paths of a drizzle record must be different: {}", .0.display())]
    SelfReferentialDrizzle(PathBuf),

    #[error("Drizzle data cannot store a path containing braces: {}", .0.display())]
    UnencodableDrizzlePath(PathBuf),

    #[error("Processing was cancelled")]
    Cancelled,

    #[error("Process aborted")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, CometError>;
