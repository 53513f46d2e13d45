use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::image::PixelBuffer;
use crate::io::EmbeddedMetadata;

/// One entry of the target frame list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Measured comet position, pixels.
    pub x: f64,
    pub y: f64,
    /// Observation date as found in the frame header.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub julian_date: Option<f64>,
    /// Companion drizzle metadata file, if the frame is drizzle-registered.
    #[serde(default)]
    pub drizzle_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl FrameDescriptor {
    pub fn new(path: impl Into<PathBuf>, x: f64, y: f64) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            x,
            y,
            date: None,
            julian_date: None,
            drizzle_path: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Comet displacement of a frame relative to the reference frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Delta {
    pub dx: f64,
    pub dy: f64,
}

impl Delta {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    pub fn between(frame: &FrameDescriptor, reference: &FrameDescriptor) -> Self {
        Self {
            dx: frame.x - reference.x,
            dy: frame.y - reference.y,
        }
    }
}

/// A decoded image together with the file it came from.
#[derive(Clone, Debug)]
pub struct FrameData {
    pub path: PathBuf,
    pub buffer: PixelBuffer,
    pub metadata: EmbeddedMetadata,
}
