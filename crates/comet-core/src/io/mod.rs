pub mod codec;

use std::path::Path;

use crate::error::Result;
use crate::image::PixelBuffer;

pub use codec::ImageCodec;

/// Pixel density recorded in the source file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    pub horizontal: f64,
    pub vertical: f64,
    pub metric: bool,
}

/// A FITS-style header record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyword {
    pub name: String,
    pub value: String,
    pub comment: String,
}

impl Keyword {
    pub fn new(name: impl Into<String>, value: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            comment: comment.into(),
        }
    }

    pub fn history(text: impl Into<String>) -> Self {
        Self::new("HISTORY", "", text)
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new("COMMENT", "", text)
    }
}

/// Everything besides pixels that a frame carries from input to output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmbeddedMetadata {
    pub resolution: Option<Resolution>,
    pub keywords: Vec<Keyword>,
    pub icc_profile: Option<Vec<u8>>,
    pub xml: Option<Vec<u8>>,
}

/// One image read from a file.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub buffer: PixelBuffer,
    pub metadata: EmbeddedMetadata,
}

/// Which kinds of embedded data an output format can hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormatCapabilities {
    pub keywords: bool,
    pub icc_profile: bool,
    pub metadata: bool,
}

/// Image file reader/writer used for targets, operand and outputs.
pub trait FrameCodec: Send + Sync {
    /// Decode every image stored in `path`.
    fn read(&self, path: &Path) -> Result<Vec<DecodedImage>>;

    /// What the format selected by `extension` (with or without the dot)
    /// can store besides pixels.
    fn capabilities(&self, extension: &str) -> FormatCapabilities;

    /// Encode `buffer` to `path`. The caller has already removed metadata
    /// the format cannot store.
    fn write(&self, path: &Path, buffer: &PixelBuffer, metadata: &EmbeddedMetadata) -> Result<()>;
}
