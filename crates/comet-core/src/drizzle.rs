//! Drizzle companion files (`.drz`).
//!
//! The format is a sequence of `id{content}` blocks. Only four are used
//! here:
//!
//! ```text
//! P{/data/raw/frame_001.fit}      drizzle source image
//! T{/data/ca/frame_001_ca.tif}    registration target image
//! D{4096,2732}                    reference width, height
//! H{1,0,12.5,0,1,-3.25,0,0,1}     alignment matrix, row major
//! ```
//!
//! Surface spline blocks (`Sx`, `Sy`) make a file unusable. Every other
//! block is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::consts::DRIZZLE_EXTENSION;
use crate::error::{CometError, Result};
use crate::homography::Homography;

/// Decoded contents of a drizzle file.
#[derive(Clone, Debug, PartialEq)]
pub struct DrizzleRecord {
    pub source: PathBuf,
    pub target: PathBuf,
    pub width: usize,
    pub height: usize,
    pub matrix: Homography,
}

struct Block<'a> {
    id: &'a str,
    content: &'a str,
}

fn parse_blocks(text: &str) -> Result<Vec<Block<'_>>> {
    let mut blocks = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        let open = rest
            .find('{')
            .ok_or_else(|| CometError::MalformedDrizzle(format!("expected '{{' after {rest:?}")))?;
        let id = rest[..open].trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CometError::MalformedDrizzle(format!(
                "invalid block identifier {id:?}"
            )));
        }
        let body = &rest[open + 1..];
        let close = body.find('}').ok_or_else(|| {
            CometError::MalformedDrizzle(format!("unterminated {id} block"))
        })?;
        blocks.push(Block {
            id,
            content: &body[..close],
        });
        rest = body[close + 1..].trim_start();
    }
    Ok(blocks)
}

fn parse_number<T: std::str::FromStr>(id: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        CometError::MalformedDrizzle(format!("invalid number {value:?} in {id} block"))
    })
}

/// Decode drizzle file text.
pub fn decode(text: &str) -> Result<DrizzleRecord> {
    let blocks = parse_blocks(text)?;

    if blocks.iter().any(|b| b.id == "Sx" || b.id == "Sy") {
        return Err(CometError::SplinesUnsupported);
    }
    let blocks: Vec<_> = blocks
        .into_iter()
        .filter(|b| matches!(b.id, "P" | "T" | "D" | "H"))
        .collect();
    if blocks.is_empty() {
        return Err(CometError::NoAlignmentData);
    }

    let mut source = None;
    let mut target = None;
    let mut dimensions = None;
    let mut matrix = None;
    for block in &blocks {
        match block.id {
            "P" => source = Some(PathBuf::from(block.content)),
            "T" => target = Some(PathBuf::from(block.content)),
            "D" => {
                let parts: Vec<&str> = block.content.split(',').collect();
                let [w, h] = parts.as_slice() else {
                    return Err(CometError::MalformedDrizzle(format!(
                        "D block needs 2 values, found {}",
                        parts.len()
                    )));
                };
                dimensions = Some((parse_number::<i64>("D", w)?, parse_number::<i64>("D", h)?));
            }
            "H" => {
                let values = block
                    .content
                    .split(',')
                    .map(|v| parse_number::<f64>("H", v))
                    .collect::<Result<Vec<_>>>()?;
                let values: [f64; 9] = values.as_slice().try_into().map_err(|_| {
                    CometError::MalformedDrizzle(format!(
                        "H block needs 9 values, found {}",
                        values.len()
                    ))
                })?;
                matrix = Some(Homography::from_row_major(values));
            }
            _ => {}
        }
    }

    let matrix = matrix.ok_or(CometError::MissingAlignmentMatrix)?;
    let source = source
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(CometError::MissingDrizzleField("file path"))?;
    let target = target
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(CometError::MissingDrizzleField("target path"))?;
    let (width, height) = dimensions.unwrap_or((0, 0));
    if width < 1 {
        return Err(CometError::MissingDrizzleField("reference width"));
    }
    if height < 1 {
        return Err(CometError::MissingDrizzleField("reference height"));
    }

    Ok(DrizzleRecord {
        source,
        target,
        width: width as usize,
        height: height as usize,
        matrix,
    })
}

/// Encode a drizzle record as `P{..}T{..}D{w,h}H{..}`.
///
/// Matrix elements use the shortest representation that parses back to the
/// same `f64`. Paths are written verbatim, so they must not contain braces.
pub fn encode(
    source: &Path,
    target: &Path,
    matrix: &Homography,
    width: usize,
    height: usize,
) -> Result<String> {
    if source == target {
        return Err(CometError::SelfReferentialDrizzle(source.to_path_buf()));
    }
    for path in [source, target] {
        if path.to_string_lossy().contains(|c: char| c == '{' || c == '}') {
            return Err(CometError::UnencodableDrizzlePath(path.to_path_buf()));
        }
    }
    let h = matrix
        .to_row_major()
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    Ok(format!(
        "P{{{}}}T{{{}}}D{{{width},{height}}}H{{{h}}}",
        source.display(),
        target.display()
    ))
}

impl DrizzleRecord {
    pub fn encode(&self) -> Result<String> {
        encode(
            &self.source,
            &self.target,
            &self.matrix,
            self.width,
            self.height,
        )
    }

    /// Location of the drizzle file that belongs to `image`.
    pub fn companion_path(image: &Path) -> PathBuf {
        image.with_extension(DRIZZLE_EXTENSION)
    }
}

pub fn read_drizzle_file(path: &Path) -> Result<DrizzleRecord> {
    let text = fs::read_to_string(path)?;
    let record = decode(&text)?;
    debug!(
        path = %path.display(),
        source = %record.source.display(),
        matrix = %record.matrix,
        "read drizzle data"
    );
    Ok(record)
}

/// Write `record` next to its target image and return the file written.
pub fn write_drizzle_file(record: &DrizzleRecord) -> Result<PathBuf> {
    let text = record.encode()?;
    let path = DrizzleRecord::companion_path(&record.target);
    fs::write(&path, text)?;
    info!(path = %path.display(), "wrote drizzle file");
    Ok(path)
}
