use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::AlignmentConfig;
use crate::consts::{COMET_ALIGNED_POSTFIX, STAR_ALIGNED_POSTFIX};
use crate::drizzle::{write_drizzle_file, DrizzleRecord};
use crate::error::{CometError, Result};
use crate::frame::Delta;
use crate::image::PixelBuffer;
use crate::io::{EmbeddedMetadata, FrameCodec, Keyword};
use crate::job::AlignmentJob;
use crate::linear_fit::LinearFit;

/// Files written for one finished job.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SavedOutputs {
    pub target: PathBuf,
    pub drizzle_source: Option<PathBuf>,
    pub drizzle_file: Option<PathBuf>,
    pub star_aligned: Option<PathBuf>,
    pub comet_aligned: Option<PathBuf>,
}

/// Writes job results. Only ever used from the coordinating thread.
pub struct FrameWriter<'a> {
    config: &'a AlignmentConfig,
    codec: &'a dyn FrameCodec,
}

impl<'a> FrameWriter<'a> {
    pub fn new(config: &'a AlignmentConfig, codec: &'a dyn FrameCodec) -> Self {
        Self { config, codec }
    }

    /// Where the output for `source` goes, after applying the directory,
    /// prefix, `postfix` and extension settings and the overwrite policy.
    pub fn output_path(&self, source: &Path, postfix: &str) -> Result<PathBuf> {
        let out = &self.config.output;
        let dir = if out.directory.as_os_str().is_empty() {
            match source.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            }
        } else {
            out.directory.clone()
        };

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().trim().to_string())
            .unwrap_or_default();
        if stem.is_empty() {
            return Err(CometError::Config(format!(
                "{}: Unable to determine an output file name",
                source.display()
            )));
        }
        let extension = out.extension.trim_start_matches('.');
        let mut file_name = format!("{}{stem}{postfix}", out.prefix);
        if !extension.is_empty() {
            file_name.push('.');
            file_name.push_str(extension);
        }

        let path = dir.join(file_name);
        if !path.exists() {
            return Ok(path);
        }
        if out.overwrite {
            warn!(path = %path.display(), "overwriting already existing file");
            Ok(path)
        } else {
            let unique = unique_path(&path);
            info!(path = %unique.display(), "file already exists, writing to a new name");
            Ok(unique)
        }
    }

    /// Save everything a finished job produced.
    ///
    /// The target goes out under the configured postfix. A reconstructed
    /// drizzle source is saved without postfix and its `.drz` file is
    /// rewritten to point at the new files.
    pub fn save_job(&self, job: &AlignmentJob) -> Result<SavedOutputs> {
        let ctx = job.context();
        let delta = job.delta();
        let target = job.target();

        let target_path = self.save_image(
            &target.path,
            &self.config.output.postfix,
            &target.buffer,
            &target.metadata,
            job.fits(),
            delta,
        )?;
        let mut outputs = SavedOutputs {
            target: target_path.clone(),
            ..Default::default()
        };

        let Some(drizzle) = job.drizzle() else {
            return Ok(outputs);
        };

        let mut source_path = drizzle.path.clone();
        if let Some(data) = &drizzle.data {
            let saved = self.save_image(
                &data.path,
                "",
                &data.buffer,
                &data.metadata,
                job.drizzle_fits(),
                delta,
            )?;
            source_path = saved.clone();
            outputs.drizzle_source = Some(saved);

            if let Some(sa) = job.star_aligned() {
                outputs.star_aligned = Some(self.save_image(
                    &data.path,
                    STAR_ALIGNED_POSTFIX,
                    sa,
                    &data.metadata,
                    job.drizzle_fits(),
                    delta,
                )?);
            }
            if let Some(ca) = job.comet_aligned() {
                outputs.comet_aligned = Some(self.save_image(
                    &data.path,
                    COMET_ALIGNED_POSTFIX,
                    ca,
                    &data.metadata,
                    job.drizzle_fits(),
                    delta,
                )?);
            }
        }

        let mut matrix = drizzle.matrix;
        if ctx.operand.is_none() || !ctx.subtract_mode {
            matrix = matrix.compose(&job.motion());
        }
        let (width, height) = target.buffer.geometry();
        let record = DrizzleRecord {
            source: source_path,
            target: target_path,
            width,
            height,
            matrix,
        };
        outputs.drizzle_file = Some(write_drizzle_file(&record)?);
        Ok(outputs)
    }

    fn save_image(
        &self,
        source: &Path,
        postfix: &str,
        buffer: &PixelBuffer,
        metadata: &EmbeddedMetadata,
        fits: &[LinearFit],
        delta: Delta,
    ) -> Result<PathBuf> {
        let path = self.output_path(source, postfix)?;
        info!(path = %path.display(), "writing image");

        if self.config.operand.as_ref().is_some_and(|o| o.linear_fit.enabled) {
            for (c, fit) in fits.iter().enumerate() {
                let [function, sigma] = fit.describe(c);
                info!("{function}, {sigma}");
            }
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let caps = self.codec.capabilities(&extension);

        let mut metadata = metadata.clone();
        if caps.keywords {
            metadata.keywords.extend(self.provenance(fits, delta));
        } else if !metadata.keywords.is_empty() {
            warn!("output format cannot store FITS keywords - original keywords not embedded");
            metadata.keywords.clear();
        }
        if !caps.icc_profile && metadata.icc_profile.take().is_some() {
            warn!("output format cannot store ICC profiles - original profile not embedded");
        }
        if !caps.metadata && metadata.xml.take().is_some() {
            warn!("output format cannot store metadata - original metadata not embedded");
        }

        self.codec.write(&path, buffer, &metadata)?;
        Ok(path)
    }

    /// History keywords describing how the image was produced.
    pub fn provenance(&self, fits: &[LinearFit], delta: Delta) -> Vec<Keyword> {
        let mut keywords = vec![Keyword::comment(format!(
            "Comet alignment with comet-align {}",
            env!("CARGO_PKG_VERSION")
        ))];
        if let Some(op) = &self.config.operand {
            let fit = &op.linear_fit;
            keywords.push(Keyword::history(format!(
                "CometAlign.Subtract: {}",
                op.path.display()
            )));
            keywords.push(Keyword::history(format!("CometAlign.Mode: {}", op.subtract_mode)));
            keywords.push(Keyword::history(format!("CometAlign.LinearFit: {}", fit.enabled)));
            keywords.push(Keyword::history(format!("CometAlign.RejectLow: {}", fit.reject_low)));
            keywords.push(Keyword::history(format!(
                "CometAlign.RejectHigh: {}",
                fit.reject_high
            )));
            if fit.enabled {
                keywords.push(Keyword::history("CometAlign.Linear fit functions:"));
                for (c, f) in fits.iter().enumerate() {
                    let [function, sigma] = f.describe(c);
                    keywords.push(Keyword::history(function));
                    keywords.push(Keyword::history(sigma));
                }
            }
            keywords.push(Keyword::history(format!("CometAlign.Normalize: {}", op.normalize)));
        }
        keywords.push(Keyword::history(format!("CometAlign.X: {}", delta.dx)));
        keywords.push(Keyword::history(format!("CometAlign.Y: {}", delta.dy)));
        keywords
    }
}

/// First `name_N.ext` next to `path` that does not exist yet.
pub fn unique_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1u32..)
        .map(|u| {
            let name = match &extension {
                Some(ext) => format!("{stem}_{u}.{ext}"),
                None => format!("{stem}_{u}"),
            };
            path.with_file_name(name)
        })
        .find(|p| !p.exists())
        .unwrap_or_else(|| path.to_path_buf())
}
