use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::AlignmentConfig;
use crate::drizzle::read_drizzle_file;
use crate::error::{CometError, Result};
use crate::frame::{Delta, FrameData};
use crate::image::PixelBuffer;
use crate::io::FrameCodec;
use crate::job::{AlignmentJob, DrizzleSource, JobContext};
use crate::progress::{JobMonitor, JobState};

/// Reads target frames, drizzle sources and the operand for one run.
///
/// The first image read fixes the geometry of the run; every later image
/// must match it.
pub struct FrameLoader<'a> {
    config: &'a AlignmentConfig,
    codec: &'a dyn FrameCodec,
    geometry: Option<(usize, usize)>,
}

impl<'a> FrameLoader<'a> {
    pub fn new(config: &'a AlignmentConfig, codec: &'a dyn FrameCodec) -> Self {
        Self {
            config,
            codec,
            geometry: None,
        }
    }

    /// Read the operand image, if one is configured.
    pub fn load_operand(&mut self) -> Result<Option<PixelBuffer>> {
        let Some(operand) = &self.config.operand else {
            return Ok(None);
        };
        let data = self.read_image(&operand.path)?;
        info!(
            path = %operand.path.display(),
            width = data.buffer.width(),
            height = data.buffer.height(),
            format = %data.buffer.sample_format(),
            "loaded operand"
        );
        Ok(Some(data.buffer))
    }

    /// Read target frame `index` and its drizzle data and build its jobs.
    pub fn load_frame(&mut self, index: usize, context: &Arc<JobContext>) -> Result<Vec<AlignmentJob>> {
        let item = &self.config.targets[index];
        let reference = &self.config.targets[self.config.reference];
        let delta = Delta::between(item, reference);

        let monitor = Arc::new(JobMonitor::new());
        monitor.set_state(JobState::Loading);
        monitor.set_status("Loading");

        let target = self.read_image(&item.path)?;

        let drizzle = match &item.drizzle_path {
            Some(drz) => {
                let record = read_drizzle_file(drz)?;
                let data = if context.operand.is_some() {
                    Some(self.read_image(&record.source)?)
                } else {
                    None
                };
                Some(DrizzleSource {
                    path: record.source,
                    matrix: record.matrix,
                    data,
                })
            }
            None => None,
        };

        debug!(frame = index, dx = delta.dx, dy = delta.dy, "frame loaded");
        Ok(vec![AlignmentJob::new(
            index,
            target,
            delta,
            drizzle,
            Arc::clone(context),
            monitor,
        )])
    }

    fn read_image(&mut self, path: &Path) -> Result<FrameData> {
        debug!(path = %path.display(), "reading image");
        let mut images = self.codec.read(path)?;
        if images.is_empty() {
            return Err(CometError::EmptyImage(path.to_path_buf()));
        }
        if images.len() > 1 {
            return Err(CometError::MultipleImages(path.to_path_buf()));
        }
        let image = images.remove(0);

        let (w, h) = image.buffer.geometry();
        match self.geometry {
            Some((width, height)) if (width, height) != (w, h) => {
                return Err(CometError::GeometryMismatch {
                    width,
                    height,
                    actual_width: w,
                    actual_height: h,
                });
            }
            Some(_) => {}
            None => self.geometry = Some((w, h)),
        }

        Ok(FrameData {
            path: path.to_path_buf(),
            buffer: image.buffer,
            metadata: image.metadata,
        })
    }
}
