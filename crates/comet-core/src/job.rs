use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AlignmentConfig;
use crate::error::{CometError, Result};
use crate::frame::{Delta, FrameData};
use crate::homography::Homography;
use crate::image::PixelBuffer;
use crate::linear_fit::{LinearFit, LinearFitEngine};
use crate::progress::{CancelToken, JobMonitor, JobState};
use crate::resample::Resampler;

/// Run-wide, read-only inputs shared by every job.
#[derive(Debug)]
pub struct JobContext {
    pub operand: Option<Arc<PixelBuffer>>,
    pub resampler: Resampler,
    pub subtract_mode: bool,
    pub drizzle_integration: bool,
    pub normalize: bool,
    pub linear_fit: Option<LinearFitEngine>,
    pub save_star_aligned: bool,
    pub save_comet_aligned: bool,
}

impl JobContext {
    pub fn new(config: &AlignmentConfig, operand: Option<Arc<PixelBuffer>>) -> Self {
        let op = config.operand.as_ref();
        Self {
            operand,
            resampler: Resampler::new(config.interpolation),
            subtract_mode: op.is_some_and(|o| o.subtract_mode),
            drizzle_integration: op.is_some_and(|o| o.drizzle_integration),
            normalize: op.is_some_and(|o| o.normalize),
            linear_fit: op
                .filter(|o| o.linear_fit.enabled)
                .map(|o| LinearFitEngine::new(o.linear_fit.reject_low, o.linear_fit.reject_high)),
            save_star_aligned: config.drizzle.save_star_aligned,
            save_comet_aligned: config.drizzle.save_comet_aligned,
        }
    }
}

/// Drizzle registration of a target frame.
#[derive(Debug)]
pub struct DrizzleSource {
    /// Unregistered image the drizzle file points at.
    pub path: PathBuf,
    /// Star alignment matrix from the drizzle file.
    pub matrix: Homography,
    /// The source image itself. Only loaded when an operand is used.
    pub data: Option<FrameData>,
}

/// All work for one target frame.
///
/// [`run`](Self::run) never fails: the outcome is recorded in the job's
/// [`JobMonitor`] and the buffers stay inside the job for the writer.
#[derive(Debug)]
pub struct AlignmentJob {
    index: usize,
    target: FrameData,
    delta: Delta,
    drizzle: Option<DrizzleSource>,
    context: Arc<JobContext>,
    monitor: Arc<JobMonitor>,
    fits: Vec<LinearFit>,
    drizzle_fits: Vec<LinearFit>,
    star_aligned: Option<PixelBuffer>,
    comet_aligned: Option<PixelBuffer>,
    error: Option<String>,
}

impl AlignmentJob {
    pub fn new(
        index: usize,
        target: FrameData,
        delta: Delta,
        drizzle: Option<DrizzleSource>,
        context: Arc<JobContext>,
        monitor: Arc<JobMonitor>,
    ) -> Self {
        Self {
            index,
            target,
            delta,
            drizzle,
            context,
            monitor,
            fits: Vec::new(),
            drizzle_fits: Vec::new(),
            star_aligned: None,
            comet_aligned: None,
            error: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn target(&self) -> &FrameData {
        &self.target
    }

    pub fn target_path(&self) -> &Path {
        &self.target.path
    }

    pub fn delta(&self) -> Delta {
        self.delta
    }

    pub fn drizzle(&self) -> Option<&DrizzleSource> {
        self.drizzle.as_ref()
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    pub fn monitor(&self) -> &Arc<JobMonitor> {
        &self.monitor
    }

    pub fn state(&self) -> JobState {
        self.monitor.state()
    }

    /// Fit functions of the operand against the target.
    pub fn fits(&self) -> &[LinearFit] {
        &self.fits
    }

    /// Fit functions of the operand against the drizzle source.
    pub fn drizzle_fits(&self) -> &[LinearFit] {
        &self.drizzle_fits
    }

    pub fn star_aligned(&self) -> Option<&PixelBuffer> {
        self.star_aligned.as_ref()
    }

    pub fn comet_aligned(&self) -> Option<&PixelBuffer> {
        self.comet_aligned.as_ref()
    }

    /// Failure message of a [`JobState::Failed`] job.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Comet motion matrix of this frame.
    pub fn motion(&self) -> Homography {
        Homography::from_delta(self.delta)
    }

    /// Process the frame. Errors are recorded, never returned.
    pub fn run(&mut self, cancel: &CancelToken) {
        match self.execute(cancel) {
            Ok(()) => {
                self.monitor.set_status("Done");
                self.monitor.set_state(JobState::Finished);
                debug!(frame = self.index, "job finished");
            }
            Err(CometError::Cancelled | CometError::Aborted) => {
                self.monitor.set_status("Aborted");
                self.monitor.set_state(JobState::Aborted);
                debug!(frame = self.index, "job aborted");
            }
            Err(e) => {
                warn!(frame = self.index, path = %self.target.path.display(), error = %e, "job failed");
                self.monitor.set_status(format!("Error: {e}"));
                self.error = Some(e.to_string());
                self.monitor.set_state(JobState::Failed);
            }
        }
    }

    fn execute(&mut self, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        self.monitor.set_state(JobState::Transforming);

        let ctx = Arc::clone(&self.context);
        let motion = self.motion();
        let correction = Homography::drizzle_correction();

        let Some(operand) = ctx.operand.as_deref() else {
            self.monitor.set_status("Align Target");
            ctx.resampler
                .warp(&mut self.target.buffer, &motion, cancel, &self.monitor)?;
            return Ok(());
        };

        let mut op = operand.clone();
        if ctx.subtract_mode {
            self.monitor.set_status("Align Operand");
            let mut m = motion;
            if ctx.drizzle_integration {
                m = m * correction;
            }
            ctx.resampler
                .warp(&mut op, &m.inverse()?, cancel, &self.monitor)?;
            self.fits = self.prepare_operand(&mut op, &self.target.buffer)?;
            self.target.buffer.subtract(&op)?;
        } else {
            if ctx.drizzle_integration {
                self.monitor.set_status("Align DI->SI");
                ctx.resampler
                    .warp(&mut op, &correction.inverse()?, cancel, &self.monitor)?;
            }
            self.fits = self.prepare_operand(&mut op, &self.target.buffer)?;
            self.target.buffer.subtract(&op)?;
            self.monitor.set_status("Align Target");
            ctx.resampler
                .warp(&mut self.target.buffer, &motion, cancel, &self.monitor)?;
        }
        self.target.buffer.truncate();
        drop(op);

        cancel.check()?;
        if self.drizzle.as_ref().is_some_and(|d| d.data.is_some()) {
            self.monitor.set_state(JobState::DrizzleReconstructing);
            self.reconstruct_drizzle(operand, motion, cancel)?;
        }
        Ok(())
    }

    /// Rebuild the unregistered drizzle source with the operand removed.
    fn reconstruct_drizzle(
        &mut self,
        operand: &PixelBuffer,
        motion: Homography,
        cancel: &CancelToken,
    ) -> Result<()> {
        let ctx = Arc::clone(&self.context);
        let Some(drizzle) = self.drizzle.as_mut() else {
            return Ok(());
        };
        let Some(source) = drizzle.data.as_mut() else {
            return Ok(());
        };

        let mut m = drizzle.matrix;
        if ctx.subtract_mode {
            m = m * motion;
        }
        if ctx.drizzle_integration {
            m = m * Homography::drizzle_correction();
        }

        let mut op = operand.clone();
        self.monitor.set_status("Align Operand");
        ctx.resampler
            .warp(&mut op, &m.inverse()?, cancel, &self.monitor)?;
        cancel.check()?;

        let fits = prepare_operand(&ctx, &self.monitor, &mut op, &source.buffer)?;
        cancel.check()?;
        source.buffer.subtract(&op)?;
        source.buffer.truncate();
        drop(op);

        if ctx.save_star_aligned {
            cancel.check()?;
            self.monitor.set_status("Align PureStar");
            let mut sa = source.buffer.clone();
            ctx.resampler
                .warp(&mut sa, &drizzle.matrix, cancel, &self.monitor)?;
            self.star_aligned = Some(sa);
        }
        if ctx.save_comet_aligned {
            cancel.check()?;
            self.monitor.set_status("Align PureComet");
            let mut ca = source.buffer.clone();
            ctx.resampler.warp(
                &mut ca,
                &(drizzle.matrix * motion),
                cancel,
                &self.monitor,
            )?;
            self.comet_aligned = Some(ca);
        }

        self.drizzle_fits = fits;
        info!(frame = self.index, source = %drizzle.path.display(), "drizzle source reconstructed");
        Ok(())
    }

    fn prepare_operand(
        &self,
        operand: &mut PixelBuffer,
        reference: &PixelBuffer,
    ) -> Result<Vec<LinearFit>> {
        prepare_operand(&self.context, &self.monitor, operand, reference)
    }
}

/// Optional linear fit of `operand` onto `reference`, then optional median
/// normalization.
fn prepare_operand(
    ctx: &JobContext,
    monitor: &JobMonitor,
    operand: &mut PixelBuffer,
    reference: &PixelBuffer,
) -> Result<Vec<LinearFit>> {
    let mut fits = Vec::new();
    if let Some(engine) = &ctx.linear_fit {
        monitor.set_status("LFit calc");
        fits = engine.fit(operand, reference)?;
        monitor.set_status("LFit Apply");
        engine.apply(operand, &fits);
    }
    if ctx.normalize {
        monitor.set_status("Normalization");
        operand.subtract_median();
    }
    Ok(fits)
}
