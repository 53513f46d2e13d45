//! Worker pool driving one alignment job per target frame.
//!
//! The coordinating thread owns loading and saving. Each job runs on its own
//! worker thread in one of a fixed number of slots and reports back over a
//! channel when done; live status is read from the job's [`JobMonitor`].

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::config::AlignmentConfig;
use crate::consts::SCHEDULER_POLL_INTERVAL;
use crate::error::{CometError, Result};
use crate::io::FrameCodec;
use crate::job::{AlignmentJob, JobContext};
use crate::loader::FrameLoader;
use crate::output::FrameWriter;
use crate::progress::{CancelToken, JobMonitor, JobState, ProgressSink};

/// Global state of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Initializing,
    Running,
    /// Every frame has been dispatched; waiting for running jobs.
    Draining,
    Completed,
    Aborted,
}

/// Final tally of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Frames that did not produce output, skipped and failed included.
    pub fn canceled(&self) -> usize {
        self.total - self.succeeded
    }
}

struct Completion {
    slot: usize,
    job: Option<AlignmentJob>,
}

/// Sends the job back to the coordinator when the worker ends, including
/// by panic.
struct CompletionGuard {
    slot: usize,
    job: Option<AlignmentJob>,
    tx: Sender<Completion>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(job) = &self.job {
            if !job.state().is_terminal() {
                job.monitor().set_status("Error: worker panicked");
                job.monitor().set_state(JobState::Failed);
            }
        }
        let _ = self.tx.send(Completion {
            slot: self.slot,
            job: self.job.take(),
        });
    }
}

enum Slot {
    Empty,
    Running {
        monitor: Arc<JobMonitor>,
        handle: JoinHandle<()>,
    },
    Finished {
        job: Option<AlignmentJob>,
        handle: JoinHandle<()>,
    },
}

struct RunState {
    slots: Vec<Slot>,
    pending: VecDeque<usize>,
    holding: VecDeque<AlignmentJob>,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    summary: RunSummary,
    frames_done: usize,
}

impl RunState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty()
            && self.holding.is_empty()
            && self.slots.iter().all(|s| matches!(s, Slot::Empty))
    }

    fn complete(&mut self, completion: Completion) {
        let slot = &mut self.slots[completion.slot];
        if let Slot::Running { handle, .. } = std::mem::replace(slot, Slot::Empty) {
            *slot = Slot::Finished {
                job: completion.job,
                handle,
            };
        }
    }

    fn running(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Running { .. }))
            .count()
    }
}

/// Runs every frame of an [`AlignmentConfig`].
pub struct Scheduler<'a> {
    config: &'a AlignmentConfig,
    codec: &'a dyn FrameCodec,
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
    state: SchedulerState,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        config: &'a AlignmentConfig,
        codec: &'a dyn FrameCodec,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            config,
            codec,
            sink,
            cancel: CancelToken::new(),
            state: SchedulerState::Initializing,
        }
    }

    /// Token that aborts the run when cancelled from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of worker slots: the thread limit capped by the frame count.
    pub fn slot_count(&self) -> usize {
        self.config
            .threads
            .unwrap_or_else(rayon::current_num_threads)
            .min(self.config.targets.len())
            .max(1)
    }

    /// Process every target frame.
    ///
    /// Per-frame failures are counted and the run goes on. An abort or a
    /// failed save stops all workers and is returned as the error.
    ///
    /// Input files are only checked as they are read; call
    /// [`AlignmentConfig::validate`] first to reject missing files up front.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.state = SchedulerState::Initializing;
        self.config.validate_settings()?;

        let mut loader = FrameLoader::new(self.config, self.codec);
        let operand = loader.load_operand()?.map(Arc::new);
        match &self.config.operand {
            Some(op) if op.subtract_mode => {
                info!("Mode: align operand image and subtract from targets")
            }
            Some(_) => info!("Mode: subtract operand from targets and align"),
            None => info!("Mode: only align target images"),
        }
        if let Some(op) = &self.config.operand {
            info!(
                linear_fit = op.linear_fit.enabled,
                reject_low = op.linear_fit.reject_low,
                reject_high = op.linear_fit.reject_high,
                normalize = op.normalize,
                "operand settings"
            );
        }
        let context = Arc::new(JobContext::new(self.config, operand));
        let writer = FrameWriter::new(self.config, self.codec);

        let total = self.config.targets.len();
        let slots = self.slot_count();
        info!(total_frames = total, workers = slots, "processing target frames");

        let (tx, rx) = mpsc::channel();
        let mut run = RunState {
            slots: (0..slots).map(|_| Slot::Empty).collect(),
            pending: (0..total).collect(),
            holding: VecDeque::new(),
            tx,
            rx,
            summary: RunSummary {
                total,
                ..Default::default()
            },
            frames_done: 0,
        };

        self.sink.run_started(total, slots);
        self.state = SchedulerState::Running;

        match self.drive(&mut run, &mut loader, &writer, &context) {
            Ok(()) => {
                self.state = SchedulerState::Completed;
                let s = run.summary;
                info!(
                    succeeded = s.succeeded,
                    skipped = s.skipped,
                    failed = s.failed,
                    canceled = s.canceled(),
                    "comet alignment finished"
                );
                Ok(s)
            }
            Err(e) => {
                warn!(error = %e, "waiting for running tasks to terminate");
                self.shutdown(&mut run);
                self.state = SchedulerState::Aborted;
                Err(e)
            }
        }
    }

    fn drive(
        &mut self,
        run: &mut RunState,
        loader: &mut FrameLoader<'_>,
        writer: &FrameWriter<'_>,
        context: &Arc<JobContext>,
    ) -> Result<()> {
        let total = run.summary.total;
        loop {
            self.check_abort()?;
            while let Ok(completion) = run.rx.try_recv() {
                run.complete(completion);
            }

            if run.holding.is_empty() {
                if let Some(index) = run.pending.pop_front() {
                    info!("File {} of {}", total - run.pending.len(), total);
                    self.load(run, loader, context, index);
                }
            }
            if run.pending.is_empty() && self.state == SchedulerState::Running {
                self.state = SchedulerState::Draining;
            }

            let mut chosen = None;
            for (i, slot) in run.slots.iter().enumerate() {
                match slot {
                    Slot::Empty if !run.holding.is_empty() => {
                        chosen = Some(i);
                        break;
                    }
                    Slot::Finished { .. } => {
                        chosen = Some(i);
                        break;
                    }
                    Slot::Running { monitor, .. } => {
                        let snapshot = monitor.snapshot();
                        self.sink.slot_status(i, &snapshot.status, snapshot.row);
                    }
                    Slot::Empty => {}
                }
            }

            let Some(slot) = chosen else {
                if run.is_idle() {
                    return Ok(());
                }
                let can_load = run.holding.is_empty() && !run.pending.is_empty();
                if !can_load {
                    match run.rx.recv_timeout(SCHEDULER_POLL_INTERVAL) {
                        Ok(completion) => run.complete(completion),
                        Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {}
                    }
                }
                continue;
            };

            if matches!(run.slots[slot], Slot::Finished { .. }) {
                self.finish(run, writer, slot)?;
                self.check_abort()?;
            }

            if let Some(job) = run.holding.pop_front() {
                let file = job
                    .target_path()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                info!(slot, file = %job.target_path().display(), "dispatching frame");
                let monitor = Arc::clone(job.monitor());
                let handle = self.spawn_worker(slot, job, run.tx.clone())?;
                run.slots[slot] = Slot::Running { monitor, handle };
                self.sink.slot_started(slot, &file);
            }
        }
    }

    fn check_abort(&self) -> Result<()> {
        if self.sink.abort_requested() || self.cancel.is_cancelled() {
            return Err(CometError::Aborted);
        }
        Ok(())
    }

    /// Load pending frame `index` into the holding buffer.
    fn load(
        &self,
        run: &mut RunState,
        loader: &mut FrameLoader<'_>,
        context: &Arc<JobContext>,
        index: usize,
    ) {
        let frame = &self.config.targets[index];
        if !frame.enabled {
            info!(path = %frame.path.display(), "skipping disabled target");
            run.summary.skipped += 1;
            self.frame_done(run);
            return;
        }
        match loader.load_frame(index, context) {
            Ok(jobs) => run.holding.extend(jobs),
            Err(e) => {
                warn!(path = %frame.path.display(), error = %e, "failed to load target frame");
                run.summary.failed += 1;
                self.frame_done(run);
            }
        }
    }

    /// Save the finished job in `slot` and free the slot.
    fn finish(&self, run: &mut RunState, writer: &FrameWriter<'_>, slot: usize) -> Result<()> {
        let Slot::Finished { job, handle } = std::mem::replace(&mut run.slots[slot], Slot::Empty)
        else {
            return Ok(());
        };
        if handle.join().is_err() {
            warn!(slot, "worker thread panicked");
        }

        match job {
            Some(job) if job.state() == JobState::Finished => {
                debug!(slot, frame = job.index(), "worker has finished processing");
                self.sink.slot_saving(slot);
                match writer.save_job(&job) {
                    Ok(outputs) => {
                        debug!(target = %outputs.target.display(), "saved");
                        run.summary.succeeded += 1;
                    }
                    Err(
                        e @ (CometError::SelfReferentialDrizzle(_)
                        | CometError::UnencodableDrizzlePath(_)),
                    ) => {
                        warn!(frame = job.index(), error = %e, "frame failed");
                        run.summary.failed += 1;
                    }
                    Err(e) => {
                        self.sink.slot_cleared(slot);
                        return Err(e);
                    }
                }
            }
            Some(job) if job.state() == JobState::Aborted => {
                debug!(frame = job.index(), "frame aborted");
            }
            Some(job) => {
                warn!(
                    frame = job.index(),
                    error = job.error().unwrap_or("unknown"),
                    "frame failed"
                );
                run.summary.failed += 1;
            }
            None => run.summary.failed += 1,
        }

        self.sink.slot_cleared(slot);
        self.frame_done(run);
        Ok(())
    }

    fn frame_done(&self, run: &mut RunState) {
        run.frames_done += 1;
        self.sink.frame_done(run.frames_done, run.summary.total);
    }

    fn spawn_worker(
        &self,
        slot: usize,
        job: AlignmentJob,
        tx: Sender<Completion>,
    ) -> Result<JoinHandle<()>> {
        let cancel = self.cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("comet-worker-{slot}"))
            .spawn(move || {
                let mut guard = CompletionGuard {
                    slot,
                    job: Some(job),
                    tx,
                };
                if let Some(job) = guard.job.as_mut() {
                    job.run(&cancel);
                }
            })?;
        Ok(handle)
    }

    /// Cancel running jobs, wait for them and drop everything queued.
    fn shutdown(&mut self, run: &mut RunState) {
        self.cancel.cancel();
        while run.running() > 0 {
            match run.rx.recv() {
                Ok(completion) => run.complete(completion),
                Err(_) => break,
            }
        }
        for (i, slot) in run.slots.iter_mut().enumerate() {
            match std::mem::replace(slot, Slot::Empty) {
                Slot::Running { handle, .. } | Slot::Finished { handle, .. } => {
                    let _ = handle.join();
                }
                Slot::Empty => {}
            }
            self.sink.slot_cleared(i);
        }
        run.holding.clear();
        run.pending.clear();
    }
}
