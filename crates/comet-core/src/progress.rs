use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{CometError, Result};

/// Cooperative cancellation flag shared by the coordinator and all workers.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the token has been triggered.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CometError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Lifecycle of one alignment job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Pending = 0,
    Loading = 1,
    Transforming = 2,
    DrizzleReconstructing = 3,
    Finished = 4,
    Failed = 5,
    Aborted = 6,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Loading,
            2 => Self::Transforming,
            3 => Self::DrizzleReconstructing,
            4 => Self::Finished,
            5 => Self::Failed,
            _ => Self::Aborted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Loading => write!(f, "Loading"),
            Self::Transforming => write!(f, "Transforming"),
            Self::DrizzleReconstructing => write!(f, "Drizzle Reconstructing"),
            Self::Finished => write!(f, "Finished"),
            Self::Failed => write!(f, "Failed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Live status of a running job. Written by the worker, polled by the
/// coordinator.
#[derive(Debug)]
pub struct JobMonitor {
    status: Mutex<String>,
    row: AtomicUsize,
    state: AtomicU8,
}

impl Default for JobMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a [`JobMonitor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub state: JobState,
    pub status: String,
    pub row: usize,
}

impl JobMonitor {
    pub fn new() -> Self {
        Self {
            status: Mutex::new("Prepare".to_string()),
            row: AtomicUsize::new(0),
            state: AtomicU8::new(JobState::Pending as u8),
        }
    }

    /// Replace the status text and reset the row counter.
    pub fn set_status(&self, status: impl Into<String>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status.into();
        self.row.store(0, Ordering::Relaxed);
    }

    pub fn status(&self) -> String {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_row(&self, row: usize) {
        self.row.store(row, Ordering::Relaxed);
    }

    pub fn row(&self) -> usize {
        self.row.load(Ordering::Relaxed)
    }

    pub fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            state: self.state(),
            status: self.status(),
            row: self.row(),
        }
    }
}

/// Consumer of scheduler progress, e.g. a terminal display.
///
/// Slot status is pushed from the coordinator after polling each slot's
/// [`JobMonitor`]; implementations never touch worker state directly.
pub trait ProgressSink: Send + Sync {
    /// A run is about to start with `slots` worker slots.
    fn run_started(&self, _total_frames: usize, _slots: usize) {}

    /// A job for `file` was dispatched to `slot`.
    fn slot_started(&self, _slot: usize, _file: &str) {}

    /// Latest status text and row of the job in `slot`.
    fn slot_status(&self, _slot: usize, _status: &str, _row: usize) {}

    /// The job in `slot` finished and its output is being written.
    fn slot_saving(&self, _slot: usize) {}

    /// `slot` is free again.
    fn slot_cleared(&self, _slot: usize) {}

    /// One more frame left the pipeline (saved, skipped or failed).
    fn frame_done(&self, _frames_done: usize, _total_frames: usize) {}

    /// Polled once per scheduler iteration; returning `true` aborts the run.
    fn abort_requested(&self) -> bool {
        false
    }
}

/// Sink that ignores every event.
pub struct NoOpSink;
impl ProgressSink for NoOpSink {}
