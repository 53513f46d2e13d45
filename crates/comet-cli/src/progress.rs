use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use comet_core::progress::ProgressSink;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const IDLE: &str = "idle";

struct SlotBar {
    bar: ProgressBar,
    file: String,
}

#[derive(Default)]
struct Bars {
    overall: Option<ProgressBar>,
    slots: Vec<SlotBar>,
}

/// One spinner line per worker slot plus an overall frame counter.
pub struct TerminalProgress {
    multi: MultiProgress,
    overall_style: ProgressStyle,
    slot_style: ProgressStyle,
    bars: Mutex<Bars>,
}

impl TerminalProgress {
    pub fn new() -> Result<Self> {
        Ok(Self {
            multi: MultiProgress::new(),
            overall_style: ProgressStyle::default_bar()
                .template("{msg:12} [{bar:40}] {pos}/{len} frames")?
                .progress_chars("=> "),
            slot_style: ProgressStyle::default_spinner().template("  {prefix:8} {spinner} {wide_msg}")?,
            bars: Mutex::new(Bars::default()),
        })
    }

    fn with_slot(&self, slot: usize, f: impl FnOnce(&mut SlotBar)) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(s) = bars.slots.get_mut(slot) {
            f(s);
        }
    }

    /// Remove the slot lines and close the overall bar.
    pub fn finish(&self) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in bars.slots.drain(..) {
            slot.bar.finish_and_clear();
        }
        if let Some(overall) = bars.overall.take() {
            overall.finish_with_message("Done");
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn run_started(&self, total_frames: usize, slots: usize) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        let overall = self.multi.add(ProgressBar::new(total_frames as u64));
        overall.set_style(self.overall_style.clone());
        overall.set_message("Aligning");
        bars.overall = Some(overall);
        bars.slots = (0..slots)
            .map(|i| {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(self.slot_style.clone());
                bar.set_prefix(format!("Slot {}", i + 1));
                bar.set_message(IDLE);
                SlotBar {
                    bar,
                    file: String::new(),
                }
            })
            .collect();
    }

    fn slot_started(&self, slot: usize, file: &str) {
        self.with_slot(slot, |s| {
            s.file = file.to_string();
            s.bar.set_message(format!("{file}: Prepare"));
        });
    }

    fn slot_status(&self, slot: usize, status: &str, row: usize) {
        self.with_slot(slot, |s| {
            s.bar.set_message(format!("{}: {status} (row {row})", s.file));
            s.bar.tick();
        });
    }

    fn slot_saving(&self, slot: usize) {
        self.with_slot(slot, |s| s.bar.set_message(format!("{}: Saving", s.file)));
    }

    fn slot_cleared(&self, slot: usize) {
        self.with_slot(slot, |s| {
            s.file.clear();
            s.bar.set_message(IDLE);
        });
    }

    fn frame_done(&self, frames_done: usize, _total_frames: usize) {
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(overall) = &bars.overall {
            overall.set_position(frames_done as u64);
        }
    }
}
