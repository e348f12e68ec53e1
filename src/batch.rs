// src/batch.rs
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LimitsConfig;
use crate::plot::PlotDescriptor;
use crate::processing::{AcquisitionScheduler, PlotReport};

/// Upper bound on workers regardless of configuration; each worker drives
/// blocking downloads and full-scene band algebra.
const WORKER_CAP: usize = 8;

/// Pause between batches so the provider sees a breathing gap.
const BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Aggregate counters over one batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub plots_attempted: usize,
    pub plots_failed: usize,
    pub dates_processed: usize,
    pub dates_rejected: usize,
    pub dates_failed: usize,
    pub dates_skipped: usize,
}

impl BatchSummary {
    fn absorb(&mut self, report: &PlotReport) {
        self.dates_processed += report.processed();
        self.dates_rejected += report.rejected();
        self.dates_failed += report.failed();
        self.dates_skipped += report.skipped();
    }
}

/// Runs plots through the scheduler in memory-bounded batches.
///
/// Plots are split into chunks of `batch_size`; within a chunk each plot is
/// handed to a worker thread over a flume channel. Between chunks the
/// coordinator checks available memory and pauses while it is below the
/// configured floor.
pub struct BatchCoordinator {
    scheduler: Arc<AcquisitionScheduler>,
    batch_size: usize,
    workers: usize,
    min_free_memory_mb: u64,
}

impl BatchCoordinator {
    pub fn new(scheduler: Arc<AcquisitionScheduler>, limits: &LimitsConfig) -> Self {
        let workers = limits
            .max_workers
            .min(num_cpus::get())
            .min(WORKER_CAP)
            .max(1);
        Self {
            scheduler,
            batch_size: limits.batch_size.max(1),
            workers,
            min_free_memory_mb: limits.min_free_memory_mb,
        }
    }

    pub fn run(&self, plots: &[PlotDescriptor]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total_batches = plots.len().div_ceil(self.batch_size);

        for (batch_idx, chunk) in plots.chunks(self.batch_size).enumerate() {
            tracing::info!(
                "batch {}/{} ({} plots, {} workers)",
                batch_idx + 1,
                total_batches,
                chunk.len(),
                self.workers
            );
            self.wait_for_memory();
            self.run_chunk(chunk, &mut summary);
            if batch_idx + 1 < total_batches {
                std::thread::sleep(BATCH_PAUSE);
            }
        }

        tracing::info!(
            "batch run complete: {} processed, {} rejected, {} failed, {} skipped over {} plots",
            summary.dates_processed,
            summary.dates_rejected,
            summary.dates_failed,
            summary.dates_skipped,
            summary.plots_attempted
        );
        summary
    }

    fn run_chunk(&self, chunk: &[PlotDescriptor], summary: &mut BatchSummary) {
        let (task_tx, task_rx) = flume::unbounded::<PlotDescriptor>();
        let (result_tx, result_rx) = flume::unbounded();

        let worker_count = self.workers.min(chunk.len()).max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let scheduler = Arc::clone(&self.scheduler);
            handles.push(std::thread::spawn(move || {
                while let Ok(plot) = task_rx.recv() {
                    let outcome = scheduler.process_plot(&plot);
                    if result_tx.send((plot.id.clone(), outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(task_rx);
        drop(result_tx);

        for plot in chunk {
            // Send cannot fail while workers hold the receiver.
            let _ = task_tx.send(plot.clone());
        }
        drop(task_tx);

        while let Ok((plot_id, outcome)) = result_rx.recv() {
            summary.plots_attempted += 1;
            match outcome {
                Ok(report) => summary.absorb(&report),
                Err(err) => {
                    tracing::error!(plot = %plot_id, error = %err, "plot failed");
                    summary.plots_failed += 1;
                }
            }
        }

        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Block while available memory sits below the floor, shrinking the
    /// wait into fixed pauses so a transient dip does not stall forever.
    fn wait_for_memory(&self) {
        if self.min_free_memory_mb == 0 {
            return;
        }
        let mut waits = 0;
        while let Some(free_mb) = available_memory_mb() {
            if free_mb >= self.min_free_memory_mb || waits >= 30 {
                if waits > 0 {
                    tracing::info!("resuming, {free_mb} MB available");
                }
                return;
            }
            if waits == 0 {
                tracing::warn!(
                    "only {free_mb} MB available (floor {} MB), pausing",
                    self.min_free_memory_mb
                );
            }
            waits += 1;
            std::thread::sleep(Duration::from_secs(2));
        }
    }
}

/// MemAvailable from /proc/meminfo, in megabytes. None on platforms
/// without procfs; the memory gate is then skipped.
fn available_memory_mb() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb / 1024);
        }
    }
    None
}
