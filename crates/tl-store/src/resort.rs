//! Background repair of the ordered sequence after merges.
//!
//! A pass walks the sequence in batches of [`ResortConfig::batch_size`]
//! entries. Each batch is one transaction under the index lock; the lock is
//! released and the task yields between batches so foreground writes are not
//! starved. Foreground writes keep the already-scanned prefix sorted, but a
//! delete can shift entries under the cursor, so a pass rescans when the
//! index revision moved while it ran.
//!
//! [`ResortScheduler`] runs passes on a worker task. Triggers are debounced:
//! a pass starts once no new trigger has arrived for
//! [`ResortConfig::debounce`]. Triggers during a pass coalesce into a single
//! follow-up pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::index::TimeLogIndex;

/// Tuning for resort passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResortConfig {
    /// Entries examined per transaction.
    pub batch_size: usize,
    /// Quiet period required after the last trigger before a pass starts.
    pub debounce: Duration,
    /// Run one pass as soon as the scheduler is spawned.
    pub resort_on_start: bool,
}

impl Default for ResortConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            debounce: Duration::from_millis(100),
            resort_on_start: true,
        }
    }
}

/// Totals of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub batches: usize,
    pub scans: usize,
    pub moved: usize,
    pub removed: usize,
    pub rewritten: usize,
}

/// Runs batches until a full scan completes with no interleaved writes.
pub async fn run_pass(index: &Mutex<TimeLogIndex>, batch_size: usize) -> Result<PassReport, StoreError> {
    let mut report = PassReport::default();
    loop {
        let revision = index.lock().await.revision();
        let mut cursor = 0;
        loop {
            let batch = index.lock().await.resort_batch(cursor, batch_size)?;
            report.batches += 1;
            report.moved += batch.moved;
            report.removed += batch.removed;
            report.rewritten += batch.rewritten;
            cursor = batch.next;
            if batch.finished {
                break;
            }
            tokio::task::yield_now().await;
        }
        report.scans += 1;

        if index.lock().await.revision() == revision {
            return Ok(report);
        }
        debug!(scans = report.scans, "index changed during resort, rescanning");
    }
}

/// Runs resort passes in the background.
///
/// The worker is aborted when the scheduler is dropped.
pub struct ResortScheduler {
    trigger: Arc<Notify>,
    passes: watch::Receiver<u64>,
    worker: JoinHandle<()>,
}

impl ResortScheduler {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(index: Arc<Mutex<TimeLogIndex>>, config: ResortConfig) -> Self {
        let trigger = Arc::new(Notify::new());
        let (passes_tx, passes) = watch::channel(0);
        if config.resort_on_start {
            trigger.notify_one();
        }
        let worker = tokio::spawn(run_worker(index, Arc::clone(&trigger), passes_tx, config));
        Self {
            trigger,
            passes,
            worker,
        }
    }

    /// Signals that a merge completed and the sequence may be unsorted.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Number of passes finished so far, successful or not.
    pub fn completed_passes(&self) -> u64 {
        *self.passes.borrow()
    }

    /// Waits until at least `count` passes have finished.
    ///
    /// Returns early with the current count if the worker has stopped.
    pub async fn wait_for_passes(&self, count: u64) -> u64 {
        let mut passes = self.passes.clone();
        let reached = passes.wait_for(|done| *done >= count).await.map(|done| *done);
        reached.unwrap_or_else(|_| *passes.borrow())
    }
}

impl Drop for ResortScheduler {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    index: Arc<Mutex<TimeLogIndex>>,
    trigger: Arc<Notify>,
    passes: watch::Sender<u64>,
    config: ResortConfig,
) {
    loop {
        trigger.notified().await;
        loop {
            tokio::select! {
                () = trigger.notified() => {}
                () = tokio::time::sleep(config.debounce) => break,
            }
        }

        match run_pass(&index, config.batch_size).await {
            Ok(report) if report.moved > 0 || report.removed > 0 || report.rewritten > 0 => info!(
                moved = report.moved,
                removed = report.removed,
                rewritten = report.rewritten,
                batches = report.batches,
                "resorted time logs"
            ),
            Ok(report) => debug!(batches = report.batches, "time logs already sorted"),
            Err(err) => warn!(error = %err, "resort pass failed"),
        }
        passes.send_modify(|done| *done += 1);
    }
}
