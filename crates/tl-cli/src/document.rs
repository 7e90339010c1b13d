//! Exclusive access to the local replica.
//!
//! Every command that writes to the document holds an exclusive lock on a
//! sibling lock file from load to save, so concurrent `tl` invocations on one
//! machine serialize instead of overwriting each other's changes.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use fs2::FileExt;
use tl_store::{ActorId, Replica, ResortScheduler, TimeLogIndex};
use tokio::sync::Mutex;

use crate::config::{Config, ResortSettings};
use crate::machine;

/// The local time log, locked for the lifetime of this value.
pub struct LocalDocument {
    index: TimeLogIndex,
    path: PathBuf,
    _lock: File,
}

/// Outcome of merging a remote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Changes that were new to this replica.
    pub applied: usize,
    /// Entries in the ordered sequence after the repair pass.
    pub records: usize,
}

impl LocalDocument {
    /// Opens the document as this machine. Requires `tl init`.
    pub fn open(config: &Config) -> Result<Self> {
        let identity = machine::require_machine_identity()?;
        Self::open_as(config, identity.actor_id()?)
    }

    /// Opens the document writing as `actor`, creating it if missing.
    pub fn open_as(config: &Config, actor: ActorId) -> Result<Self> {
        let lock_path = config.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let lock = File::create(&lock_path)
            .with_context(|| format!("failed to create {}", lock_path.display()))?;
        lock.lock_exclusive()
            .context("failed to acquire document lock")?;

        let replica = Replica::open(&config.document_path, actor)
            .with_context(|| format!("failed to open {}", config.document_path.display()))?;
        tracing::debug!(path = %config.document_path.display(), "opened document");

        Ok(Self {
            index: TimeLogIndex::new(replica),
            path: config.document_path.clone(),
            _lock: lock,
        })
    }

    pub const fn index(&self) -> &TimeLogIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut TimeLogIndex {
        &mut self.index
    }

    /// Writes the document back and releases the lock.
    pub fn save(mut self) -> Result<()> {
        self.index
            .save_to(&self.path)
            .with_context(|| format!("failed to save {}", self.path.display()))
    }

    /// Merges a remote snapshot, repairs the order, saves, and releases the lock.
    pub fn merge_and_save(self, snapshot: &[u8], settings: ResortSettings) -> Result<MergeReport> {
        let Self { index, path, _lock } = self;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to start runtime")?;

        runtime.block_on(async move {
            let index = Arc::new(Mutex::new(index));
            let scheduler = ResortScheduler::spawn(Arc::clone(&index), settings.scheduler_config());

            let applied = index
                .lock()
                .await
                .apply_snapshot(snapshot)
                .context("failed to merge snapshot")?;
            scheduler.trigger();
            scheduler.wait_for_passes(1).await;
            drop(scheduler);

            let mut index = index.lock().await;
            index
                .save_to(&path)
                .with_context(|| format!("failed to save {}", path.display()))?;
            Ok::<_, anyhow::Error>(MergeReport {
                applied,
                records: index.len(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use tl_core::{LogId, TaskId, TimeLogRecord};

    fn config(dir: &std::path::Path) -> Config {
        Config {
            document_path: dir.join("timelog.automerge"),
            resort: ResortSettings {
                batch_size: 2,
                debounce_ms: 0,
            },
        }
    }

    fn record(id: &str, day: u32) -> TimeLogRecord {
        TimeLogRecord::new(
            LogId::new(id).unwrap(),
            TaskId::new("task-1").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, day, 17, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn save_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let mut doc = LocalDocument::open_as(&config, ActorId::from([1; 16].as_slice())).unwrap();
        doc.index_mut().upsert(record("a", 1)).unwrap();
        doc.save().unwrap();

        let doc = LocalDocument::open_as(&config, ActorId::from([1; 16].as_slice())).unwrap();
        assert_eq!(doc.index().len(), 1);
        assert!(config.lock_path().exists());
    }

    #[test]
    fn merge_and_save_sorts_remote_records() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();

        let local_actor = || ActorId::from([1; 16].as_slice());
        let mut local = LocalDocument::open_as(&config(local_dir.path()), local_actor()).unwrap();
        for (id, day) in [("l1", 2), ("l2", 4), ("l3", 6)] {
            local.index_mut().upsert(record(id, day)).unwrap();
        }
        local.save().unwrap();

        let remote_actor = ActorId::from([2; 16].as_slice());
        let mut remote = LocalDocument::open_as(&config(remote_dir.path()), remote_actor).unwrap();
        for (id, day) in [("r1", 1), ("r2", 3), ("r3", 5), ("r4", 7)] {
            remote.index_mut().upsert(record(id, day)).unwrap();
        }
        let snapshot = remote.index_mut().encode_snapshot();

        let local = LocalDocument::open_as(&config(local_dir.path()), local_actor()).unwrap();
        let report = local.merge_and_save(&snapshot, config(local_dir.path()).resort).unwrap();
        assert!(report.applied > 0);
        assert_eq!(report.records, 7);

        let local = LocalDocument::open_as(&config(local_dir.path()), local_actor()).unwrap();
        let ids: Vec<String> = local
            .index()
            .records()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["r1", "l1", "r2", "l2", "r3", "l3", "r4"]);
    }
}
