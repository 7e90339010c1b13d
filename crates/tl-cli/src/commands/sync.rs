//! Sync command for pulling a remote replica over ssh and merging it.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::Config;
use crate::commands::import;

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Remote host to pull from (e.g. user@host).
    pub remote: String,
}

#[derive(Debug)]
pub struct SyncReport {
    pub remote: String,
    pub snapshot_bytes: usize,
    pub applied: usize,
    pub records: usize,
}

pub fn run(args: &SyncArgs, config: &Config) -> Result<SyncReport> {
    let state_path = default_sync_state_path()?;
    let mut state = SyncState::load(&state_path)?;

    let mut child = Command::new("ssh")
        .arg(&args.remote)
        .arg("tl")
        .arg("export")
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to start ssh to {}", args.remote))?;

    let mut stdout = child
        .stdout
        .take()
        .context("failed to capture ssh stdout")?;
    let mut snapshot = Vec::new();
    stdout
        .read_to_end(&mut snapshot)
        .with_context(|| format!("failed to read snapshot from {}", args.remote))?;

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for ssh to {}", args.remote))?;
    if !status.success() {
        return Err(anyhow::anyhow!(
            "ssh to {} exited with status {status}",
            args.remote
        ));
    }

    let report = import::merge(&snapshot, config)
        .with_context(|| format!("failed to merge snapshot from {}", args.remote))?;

    let synced_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    state.record_sync(&args.remote, report.applied, snapshot.len(), synced_at);
    state.save(&state_path)?;

    Ok(SyncReport {
        remote: args.remote.clone(),
        snapshot_bytes: snapshot.len(),
        applied: report.applied,
        records: report.records,
    })
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SyncState {
    remotes: BTreeMap<String, SyncPosition>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SyncPosition {
    last_synced_at: String,
    last_snapshot_bytes: usize,
    total_changes_applied: usize,
}

impl SyncState {
    fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed = serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                Ok(parsed)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to encode sync state")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn record_sync(&mut self, remote: &str, applied: usize, snapshot_bytes: usize, synced_at: String) {
        let entry = self
            .remotes
            .entry(remote.to_string())
            .or_insert_with(|| SyncPosition {
                last_synced_at: synced_at.clone(),
                last_snapshot_bytes: 0,
                total_changes_applied: 0,
            });

        entry.last_synced_at = synced_at;
        entry.last_snapshot_bytes = snapshot_bytes;
        entry.total_changes_applied += applied;
    }
}

fn default_sync_state_path() -> Result<PathBuf> {
    let config_dir = crate::config::dirs_config_path().context("failed to determine config directory")?;
    Ok(config_dir.join("sync.json"))
}
