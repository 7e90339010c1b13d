//! Import command for merging a snapshot from another replica.

use std::io::Read;

use anyhow::{Context, Result, bail};

use crate::Config;
use crate::document::{LocalDocument, MergeReport};

pub fn run<R: Read>(reader: &mut R, config: &Config) -> Result<MergeReport> {
    let snapshot = read_snapshot(reader)?;
    merge(&snapshot, config)
}

/// Merges `snapshot` into the local document and repairs the order.
pub fn merge(snapshot: &[u8], config: &Config) -> Result<MergeReport> {
    let document = LocalDocument::open(config)?;
    let report = document.merge_and_save(snapshot, config.resort)?;
    tracing::info!(applied = report.applied, records = report.records, "merged snapshot");
    Ok(report)
}

fn read_snapshot<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut snapshot = Vec::new();
    reader
        .read_to_end(&mut snapshot)
        .context("failed to read snapshot")?;
    if snapshot.is_empty() {
        bail!("empty snapshot");
    }
    Ok(snapshot)
}
