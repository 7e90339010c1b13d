//! Implementation of the `tl export` command.
//!
//! Writes the complete document as an Automerge snapshot to stdout. The output
//! is what `tl import` and `tl sync` on another machine consume.

use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;
use crate::document::LocalDocument;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<usize> {
    let mut document = LocalDocument::open(config)?;
    let snapshot = document.index_mut().encode_snapshot();
    writer
        .write_all(&snapshot)
        .context("failed to write snapshot")?;
    writer.flush().context("failed to flush snapshot")?;
    Ok(snapshot.len())
}
