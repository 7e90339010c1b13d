//! Status command for showing the time log and the active session.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use tl_store::TimeLogIndex;

use crate::Config;
use crate::commands::util::format_instant;
use crate::document::LocalDocument;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let mut document = LocalDocument::open(config)?;
    write_status(writer, &config.document_path, document.index_mut())
}

fn write_status<W: Write>(writer: &mut W, path: &Path, index: &mut TimeLogIndex) -> Result<()> {
    writeln!(writer, "Time log status")?;
    writeln!(writer, "Document: {}", path.display())?;

    match index.query_date_range() {
        Some((first, last)) => writeln!(
            writer,
            "Time logs: {} ({} to {})",
            index.len(),
            format_instant(first),
            format_instant(last)
        )?,
        None => writeln!(writer, "Time logs: none")?,
    }

    match index.recording().active() {
        Some(session) => writeln!(
            writer,
            "Recording: {} since {} ({})",
            session.task,
            format_instant(session.start),
            session.id
        )?,
        None => writeln!(writer, "Not recording.")?,
    }

    Ok(())
}
