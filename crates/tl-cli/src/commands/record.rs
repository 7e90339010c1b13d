//! Start and stop commands driving the recording session.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tl_core::{LogId, TaskId};
use tl_store::{Finished, TimeLogIndex, UpsertOutcome};

use crate::Config;
use crate::commands::util::{format_instant, format_record, parse_or_now};
use crate::document::LocalDocument;

pub fn start<W: Write>(
    writer: &mut W,
    config: &Config,
    task: &str,
    id: Option<&str>,
    at: Option<&str>,
) -> Result<()> {
    let at = parse_or_now(at)?;
    let mut document = LocalDocument::open(config)?;
    start_session(writer, document.index_mut(), task, id, at)?;
    document.save()
}

fn start_session<W: Write>(
    writer: &mut W,
    index: &mut TimeLogIndex,
    task: &str,
    id: Option<&str>,
    at: DateTime<Utc>,
) -> Result<()> {
    let task = TaskId::new(task)?;
    let id = LogId::new(id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string))?;

    let started = index.recording().start(task, id, at)?;
    if let Some(closed) = &started.closed {
        match &closed.outcome {
            UpsertOutcome::Accepted => writeln!(writer, "Committed {}", format_record(&closed.record))?,
            UpsertOutcome::Rejected(conflict) => writeln!(
                writer,
                "Could not commit previous session {}: {conflict}",
                closed.record.id
            )?,
        }
    }
    writeln!(
        writer,
        "Recording {} since {} ({})",
        started.record.task,
        format_instant(started.record.start),
        started.record.id
    )?;
    Ok(())
}

pub fn stop<W: Write>(writer: &mut W, config: &Config, at: Option<&str>, discard: bool) -> Result<()> {
    let at = parse_or_now(at)?;
    let mut document = LocalDocument::open(config)?;
    stop_session(writer, document.index_mut(), at, discard)?;
    document.save()
}

fn stop_session<W: Write>(
    writer: &mut W,
    index: &mut TimeLogIndex,
    at: DateTime<Utc>,
    discard: bool,
) -> Result<()> {
    if discard {
        match index.recording().discard()? {
            Some(session) => writeln!(writer, "Discarded session {}", session.id)?,
            None => writeln!(writer, "Not recording.")?,
        }
        return Ok(());
    }

    match index.recording().finish(at)? {
        Finished::Idle => writeln!(writer, "Not recording.")?,
        Finished::Committed(record) => writeln!(writer, "Committed {}", format_record(&record))?,
        Finished::Rejected { record, conflict } => bail!(
            "session {} was not committed: {conflict} (code {}). Stop it at another time or use --discard",
            record.id,
            conflict.code()
        ),
    }
    Ok(())
}
