//! Commands managing committed time logs.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tl_core::{LogId, TaskId, TimeLogRecord};
use tl_store::{CommentUpdate, TimeLogIndex, UpsertOutcome};

use crate::Config;
use crate::commands::util::{format_record, parse_datetime};
use crate::document::LocalDocument;

/// Arguments of `tl log add`, already parsed.
#[derive(Debug)]
pub struct NewLog {
    pub task: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub id: Option<String>,
    pub comment: String,
}

impl NewLog {
    pub fn parse(task: &str, start: &str, end: &str, id: Option<&str>, comment: &str) -> Result<Self> {
        Ok(Self {
            task: task.to_string(),
            start: parse_datetime(start).context("invalid --start")?,
            end: parse_datetime(end).context("invalid --end")?,
            id: id.map(str::to_string),
            comment: comment.to_string(),
        })
    }

    fn into_record(self) -> Result<TimeLogRecord> {
        let id = self.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = TimeLogRecord::new(LogId::new(id)?, TaskId::new(self.task)?, self.start, self.end)?
            .with_comment(self.comment);
        Ok(record)
    }
}

pub fn add<W: Write>(writer: &mut W, config: &Config, log: NewLog) -> Result<()> {
    let mut document = LocalDocument::open(config)?;
    add_to(writer, document.index_mut(), log)?;
    document.save()
}

fn add_to<W: Write>(writer: &mut W, index: &mut TimeLogIndex, log: NewLog) -> Result<()> {
    let record = log.into_record()?;
    match index.upsert(record.clone())? {
        UpsertOutcome::Accepted => {
            let stored = index.get(&record.id).unwrap_or(record);
            writeln!(writer, "Saved {}", format_record(&stored))?;
            Ok(())
        }
        UpsertOutcome::Rejected(conflict) => {
            bail!("time log {} rejected: {conflict} (code {})", record.id, conflict.code())
        }
    }
}

pub fn remove<W: Write>(writer: &mut W, config: &Config, id: &str) -> Result<()> {
    let id = LogId::new(id)?;
    let mut document = LocalDocument::open(config)?;
    document.index_mut().delete(&id)?;
    document.save()?;
    writeln!(writer, "Deleted {id}")?;
    Ok(())
}

pub fn comment<W: Write>(writer: &mut W, config: &Config, id: &str, text: &str) -> Result<()> {
    let id = LogId::new(id)?;
    let mut document = LocalDocument::open(config)?;
    match document.index_mut().update_comment(&id, text)? {
        CommentUpdate::Updated => {
            document.save()?;
            writeln!(writer, "Updated comment of {id}")?;
            Ok(())
        }
        CommentUpdate::NoSuchRecord => bail!("no time log with id {id}"),
    }
}

pub fn list<W: Write>(
    writer: &mut W,
    config: &Config,
    from: Option<&str>,
    to: Option<&str>,
    json: bool,
) -> Result<()> {
    let from = from.map(parse_datetime).transpose().context("invalid --from")?;
    let to = to.map(parse_datetime).transpose().context("invalid --to")?;
    let document = LocalDocument::open(config)?;
    write_list(writer, document.index(), from, to, json)
}

fn write_list<W: Write>(
    writer: &mut W,
    index: &TimeLogIndex,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let records = match (from, to) {
        (None, None) => index.records(),
        (from, to) => index.query_range(
            from.unwrap_or(DateTime::<Utc>::MIN_UTC),
            to.unwrap_or(DateTime::<Utc>::MAX_UTC),
        ),
    };

    if json {
        serde_json::to_writer_pretty(&mut *writer, &records).context("failed to serialize time logs")?;
        writeln!(writer)?;
        return Ok(());
    }

    if records.is_empty() {
        writeln!(writer, "No time logs.")?;
        return Ok(());
    }
    for record in &records {
        writeln!(writer, "{}", format_record(record))?;
    }
    Ok(())
}
