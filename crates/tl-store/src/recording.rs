//! The single active recording session.
//!
//! A session lives in its own slot, outside the ordered sequence, until it is
//! finished. Finishing folds it into the index through the same conflict
//! checks as any other write.

use chrono::{DateTime, Utc};
use tl_core::{Conflict, LogId, TaskId, TimeLogRecord};
use tracing::{debug, warn};

use crate::StoreError;
use crate::document::Replica;
use crate::index::{Change, TimeLogIndex, UpsertOutcome};

/// A session that was closed and folded into the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closed {
    pub record: TimeLogRecord,
    pub outcome: UpsertOutcome,
}

/// Result of [`RecordingSession::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    /// The newly active session.
    pub record: TimeLogRecord,
    /// The session that was active before, closed at the new start.
    ///
    /// If its outcome is [`UpsertOutcome::Rejected`] the closed session was not
    /// committed and only survives in this value.
    pub closed: Option<Closed>,
}

/// Result of [`RecordingSession::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finished {
    /// Nothing was being recorded.
    Idle,
    /// The session was committed and the slot cleared.
    Committed(TimeLogRecord),
    /// The session conflicts with a committed record and is still active.
    Rejected {
        record: TimeLogRecord,
        conflict: Conflict,
    },
}

/// Start/finish access to the recording slot of a [`TimeLogIndex`].
pub struct RecordingSession<'a> {
    index: &'a mut TimeLogIndex,
}

impl<'a> RecordingSession<'a> {
    pub(crate) fn new(index: &'a mut TimeLogIndex) -> Self {
        Self { index }
    }

    /// The session being recorded, if any.
    pub fn active(&self) -> Option<TimeLogRecord> {
        self.index.replica().recording()
    }

    /// Starts recording `task` at `at`.
    ///
    /// An active session is finished at `at` first, in the same transaction
    /// that fills the slot with the new session. The new session starts even
    /// if the old one is rejected by the index.
    pub fn start(
        &mut self,
        task: TaskId,
        id: LogId,
        at: DateTime<Utc>,
    ) -> Result<Started, StoreError> {
        let record = TimeLogRecord::new(id, task, at, at)?.at_storage_precision();

        let closed = match self.active() {
            Some(current) => Some(self.close(current, at, |replica| replica.put_recording(&record))?),
            None => None,
        };
        match &closed {
            Some(Closed {
                outcome: UpsertOutcome::Accepted,
                ..
            }) => {}
            Some(Closed {
                record: previous,
                outcome: UpsertOutcome::Rejected(conflict),
            }) => {
                warn!(
                    id = %previous.id,
                    code = conflict.code(),
                    %conflict,
                    "previous session could not be committed"
                );
                self.put(&record)?;
            }
            None => self.put(&record)?,
        }
        debug!(id = %record.id, task = %record.task, start = %record.start, "started recording");
        self.index.notify(Change::Recording);

        Ok(Started { record, closed })
    }

    /// Ends the active session at `at` and commits it.
    ///
    /// The commit and the clearing of the slot happen in one transaction.
    pub fn finish(&mut self, at: DateTime<Utc>) -> Result<Finished, StoreError> {
        let Some(current) = self.active() else {
            return Ok(Finished::Idle);
        };

        let Closed { record, outcome } =
            self.close(current, at, |replica| replica.clear_recording().map(drop))?;
        match outcome {
            UpsertOutcome::Accepted => {
                self.index.notify(Change::Recording);
                Ok(Finished::Committed(record))
            }
            UpsertOutcome::Rejected(conflict) => {
                debug!(id = %record.id, %conflict, "session kept after rejected finish");
                Ok(Finished::Rejected { record, conflict })
            }
        }
    }

    /// Drops the active session without committing it.
    pub fn discard(&mut self) -> Result<Option<TimeLogRecord>, StoreError> {
        let current = self.active();
        if current.is_some() {
            self.clear()?;
        }
        Ok(current)
    }

    /// Sets the end and upserts, running `then` in the same transaction when
    /// accepted. An end before the start is clamped to the start.
    fn close<F>(&mut self, mut record: TimeLogRecord, at: DateTime<Utc>, then: F) -> Result<Closed, StoreError>
    where
        F: FnOnce(&mut Replica) -> Result<(), StoreError>,
    {
        if at < record.start {
            debug!(id = %record.id, %at, start = %record.start, "close time precedes start, clamping");
            record.end = record.start;
        } else {
            record.end = at;
        }
        let record = record.at_storage_precision();
        let outcome = self.index.upsert_then(record.clone(), then)?;
        Ok(Closed { record, outcome })
    }

    fn put(&mut self, record: &TimeLogRecord) -> Result<(), StoreError> {
        self.index
            .replica_mut()
            .transact(|replica| replica.put_recording(record))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        if self.index.replica_mut().transact(Replica::clear_recording)? {
            self.index.notify(Change::Recording);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, TimeZone};

    use crate::ActorId;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn index() -> TimeLogIndex {
        TimeLogIndex::new(Replica::new(ActorId::from([1; 16].as_slice())).unwrap())
    }

    fn task(name: &str) -> TaskId {
        TaskId::new(name).unwrap()
    }

    fn log(id: &str) -> LogId {
        LogId::new(id).unwrap()
    }

    #[test]
    fn finish_when_idle_is_noop() {
        let mut index = index();
        assert_eq!(index.recording().finish(at(9)).unwrap(), Finished::Idle);
        assert!(index.is_empty());
    }

    #[test]
    fn start_then_finish_commits_session() {
        let mut index = index();
        let started = index.recording().start(task("writing"), log("s1"), at(9)).unwrap();
        assert!(started.closed.is_none());
        assert_eq!(started.record.start, at(9));
        assert_eq!(started.record.end, at(9));
        assert!(index.is_empty());

        let finished = index.recording().finish(at(10)).unwrap();
        let Finished::Committed(record) = finished else {
            panic!("expected commit, got {finished:?}");
        };
        assert_eq!((record.start, record.end), (at(9), at(10)));
        assert!(index.recording().active().is_none());
        assert_eq!(index.get(&log("s1")), Some(record));
    }

    #[test]
    fn start_while_recording_folds_previous_session() {
        let mut index = index();
        index.recording().start(task("writing"), log("s1"), at(9)).unwrap();
        let started = index.recording().start(task("review"), log("s2"), at(11)).unwrap();

        let closed = started.closed.unwrap();
        assert_eq!(closed.outcome, UpsertOutcome::Accepted);
        assert_eq!((closed.record.start, closed.record.end), (at(9), at(11)));

        let active = index.recording().active().unwrap();
        assert_eq!(active.id, log("s2"));
        assert_eq!(active.task, task("review"));
        assert_eq!(index.records(), vec![closed.record]);
    }

    #[test]
    fn finish_conflict_keeps_session_active() {
        let mut index = index();
        let committed = TimeLogRecord::new(log("c"), task("meeting"), at(10), at(11)).unwrap();
        index.upsert(committed).unwrap();

        index.recording().start(task("writing"), log("s1"), at(9)).unwrap();
        let finished = index.recording().finish(at(12)).unwrap();
        assert_eq!(
            finished,
            Finished::Rejected {
                record: TimeLogRecord::new(log("s1"), task("writing"), at(9), at(12)).unwrap(),
                conflict: Conflict::EndConflict { with: log("c") },
            }
        );
        assert_eq!(index.recording().active().unwrap().id, log("s1"));

        // Retrying before the committed record succeeds.
        let finished = index.recording().finish(at(10)).unwrap();
        assert!(matches!(finished, Finished::Committed(_)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn implicit_finish_reports_conflict_and_still_starts() {
        let mut index = index();
        index.recording().start(task("writing"), log("s1"), at(9)).unwrap();
        // Logged elsewhere while the session was running.
        let committed = TimeLogRecord::new(log("c"), task("meeting"), at(10), at(11)).unwrap();
        index.upsert(committed).unwrap();

        let started = index.recording().start(task("review"), log("s2"), at(12)).unwrap();
        let closed = started.closed.unwrap();
        assert_eq!(
            closed.outcome,
            UpsertOutcome::Rejected(Conflict::EndConflict { with: log("c") })
        );
        assert!(index.get(&log("s1")).is_none());
        assert_eq!(index.recording().active().unwrap().id, log("s2"));
    }

    #[test]
    fn switching_sessions_is_one_change() {
        let mut index = index();
        index.recording().start(task("writing"), log("s1"), at(9)).unwrap();
        let before = index.replica_mut().change_count();

        index.recording().start(task("review"), log("s2"), at(10)).unwrap();
        assert_eq!(index.replica_mut().change_count(), before + 1);

        index.recording().finish(at(11)).unwrap();
        assert_eq!(index.replica_mut().change_count(), before + 2);
        assert_eq!(index.len(), 2);
        assert!(index.recording().active().is_none());
    }

    #[test]
    fn clock_moving_backward_clamps_close_to_start() {
        let mut index = index();
        index.recording().start(task("writing"), log("s1"), at(10)).unwrap();

        let started = index.recording().start(task("review"), log("s2"), at(9)).unwrap();
        let closed = started.closed.unwrap();
        assert_eq!(closed.outcome, UpsertOutcome::Accepted);
        assert_eq!((closed.record.start, closed.record.end), (at(10), at(10)));

        // The new session can still be committed before the zero-length one.
        let finished = index.recording().finish(at(9) + Duration::minutes(30)).unwrap();
        assert!(matches!(finished, Finished::Committed(_)));
        let ids: Vec<_> = index.records().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![log("s2"), log("s1")]);
    }

    #[test]
    fn discard_drops_session() {
        let mut index = index();
        assert!(index.recording().discard().unwrap().is_none());

        index.recording().start(task("writing"), log("s1"), at(9)).unwrap();
        let dropped = index.recording().discard().unwrap().unwrap();
        assert_eq!(dropped.id, log("s1"));
        assert!(index.recording().active().is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn recording_changes_are_notified() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut index = index().with_listener(move |change| sink.lock().unwrap().push(change));

        index.recording().start(task("writing"), log("s1"), at(9)).unwrap();
        index.recording().finish(at(10)).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Change::Recording, Change::TimeLogs, Change::Recording]
        );
    }
}
