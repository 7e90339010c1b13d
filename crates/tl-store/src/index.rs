//! The sorted, non-overlapping index of committed time logs.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::path::Path;

use chrono::{DateTime, Utc};
use tl_core::{
    Conflict, IntervalMeta, LogId, MetaSequence, TimeLogRecord, binary_search_ignoring, place,
};
use tracing::{debug, warn};

use crate::StoreError;
use crate::document::Replica;
use crate::recording::RecordingSession;

/// What kind of state a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// The ordered sequence or the record map.
    TimeLogs,
    /// The recording slot.
    Recording,
}

/// Callback invoked after every successful mutation.
pub type Listener = Box<dyn Fn(Change) + Send + Sync>;

/// Result of [`TimeLogIndex::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Accepted,
    Rejected(Conflict),
}

impl UpsertOutcome {
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Result of [`TimeLogIndex::update_comment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentUpdate {
    Updated,
    NoSuchRecord,
}

/// Progress of one resort batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Cursor to resume from.
    pub next: usize,
    /// Entries removed and reinserted at their sorted position.
    pub moved: usize,
    /// Stale or duplicate entries dropped.
    pub removed: usize,
    /// Entries replaced by their record's current interval.
    pub rewritten: usize,
    /// Whether the cursor reached the end of the sequence.
    pub finished: bool,
}

impl BatchReport {
    pub const fn repaired(&self) -> bool {
        self.moved > 0 || self.removed > 0 || self.rewritten > 0
    }
}

/// Time logs kept sorted by start, with conflict checks on every write.
pub struct TimeLogIndex {
    replica: Replica,
    listener: Option<Listener>,
    revision: u64,
}

impl fmt::Debug for TimeLogIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeLogIndex")
            .field("actor", self.replica.actor())
            .field("len", &self.len())
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl TimeLogIndex {
    /// Wraps a replica without change notifications.
    pub fn new(replica: Replica) -> Self {
        Self {
            replica,
            listener: None,
            revision: 0,
        }
    }

    /// Installs a callback invoked after every successful mutation.
    #[must_use]
    pub fn with_listener(mut self, listener: impl Fn(Change) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub const fn replica(&self) -> &Replica {
        &self.replica
    }

    pub(crate) fn replica_mut(&mut self) -> &mut Replica {
        &mut self.replica
    }

    /// Writes the document to `path`.
    pub fn save_to(&mut self, path: &Path) -> Result<(), StoreError> {
        self.replica.save_to(path)
    }

    /// Counts foreground mutations and merges.
    ///
    /// Resort batches do not bump it, so a pass can tell whether anything else
    /// wrote to the sequence while it was suspended.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn notify(&self, change: Change) {
        if let Some(listener) = &self.listener {
            listener(change);
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.notify(Change::TimeLogs);
    }

    /// Number of entries in the ordered sequence.
    pub fn len(&self) -> usize {
        MetaSequence::len(&self.replica)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &LogId) -> Option<TimeLogRecord> {
        self.replica.record(id)
    }

    /// Exports the complete document state.
    pub fn encode_snapshot(&mut self) -> Vec<u8> {
        self.replica.encode_snapshot()
    }

    /// Merges remote state. The sequence may be unsorted until the next resort pass.
    pub fn apply_snapshot(&mut self, bytes: &[u8]) -> Result<usize, StoreError> {
        let applied = self.replica.apply_snapshot(bytes)?;
        debug!(applied, "merged remote snapshot");
        if applied > 0 {
            self.touch();
            self.notify(Change::Recording);
        }
        Ok(applied)
    }

    /// Inserts a new record or moves/updates an existing one.
    ///
    /// Instants are truncated to millisecond precision first. Conflicts with
    /// neighbouring records are returned as [`UpsertOutcome::Rejected`] and
    /// leave the index untouched.
    pub fn upsert(&mut self, record: TimeLogRecord) -> Result<UpsertOutcome, StoreError> {
        self.upsert_then(record, |_| Ok(()))
    }

    /// Upserts `record` and, if it is accepted, runs `then` in the same
    /// transaction. An error from `then` rolls back the upsert as well.
    pub(crate) fn upsert_then<F>(&mut self, record: TimeLogRecord, then: F) -> Result<UpsertOutcome, StoreError>
    where
        F: FnOnce(&mut Replica) -> Result<(), StoreError>,
    {
        let record = record.at_storage_precision();
        record.validate()?;

        let candidate = record.meta();
        let existing = self.replica.record(&record.id);
        let prior = existing.as_ref().map(TimeLogRecord::meta);

        let placement = match place(&self.replica, &candidate, prior.as_ref()) {
            Ok(placement) => placement,
            Err(conflict) => {
                debug!(id = %record.id, code = conflict.code(), %conflict, "rejected time log");
                return Ok(UpsertOutcome::Rejected(conflict));
            }
        };

        let in_place = placement.prior_index.is_some() && prior.as_ref() == Some(&candidate);
        let unchanged = in_place && existing.as_ref() == Some(&record);

        self.replica.transact(|replica| {
            if !unchanged {
                if !in_place {
                    if let Some(prior_index) = placement.prior_index {
                        replica.delete_meta(prior_index)?;
                    }
                    replica.insert_meta(placement.target_index(), &candidate)?;
                }
                replica.put_record(&record)?;
            }
            then(replica)
        })?;

        if unchanged {
            return Ok(UpsertOutcome::Accepted);
        }
        debug!(
            id = %record.id,
            index = placement.target_index(),
            moved = placement.prior_index.is_some() && !in_place,
            "accepted time log"
        );
        self.touch();
        Ok(UpsertOutcome::Accepted)
    }

    /// Removes the record and every sequence entry carrying its id.
    ///
    /// Deleting an unknown id succeeds without doing anything.
    pub fn delete(&mut self, id: &LogId) -> Result<(), StoreError> {
        let positions: Vec<usize> = (0..self.len())
            .filter(|&i| self.replica.meta_at(i).is_some_and(|meta| &meta.id == id))
            .collect();

        let removed = self.replica.transact(|replica| {
            for &index in positions.iter().rev() {
                replica.delete_meta(index)?;
            }
            let had_record = replica.delete_record(id)?;
            Ok(had_record || !positions.is_empty())
        })?;

        if removed {
            debug!(%id, entries = positions.len(), "deleted time log");
            self.touch();
        }
        Ok(())
    }

    /// Replaces the comment of an existing record. Ordering is not touched.
    pub fn update_comment(&mut self, id: &LogId, comment: &str) -> Result<CommentUpdate, StoreError> {
        let updated = self.replica.transact(|replica| replica.set_comment(id, comment))?;
        if !updated {
            return Ok(CommentUpdate::NoSuchRecord);
        }
        self.touch();
        Ok(CommentUpdate::Updated)
    }

    /// Records touching the closed window `[start, end]`, in start order.
    ///
    /// A record is included when it ends at or after `start` and begins at or
    /// before `end`. Entries whose record is missing are skipped.
    pub fn query_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<TimeLogRecord> {
        let seq = &self.replica;
        let ignore = |i| seq.meta_at(i).is_none();

        let lower = binary_search_ignoring(
            seq.len(),
            |i| match seq.meta_at(i) {
                Some(meta) if meta.end < start => Ordering::Less,
                Some(_) => Ordering::Greater,
                None => Ordering::Equal,
            },
            ignore,
        )
        .insertion_point;
        let upper = binary_search_ignoring(
            seq.len(),
            |i| match seq.meta_at(i) {
                Some(meta) if meta.start <= end => Ordering::Less,
                Some(_) => Ordering::Greater,
                None => Ordering::Equal,
            },
            ignore,
        )
        .insertion_point;

        if lower >= upper {
            return Vec::new();
        }
        self.materialize(lower..upper)
    }

    /// All records in sequence order.
    pub fn records(&self) -> Vec<TimeLogRecord> {
        self.materialize(0..self.len())
    }

    fn materialize(&self, range: Range<usize>) -> Vec<TimeLogRecord> {
        range
            .filter_map(|i| self.replica.meta_at(i))
            .filter_map(|meta| self.replica.record(&meta.id))
            .collect()
    }

    /// Earliest start and latest end, from the first and last entries.
    pub fn query_date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = (0..self.len()).find_map(|i| self.replica.meta_at(i))?;
        let last = (0..self.len()).rev().find_map(|i| self.replica.meta_at(i))?;
        Some((first.start, last.end))
    }

    /// The recording session stored in this index.
    pub fn recording(&mut self) -> RecordingSession<'_> {
        RecordingSession::new(self)
    }

    /// Repairs up to `batch_size` entries of the sequence, starting at `from`,
    /// inside one transaction.
    ///
    /// The scan is an insertion sort: entries before the cursor are sorted,
    /// and an entry that starts before its predecessor is removed and
    /// reinserted by binary search over that prefix. Entries that cannot be
    /// decoded or have no record are skipped. An entry that disagrees with its
    /// record is removed when another entry already matches the record, and
    /// rewritten to the record's interval otherwise, so each record keeps one
    /// entry.
    pub fn resort_batch(&mut self, from: usize, batch_size: usize) -> Result<BatchReport, StoreError> {
        let report = self.replica.transact(|replica| {
            let mut report = BatchReport {
                next: from,
                ..BatchReport::default()
            };

            for _ in 0..batch_size.max(1) {
                let cursor = report.next;
                if cursor >= MetaSequence::len(replica) {
                    break;
                }

                let Some(meta) = replica.meta_at(cursor) else {
                    warn!(index = cursor, "skipping undecodable time log entry");
                    report.next += 1;
                    continue;
                };
                let Some(record) = replica.record(&meta.id) else {
                    warn!(index = cursor, id = %meta.id, "skipping time log entry without record");
                    report.next += 1;
                    continue;
                };
                let current = record.meta();
                if current != meta {
                    // Concurrent edits can merge into a record that matches none of
                    // its entries. The first disagreeing entry takes the merged value.
                    let matched_elsewhere = (0..MetaSequence::len(replica))
                        .any(|i| i != cursor && replica.meta_at(i).as_ref() == Some(&current));
                    replica.delete_meta(cursor)?;
                    if matched_elsewhere {
                        debug!(index = cursor, id = %meta.id, "removing stale time log entry");
                        report.removed += 1;
                    } else {
                        debug!(index = cursor, id = %meta.id, "rewriting time log entry from its record");
                        replica.insert_meta(cursor, &current)?;
                        report.rewritten += 1;
                    }
                    continue;
                }

                let previous = (0..cursor).rev().find_map(|i| live_meta(replica, i));
                match previous {
                    Some(previous) if previous.id == meta.id => {
                        debug!(index = cursor, id = %meta.id, "removing duplicate time log entry");
                        replica.delete_meta(cursor)?;
                        report.removed += 1;
                    }
                    Some(previous) if meta.start < previous.start => {
                        replica.delete_meta(cursor)?;
                        let result = binary_search_ignoring(
                            cursor,
                            |i| live_meta(replica, i).map_or(Ordering::Equal, |m| m.start.cmp(&meta.start)),
                            |i| live_meta(replica, i).is_none(),
                        );
                        let duplicate = result
                            .matched
                            .and_then(|i| replica.meta_at(i))
                            .is_some_and(|m| m.id == meta.id);
                        if duplicate {
                            debug!(index = cursor, id = %meta.id, "removing duplicate time log entry");
                            report.removed += 1;
                        } else {
                            let target = result.position();
                            debug!(from = cursor, to = target, id = %meta.id, "moving time log entry");
                            replica.insert_meta(target, &meta)?;
                            report.moved += 1;
                            report.next += 1;
                        }
                    }
                    _ => report.next += 1,
                }
            }

            report.finished = report.next >= MetaSequence::len(replica);
            Ok(report)
        })?;

        if report.repaired() {
            self.notify(Change::TimeLogs);
        }
        Ok(report)
    }

    /// Appends an entry and its record without any checks, as a merge would.
    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, record: &TimeLogRecord) {
        self.replica
            .transact(|replica| {
                replica.insert_meta(MetaSequence::len(replica), &record.meta())?;
                replica.put_record(record)
            })
            .unwrap();
    }
}

/// The entry at `index` if it decodes and its record still exists.
fn live_meta(replica: &Replica, index: usize) -> Option<IntervalMeta> {
    replica
        .meta_at(index)
        .filter(|meta| replica.record(&meta.id).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use chrono::{Duration, TimeZone};
    use tl_core::TaskId;

    use crate::ActorId;

    fn day(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()
    }

    fn april(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, 0, 0, 0).unwrap()
    }

    fn record(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeLogRecord {
        TimeLogRecord::new(
            LogId::new(id).unwrap(),
            TaskId::new("task-1").unwrap(),
            start,
            end,
        )
        .unwrap()
    }

    fn index(actor: u8) -> TimeLogIndex {
        TimeLogIndex::new(Replica::new(ActorId::from([actor; 16].as_slice())).unwrap())
    }

    fn starts(index: &TimeLogIndex) -> Vec<DateTime<Utc>> {
        index
            .replica()
            .metas()
            .into_iter()
            .map(|meta| meta.unwrap().start)
            .collect()
    }

    fn ids(records: &[TimeLogRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn assert_sorted(index: &TimeLogIndex) {
        let starts = starts(index);
        assert!(
            starts.windows(2).all(|pair| pair[0] < pair[1]),
            "not sorted: {starts:?}"
        );
    }

    fn resort(index: &mut TimeLogIndex, batch_size: usize) -> (usize, usize) {
        let (mut cursor, mut moved, mut removed) = (0, 0, 0);
        loop {
            let batch = index.resort_batch(cursor, batch_size).unwrap();
            moved += batch.moved;
            removed += batch.removed;
            cursor = batch.next;
            if batch.finished {
                return (moved, removed);
            }
        }
    }

    #[test]
    fn upsert_keeps_sequence_sorted() {
        let mut index = index(1);
        for (id, start) in [("c", 7), ("a", 1), ("d", 10), ("b", 4)] {
            let outcome = index.upsert(record(id, day(start), day(start + 2))).unwrap();
            assert_eq!(outcome, UpsertOutcome::Accepted);
        }
        assert_sorted(&index);
        assert_eq!(ids(&index.records()), vec!["a", "b", "c", "d"]);
        assert_eq!(index.replica().record_count(), 4);
    }

    #[test]
    fn duplicate_start_is_rejected_with_first_id() {
        let mut index = index(1);
        index.upsert(record("first", day(1), day(2))).unwrap();
        let outcome = index.upsert(record("second", day(1), day(3))).unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Rejected(Conflict::StartDuplicate {
                with: LogId::new("first").unwrap()
            })
        );
        assert_eq!(index.len(), 1);
        assert!(index.get(&LogId::new("second").unwrap()).is_none());
    }

    #[test]
    fn overlap_with_later_record_is_end_conflict() {
        let mut index = index(1);
        index.upsert(record("committed", day(1), day(3))).unwrap();
        let outcome = index.upsert(record("early", april(10), day(2))).unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Rejected(Conflict::EndConflict {
                with: LogId::new("committed").unwrap()
            })
        );
    }

    #[test]
    fn overlap_between_neighbours() {
        let mut index = index(1);
        index.upsert(record("a", day(1), day(3))).unwrap();
        index.upsert(record("b", day(4), day(6))).unwrap();

        let outcome = index.upsert(record("x", day(2), day(4))).unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Rejected(Conflict::StartConflict {
                with: LogId::new("a").unwrap()
            })
        );
        let outcome = index.upsert(record("y", day(3), day(5))).unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Rejected(Conflict::EndConflict {
                with: LogId::new("b").unwrap()
            })
        );
        // Filling the gap exactly touches both neighbours without overlapping.
        assert!(index.upsert(record("z", day(3), day(4))).unwrap().is_accepted());
        assert_eq!(ids(&index.records()), vec!["a", "z", "b"]);
    }

    #[test]
    fn moving_a_record_forward_and_back() {
        let mut index = index(1);
        for (id, start) in [("a", 1), ("b", 4), ("c", 7)] {
            index.upsert(record(id, day(start), day(start + 2))).unwrap();
        }

        index.upsert(record("a", day(10), day(11))).unwrap();
        assert_eq!(ids(&index.records()), vec!["b", "c", "a"]);
        assert_eq!(index.len(), 3);

        index.upsert(record("a", day(1), day(2))).unwrap();
        assert_eq!(ids(&index.records()), vec!["a", "b", "c"]);
        assert_eq!(index.len(), 3);
        assert_sorted(&index);
    }

    #[test]
    fn rejected_move_leaves_record_in_place() {
        let mut index = index(1);
        index.upsert(record("a", day(1), day(3))).unwrap();
        index.upsert(record("b", day(4), day(6))).unwrap();

        let outcome = index.upsert(record("a", day(1), day(5))).unwrap();
        assert!(!outcome.is_accepted());
        assert_eq!(index.get(&LogId::new("a").unwrap()).unwrap().end, day(3));
    }

    #[test]
    fn extending_end_updates_record_and_meta() {
        let mut index = index(1);
        index.upsert(record("a", day(1), day(3))).unwrap();
        index.upsert(record("a", day(1), day(4))).unwrap();

        let metas = index.replica().metas();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].as_ref().unwrap().end, day(4));
        assert_eq!(index.get(&LogId::new("a").unwrap()).unwrap().end, day(4));
    }

    #[test]
    fn upsert_truncates_to_milliseconds() {
        let mut index = index(1);
        let start = day(1) + Duration::nanoseconds(1_500_000);
        index.upsert(record("a", start, day(2))).unwrap();
        let stored = index.get(&LogId::new("a").unwrap()).unwrap();
        assert_eq!(stored.start, day(1) + Duration::milliseconds(1));
    }

    #[test]
    fn unchanged_upsert_writes_nothing() {
        let mut index = index(1);
        index.upsert(record("a", day(1), day(3))).unwrap();
        let revision = index.revision();
        index.upsert(record("a", day(1), day(3))).unwrap();
        assert_eq!(index.revision(), revision);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut index = index(1);
        index.upsert(record("a", day(1), day(3))).unwrap();
        let id = LogId::new("a").unwrap();

        index.delete(&id).unwrap();
        assert!(index.is_empty());
        assert!(index.get(&id).is_none());

        let revision = index.revision();
        index.delete(&id).unwrap();
        assert_eq!(index.revision(), revision);
    }

    #[test]
    fn update_comment() {
        let mut index = index(1);
        index.upsert(record("a", day(1), day(3))).unwrap();
        let id = LogId::new("a").unwrap();

        assert_eq!(index.update_comment(&id, "notes").unwrap(), CommentUpdate::Updated);
        assert_eq!(index.get(&id).unwrap().comment, "notes");

        let missing = LogId::new("missing").unwrap();
        assert_eq!(
            index.update_comment(&missing, "notes").unwrap(),
            CommentUpdate::NoSuchRecord
        );
    }

    #[test]
    fn query_range_includes_boundary_touching_records() {
        let mut index = index(1);
        for (id, start) in [("a", 1), ("b", 4), ("c", 7), ("d", 10)] {
            index.upsert(record(id, day(start), day(start + 2))).unwrap();
        }

        let window = index.query_range(day(1) + Duration::hours(12), day(5));
        assert_eq!(ids(&window), vec!["a", "b"]);

        assert_eq!(ids(&index.query_range(day(3), day(4))), vec!["a", "b"]);
        assert_eq!(ids(&index.query_range(day(1), day(12))).len(), 4);
        assert!(index.query_range(april(1), april(20)).is_empty());
        assert!(index.query_range(day(13), day(20)).is_empty());
    }

    #[test]
    fn query_range_on_empty_index() {
        let index = index(1);
        assert!(index.query_range(day(1), day(2)).is_empty());
        assert!(index.query_date_range().is_none());
    }

    #[test]
    fn query_date_range_spans_first_and_last() {
        let mut index = index(1);
        index.upsert(record("b", day(4), day(6))).unwrap();
        index.upsert(record("a", day(1), day(3))).unwrap();
        assert_eq!(index.query_date_range(), Some((day(1), day(6))));
    }

    #[test]
    fn listener_sees_mutations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut index = index(1).with_listener(move |change| {
            assert_eq!(change, Change::TimeLogs);
            seen.fetch_add(1, AtomicOrdering::SeqCst);
        });

        index.upsert(record("a", day(1), day(3))).unwrap();
        index.upsert(record("b", day(2), day(4))).unwrap(); // rejected
        index.delete(&LogId::new("a").unwrap()).unwrap();
        index.delete(&LogId::new("a").unwrap()).unwrap(); // no-op
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn resort_batch_sorts_unsorted_sequence() {
        let mut index = index(1);
        for start in [9, 1, 5, 3, 11, 7] {
            index.push_unchecked(&record(&format!("log-{start}"), day(start), day(start + 1)));
        }

        let (moved, removed) = resort(&mut index, 2);
        assert_eq!(removed, 0);
        assert!(moved > 0);
        assert_sorted(&index);
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn resort_of_sorted_sequence_writes_nothing() {
        let mut index = index(1);
        for start in [1, 3, 5] {
            index.upsert(record(&format!("log-{start}"), day(start), day(start + 1))).unwrap();
        }
        let before = index.encode_snapshot();
        assert_eq!(resort(&mut index, 50), (0, 0));
        assert_eq!(index.encode_snapshot(), before);
    }

    #[test]
    fn resort_skips_dangling_and_drops_stale_entries() {
        let mut index = index(1);
        let a = record("a", day(1), day(2));
        let b = record("b", day(3), day(4));
        index.push_unchecked(&b);
        index.push_unchecked(&a);

        // An entry left over from a concurrent move of `b`.
        let stale = record("b", day(8), day(9));
        index
            .replica
            .transact(|replica| replica.insert_meta(2, &stale.meta()))
            .unwrap();
        // An entry whose record was deleted concurrently.
        let dangling = record("gone", day(6), day(7));
        index
            .replica
            .transact(|replica| replica.insert_meta(3, &dangling.meta()))
            .unwrap();

        let (moved, removed) = resort(&mut index, 50);
        assert_eq!((moved, removed), (1, 1));
        let metas: Vec<_> = index.replica().metas().into_iter().flatten().collect();
        assert_eq!(metas, vec![a.meta(), b.meta(), dangling.meta()]);
        // Dangling entries are not materialized.
        assert_eq!(ids(&index.records()), vec!["a", "b"]);
    }

    #[test]
    fn resort_drops_duplicate_entries() {
        let mut index = index(1);
        let a = record("a", day(1), day(2));
        let b = record("b", day(3), day(4));
        index.push_unchecked(&a);
        index.push_unchecked(&b);
        index.push_unchecked(&a);

        let (_, removed) = resort(&mut index, 50);
        assert_eq!(removed, 1);
        assert_eq!(index.len(), 2);
        assert_sorted(&index);
    }

    #[test]
    fn merged_replicas_are_sorted_after_resort() {
        let mut local = index(1);
        let mut remote = index(2);

        for (id, start, end) in [
            ("local-1", day(1), day(3)),
            ("local-2", day(5), day(7)),
            ("local-3", day(9), day(11)),
        ] {
            assert!(local.upsert(record(id, start, end)).unwrap().is_accepted());
        }
        for (id, start, end) in [
            ("remote-1", april(15), april(17)),
            ("remote-2", april(19), day(2)),
            ("remote-3", day(8), day(12)),
            ("remote-4", day(14), day(16)),
        ] {
            assert!(remote.upsert(record(id, start, end)).unwrap().is_accepted());
        }

        local.apply_snapshot(&remote.encode_snapshot()).unwrap();
        resort(&mut local, 3);

        assert_eq!(
            starts(&local),
            vec![
                april(15),
                april(19),
                day(1),
                day(5),
                day(8),
                day(9),
                day(14)
            ]
        );
        assert_eq!(local.records().len(), 7);
        assert_eq!(local.replica().record_count(), 7);
    }

    #[test]
    fn concurrent_moves_of_one_record_converge() {
        let mut local = index(1);
        local.upsert(record("a", day(1), day(2))).unwrap();
        local.upsert(record("b", day(5), day(6))).unwrap();
        let mut remote = TimeLogIndex::new(
            Replica::load(&local.encode_snapshot(), ActorId::from([2; 16].as_slice())).unwrap(),
        );

        local.upsert(record("a", day(3), day(4))).unwrap();
        remote.upsert(record("a", day(7), day(8))).unwrap();

        local.apply_snapshot(&remote.encode_snapshot()).unwrap();
        resort(&mut local, 50);

        let winner = local.get(&LogId::new("a").unwrap()).unwrap();
        let metas: Vec<_> = local.replica().metas().into_iter().flatten().collect();
        assert_eq!(metas.len(), 2);
        assert!(metas.contains(&winner.meta()));
        assert_sorted(&local);
    }

    #[test]
    fn concurrent_start_and_end_edits_keep_one_entry() {
        let mut local = index(1);
        local.upsert(record("a", day(5), day(7))).unwrap();
        local.upsert(record("b", day(10), day(11))).unwrap();
        let mut remote = TimeLogIndex::new(
            Replica::load(&local.encode_snapshot(), ActorId::from([2; 16].as_slice())).unwrap(),
        );

        local.upsert(record("a", day(4), day(7))).unwrap();
        remote.upsert(record("a", day(5), day(8))).unwrap();

        local.apply_snapshot(&remote.encode_snapshot()).unwrap();
        let merged = local.get(&LogId::new("a").unwrap()).unwrap();
        assert_eq!((merged.start, merged.end), (day(4), day(8)));

        resort(&mut local, 1);

        let metas: Vec<_> = local.replica().metas().into_iter().flatten().collect();
        assert_eq!(metas, vec![merged.meta(), record("b", day(10), day(11)).meta()]);
        assert_eq!(ids(&local.query_range(day(1), day(30))), vec!["a", "b"]);
        assert_eq!(local.query_date_range(), Some((day(4), day(11))));
    }

    #[test]
    fn upsert_then_rolls_back_on_follow_up_error() {
        let mut index = index(1);
        let result = index.upsert_then(record("a", day(1), day(2)), |_| {
            Err(StoreError::MissingSchema { key: "follow-up" })
        });

        assert!(matches!(result, Err(StoreError::MissingSchema { .. })));
        assert!(index.is_empty());
        assert!(index.get(&LogId::new("a").unwrap()).is_none());
        assert_eq!(index.revision(), 0);
    }
}
