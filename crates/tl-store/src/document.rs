//! The replicated Automerge document behind the time log.
//!
//! # Layout
//!
//! ```text
//! ROOT (Map)
//! ├── task_log_meta (List)            # ordered sequence of {id, start, end}
//! ├── task_log (Map)                  # id -> {id, task, comment, start, end}
//! └── recording_task_log (Map)        # at most one key: "current"
//! ```
//!
//! Instants are stored as integer milliseconds since the Unix epoch.
//!
//! # Genesis
//!
//! The three containers are created by a genesis change with a fixed actor and
//! a zero timestamp. Every replica produces the byte-identical change, so two
//! replicas created independently share the same container objects and their
//! edits interleave on merge instead of one container replacing the other.
//!
//! Mutating methods are `pub(crate)`: the ordered sequence and the record map
//! are only written through [`TimeLogIndex`](crate::TimeLogIndex).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use automerge::transaction::{CommitOptions, Transactable};
use automerge::{ActorId, AutoCommit, ObjId, ObjType, ROOT, ReadDoc, ScalarValue, Value};
use tl_core::{IntervalMeta, LogId, MetaSequence, TaskId, TimeLogRecord, from_millis, to_millis};
use tracing::{debug, trace};

use crate::StoreError;

const META_KEY: &str = "task_log_meta";
const RECORDS_KEY: &str = "task_log";
const RECORDING_KEY: &str = "recording_task_log";
const RECORDING_SLOT: &str = "current";

const GENESIS_ACTOR: [u8; 16] = [0; 16];

/// One replica of the time log document.
pub struct Replica {
    doc: AutoCommit,
    metas: ObjId,
    records: ObjId,
    recording: ObjId,
}

impl Replica {
    /// Creates an empty replica writing as `actor`.
    pub fn new(actor: ActorId) -> Result<Self, StoreError> {
        let mut doc = AutoCommit::new().with_actor(ActorId::from(GENESIS_ACTOR.as_slice()));
        doc.put_object(ROOT, META_KEY, ObjType::List)?;
        doc.put_object(ROOT, RECORDS_KEY, ObjType::Map)?;
        doc.put_object(ROOT, RECORDING_KEY, ObjType::Map)?;
        let _ = doc.commit_with(CommitOptions::default().with_time(0));
        doc.set_actor(actor);
        Self::from_doc(doc)
    }

    /// Loads a replica from a snapshot produced by [`Replica::encode_snapshot`].
    pub fn load(bytes: &[u8], actor: ActorId) -> Result<Self, StoreError> {
        let doc = AutoCommit::load(bytes)?.with_actor(actor);
        Self::from_doc(doc)
    }

    /// Opens the replica stored at `path`, or creates an empty one if the file is missing.
    pub fn open(path: &Path, actor: ActorId) -> Result<Self, StoreError> {
        match fs::read(path) {
            Ok(bytes) => {
                let replica = Self::load(&bytes, actor)?;
                debug!(path = %path.display(), bytes = bytes.len(), "loaded document");
                Ok(replica)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Self::new(actor),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the full document to `path`, replacing the file atomically.
    pub fn save_to(&mut self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = self.encode_snapshot();
        let staging = path.with_extension("tmp");
        fs::write(&staging, &bytes).map_err(io_err)?;
        fs::rename(&staging, path).map_err(io_err)?;
        debug!(path = %path.display(), bytes = bytes.len(), "saved document");
        Ok(())
    }

    fn from_doc(doc: AutoCommit) -> Result<Self, StoreError> {
        let metas = root_object(&doc, META_KEY, ObjType::List)?;
        let records = root_object(&doc, RECORDS_KEY, ObjType::Map)?;
        let recording = root_object(&doc, RECORDING_KEY, ObjType::Map)?;
        Ok(Self {
            doc,
            metas,
            records,
            recording,
        })
    }

    /// The actor this replica writes as.
    pub fn actor(&self) -> &ActorId {
        self.doc.get_actor()
    }

    /// Exports the complete document state.
    pub fn encode_snapshot(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    /// Merges remote state into this replica.
    ///
    /// Returns the number of changes that were new to this replica. The merge
    /// may leave the ordered sequence unsorted; see [`crate::resort`].
    pub fn apply_snapshot(&mut self, bytes: &[u8]) -> Result<usize, StoreError> {
        let mut remote = AutoCommit::load(bytes)?;
        let applied = self.doc.merge(&mut remote)?;
        self.metas = root_object(&self.doc, META_KEY, ObjType::List)?;
        self.records = root_object(&self.doc, RECORDS_KEY, ObjType::Map)?;
        self.recording = root_object(&self.doc, RECORDING_KEY, ObjType::Map)?;
        Ok(applied.len())
    }

    /// Runs `f` as one change: committed if it succeeds, rolled back otherwise.
    pub(crate) fn transact<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Self) -> Result<T, StoreError>,
    {
        match f(self) {
            Ok(value) => {
                let _ = self.doc.commit();
                Ok(value)
            }
            Err(err) => {
                let discarded = self.doc.rollback();
                debug!(discarded, error = %err, "rolled back transaction");
                Err(err)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn change_count(&mut self) -> usize {
        self.doc.get_changes(&[]).len()
    }

    // ---------------------------------------------------------------------
    // Ordered sequence
    // ---------------------------------------------------------------------

    /// Decodes every entry of the ordered sequence, `None` for undecodable ones.
    pub fn metas(&self) -> Vec<Option<IntervalMeta>> {
        (0..MetaSequence::len(self)).map(|i| self.meta_at(i)).collect()
    }

    pub(crate) fn insert_meta(&mut self, index: usize, meta: &IntervalMeta) -> Result<(), StoreError> {
        let obj = self.doc.insert_object(&self.metas, index, ObjType::Map)?;
        self.doc.put(&obj, "id", meta.id.as_str())?;
        self.doc.put(&obj, "start", to_millis(meta.start))?;
        self.doc.put(&obj, "end", to_millis(meta.end))?;
        Ok(())
    }

    pub(crate) fn delete_meta(&mut self, index: usize) -> Result<(), StoreError> {
        self.doc.delete(&self.metas, index)?;
        Ok(())
    }

    fn read_meta(&self, obj: &ObjId) -> Option<IntervalMeta> {
        Some(IntervalMeta {
            id: LogId::new(self.read_str(obj, "id")?).ok()?,
            start: from_millis(self.read_int(obj, "start")?)?,
            end: from_millis(self.read_int(obj, "end")?)?,
        })
    }

    // ---------------------------------------------------------------------
    // Record map
    // ---------------------------------------------------------------------

    /// Looks up the full record for `id`.
    pub fn record(&self, id: &LogId) -> Option<TimeLogRecord> {
        let obj = self.map_entry(&self.records, id.as_str())?;
        self.read_record(&obj)
    }

    /// Number of entries in the record map.
    pub fn record_count(&self) -> usize {
        self.doc.length(&self.records)
    }

    pub(crate) fn put_record(&mut self, record: &TimeLogRecord) -> Result<(), StoreError> {
        let container = self.records.clone();
        self.write_record(&container, record.id.as_str(), record)
    }

    pub(crate) fn delete_record(&mut self, id: &LogId) -> Result<bool, StoreError> {
        if self.map_entry(&self.records, id.as_str()).is_none() {
            return Ok(false);
        }
        self.doc.delete(&self.records, id.as_str())?;
        Ok(true)
    }

    pub(crate) fn set_comment(&mut self, id: &LogId, comment: &str) -> Result<bool, StoreError> {
        let Some(obj) = self.map_entry(&self.records, id.as_str()) else {
            return Ok(false);
        };
        self.put_str(&obj, "comment", comment)?;
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Recording slot
    // ---------------------------------------------------------------------

    /// The session currently being recorded, if any.
    pub fn recording(&self) -> Option<TimeLogRecord> {
        let obj = self.map_entry(&self.recording, RECORDING_SLOT)?;
        self.read_record(&obj)
    }

    /// Replaces the recording slot with a fresh object holding `record`.
    pub(crate) fn put_recording(&mut self, record: &TimeLogRecord) -> Result<(), StoreError> {
        let obj = self
            .doc
            .put_object(&self.recording, RECORDING_SLOT, ObjType::Map)?;
        self.write_fields(&obj, record)
    }

    pub(crate) fn clear_recording(&mut self) -> Result<bool, StoreError> {
        if self.map_entry(&self.recording, RECORDING_SLOT).is_none() {
            return Ok(false);
        }
        self.doc.delete(&self.recording, RECORDING_SLOT)?;
        Ok(true)
    }

    // ---------------------------------------------------------------------
    // Field access
    // ---------------------------------------------------------------------

    fn map_entry(&self, container: &ObjId, key: &str) -> Option<ObjId> {
        match self.doc.get(container, key) {
            Ok(Some((Value::Object(ObjType::Map), obj))) => Some(obj),
            _ => None,
        }
    }

    /// Writes `record` under `key`, touching only fields whose value changed so
    /// concurrent edits of other fields survive the merge.
    fn write_record(
        &mut self,
        container: &ObjId,
        key: &str,
        record: &TimeLogRecord,
    ) -> Result<(), StoreError> {
        let obj = match self.map_entry(container, key) {
            Some(obj) => obj,
            None => self.doc.put_object(container, key, ObjType::Map)?,
        };
        self.write_fields(&obj, record)
    }

    fn write_fields(&mut self, obj: &ObjId, record: &TimeLogRecord) -> Result<(), StoreError> {
        self.put_str(obj, "id", record.id.as_str())?;
        self.put_str(obj, "task", record.task.as_str())?;
        self.put_str(obj, "comment", &record.comment)?;
        self.put_int(obj, "start", to_millis(record.start))?;
        self.put_int(obj, "end", to_millis(record.end))?;
        Ok(())
    }

    fn read_record(&self, obj: &ObjId) -> Option<TimeLogRecord> {
        Some(TimeLogRecord {
            id: LogId::new(self.read_str(obj, "id")?).ok()?,
            task: TaskId::new(self.read_str(obj, "task")?).ok()?,
            comment: self.read_str(obj, "comment").unwrap_or_default(),
            start: from_millis(self.read_int(obj, "start")?)?,
            end: from_millis(self.read_int(obj, "end")?)?,
        })
    }

    fn read_str(&self, obj: &ObjId, key: &str) -> Option<String> {
        match self.doc.get(obj, key) {
            Ok(Some((Value::Scalar(scalar), _))) => match &*scalar {
                ScalarValue::Str(value) => Some(value.to_string()),
                _ => None,
            },
            _ => None,
        }
    }

    fn read_int(&self, obj: &ObjId, key: &str) -> Option<i64> {
        match self.doc.get(obj, key) {
            Ok(Some((Value::Scalar(scalar), _))) => match &*scalar {
                ScalarValue::Int(value) => Some(*value),
                ScalarValue::Uint(value) => i64::try_from(*value).ok(),
                ScalarValue::Timestamp(value) => Some(*value),
                _ => None,
            },
            _ => None,
        }
    }

    fn put_str(&mut self, obj: &ObjId, key: &str, value: &str) -> Result<(), StoreError> {
        if self.read_str(obj, key).as_deref() != Some(value) {
            self.doc.put(obj, key, value)?;
        }
        Ok(())
    }

    fn put_int(&mut self, obj: &ObjId, key: &str, value: i64) -> Result<(), StoreError> {
        if self.read_int(obj, key) != Some(value) {
            self.doc.put(obj, key, value)?;
        }
        Ok(())
    }
}

impl MetaSequence for Replica {
    fn len(&self) -> usize {
        self.doc.length(&self.metas)
    }

    fn meta_at(&self, index: usize) -> Option<IntervalMeta> {
        let meta = match self.doc.get(&self.metas, index) {
            Ok(Some((Value::Object(ObjType::Map), obj))) => self.read_meta(&obj),
            _ => None,
        };
        if meta.is_none() && index < MetaSequence::len(self) {
            trace!(index, "undecodable meta entry");
        }
        meta
    }
}

fn root_object(doc: &AutoCommit, key: &'static str, kind: ObjType) -> Result<ObjId, StoreError> {
    match doc.get(ROOT, key)? {
        Some((Value::Object(found), obj)) if found == kind => Ok(obj),
        _ => Err(StoreError::MissingSchema { key }),
    }
}
