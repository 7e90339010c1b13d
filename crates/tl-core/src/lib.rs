//! Core domain logic for the replicated time log.
//!
//! This crate is independent of the replication substrate and contains:
//! - Records: time log records and their `{id, start, end}` ordering projection
//! - Search: binary search tolerant of entries without ordering information
//! - Conflict policy: deciding where an interval may be placed without overlap

pub mod conflict;
pub mod record;
pub mod search;
mod types;

pub use conflict::{Conflict, MetaSequence, Placement, locate, place};
pub use record::{IntervalMeta, TimeLogRecord, from_millis, to_millis};
pub use search::{SearchResult, binary_search, binary_search_ignoring};
pub use types::{LogId, TaskId, ValidationError};
