//! Replicated storage layer for the time log.
//!
//! The time log lives in an Automerge document shared between replicas (one per
//! machine). [`TimeLogIndex`] keeps the interval projections of all records in
//! a list sorted by start time, next to a map holding the full records, and
//! rejects writes that would make two intervals overlap.
//!
//! # Merges
//!
//! Automerge merges list insertions deterministically, but interleaving two
//! independently sorted insertion histories does not yield a list sorted by
//! payload. After [`TimeLogIndex::apply_snapshot`] the list may be out of order
//! until a [`resort`] pass has run. Searches tolerate this: entries that cannot
//! be decoded are skipped and the prior entry of a moved record is located by
//! id as a fallback.
//!
//! # Thread Safety
//!
//! [`TimeLogIndex`] is `Send` but has a single logical writer. Share it as
//! `Arc<tokio::sync::Mutex<TimeLogIndex>>` when the [`ResortScheduler`] runs
//! in the background; each resort batch takes the lock for one transaction
//! and releases it between batches.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tl_core::ValidationError;

mod document;
mod index;
mod recording;
pub mod resort;

pub use automerge::ActorId;
pub use document::Replica;
pub use index::{BatchReport, Change, CommentUpdate, Listener, TimeLogIndex, UpsertOutcome};
pub use recording::{Closed, Finished, RecordingSession, Started};
pub use resort::{PassReport, ResortConfig, ResortScheduler};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying Automerge document.
    #[error("document error: {0}")]
    Document(#[from] automerge::AutomergeError),

    /// Reading or writing the document file failed.
    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The document does not contain one of the time log containers.
    #[error("document is missing its `{key}` container")]
    MissingSchema { key: &'static str },

    /// The record failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}
