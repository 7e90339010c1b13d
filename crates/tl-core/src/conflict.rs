//! Placement rules for intervals in the ordered sequence.
//!
//! Time logs model exclusive occupancy of time: no two committed intervals may
//! overlap. [`place`] decides whether a candidate can go into the sequence and
//! where, treating the candidate's own existing entry as absent so a record can
//! be moved or resized without conflicting with itself.

use std::cmp::Ordering;

use thiserror::Error;

use crate::record::IntervalMeta;
use crate::search::binary_search_ignoring;
use crate::types::LogId;

/// Read access to an ordered sequence of interval metas.
pub trait MetaSequence {
    /// Number of entries, including undecodable ones.
    fn len(&self) -> usize;

    /// Decodes the entry at `index`.
    ///
    /// Returns `None` when the index is out of bounds or the entry cannot be
    /// decoded. Such entries are skipped by every search.
    fn meta_at(&self, index: usize) -> Option<IntervalMeta>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetaSequence for [IntervalMeta] {
    fn len(&self) -> usize {
        <[IntervalMeta]>::len(self)
    }

    fn meta_at(&self, index: usize) -> Option<IntervalMeta> {
        self.get(index).cloned()
    }
}

impl MetaSequence for Vec<IntervalMeta> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn meta_at(&self, index: usize) -> Option<IntervalMeta> {
        self.get(index).cloned()
    }
}

/// Why a candidate interval was rejected. Each variant names the neighbour it collides with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Conflict {
    /// Another record starts at exactly the same instant.
    #[error("start time duplicates time log {with}")]
    StartDuplicate { with: LogId },

    /// The preceding record ends after the candidate starts.
    #[error("start time overlaps time log {with}")]
    StartConflict { with: LogId },

    /// The following record starts before the candidate ends.
    #[error("end time overlaps time log {with}")]
    EndConflict { with: LogId },
}

impl Conflict {
    /// The conflicting neighbour.
    pub const fn with(&self) -> &LogId {
        match self {
            Self::StartDuplicate { with }
            | Self::StartConflict { with }
            | Self::EndConflict { with } => with,
        }
    }

    /// Stable numeric code shared with host applications.
    pub const fn code(&self) -> u16 {
        match self {
            Self::StartDuplicate { .. } => 100,
            Self::StartConflict { .. } => 101,
            Self::EndConflict { .. } => 102,
        }
    }
}

/// Where an accepted candidate goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Insertion point computed with the candidate's own entry ignored.
    pub insertion_point: usize,
    /// Current index of the candidate's own entry, if it is already committed.
    pub prior_index: Option<usize>,
}

impl Placement {
    /// Index to insert at after the prior entry (if any) has been removed.
    pub const fn target_index(&self) -> usize {
        match self.prior_index {
            Some(prior) if prior < self.insertion_point => self.insertion_point - 1,
            _ => self.insertion_point,
        }
    }
}

/// Decides whether `candidate` may be placed into `seq`.
///
/// `prior` is the committed projection of the same record, if there is one;
/// it is used to locate the entry that the caller must remove before
/// inserting at [`Placement::target_index`].
pub fn place<S>(
    seq: &S,
    candidate: &IntervalMeta,
    prior: Option<&IntervalMeta>,
) -> Result<Placement, Conflict>
where
    S: MetaSequence + ?Sized,
{
    let is_other = |meta: &IntervalMeta| meta.id != candidate.id;

    let result = binary_search_ignoring(
        seq.len(),
        |i| {
            seq.meta_at(i)
                .map_or(Ordering::Equal, |meta| meta.start.cmp(&candidate.start))
        },
        |i| !seq.meta_at(i).is_some_and(|meta| is_other(&meta)),
    );

    if let Some(index) = result.matched {
        if let Some(existing) = seq.meta_at(index) {
            return Err(Conflict::StartDuplicate { with: existing.id });
        }
    }

    let insertion_point = result.insertion_point;

    let previous = (0..insertion_point)
        .rev()
        .find_map(|i| seq.meta_at(i).filter(is_other));
    if let Some(previous) = previous {
        if previous.end > candidate.start {
            return Err(Conflict::StartConflict { with: previous.id });
        }
    }

    let next = (insertion_point..seq.len()).find_map(|i| seq.meta_at(i).filter(is_other));
    if let Some(next) = next {
        if next.start < candidate.end {
            return Err(Conflict::EndConflict { with: next.id });
        }
    }

    Ok(Placement {
        insertion_point,
        prior_index: prior.and_then(|prior| locate(seq, prior)),
    })
}

/// Finds the index of the entry matching `meta`'s id.
///
/// Tries a binary search on `meta.start` first and falls back to a linear scan,
/// since a freshly merged sequence may not be sorted yet.
pub fn locate<S>(seq: &S, meta: &IntervalMeta) -> Option<usize>
where
    S: MetaSequence + ?Sized,
{
    let result = binary_search_ignoring(
        seq.len(),
        |i| {
            seq.meta_at(i)
                .map_or(Ordering::Equal, |entry| entry.start.cmp(&meta.start))
        },
        |i| seq.meta_at(i).is_none(),
    );
    if let Some(index) = result.matched {
        if seq.meta_at(index).is_some_and(|entry| entry.id == meta.id) {
            return Some(index);
        }
    }
    (0..seq.len()).find(|&i| seq.meta_at(i).is_some_and(|entry| entry.id == meta.id))
}
