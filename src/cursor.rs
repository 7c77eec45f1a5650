//! Cursors
//!
//! A cursor is a single-pass iterator over the records matching a predicate.
//!
//! ## State Machine
//! ```text
//!   Uninitialized ──start──► Initialized ──next──► Active ──next──► ...
//!         │                                          │
//!         └──(no match)──► EndOfResults ◄──(drained)─┘
//! ```
//! `EndOfResults` is terminal: further `next()` calls keep returning `None`.
//!
//! Every engine supplies a `RecordSource` that knows how to walk its own
//! storage; `EngineCursor` layers the shared state machine on top of it.

use crate::error::Result;
use crate::types::Record;

/// Cursor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    Uninitialized,
    Initialized,
    Active,
    EndOfResults,
}

/// Uniform cursor interface returned by `find`
pub trait Cursor {
    /// Current lifecycle state
    fn status(&self) -> CursorStatus;

    /// Advance to the next matching record.
    ///
    /// Returns `Ok(None)` once results are exhausted, and keeps doing so.
    fn next(&mut self) -> Result<Option<Record>>;

    /// Release the cursor and its position state
    fn close(self: Box<Self>) {}
}

/// Engine-specific iteration over matching records
pub(crate) trait RecordSource {
    /// Produce the next record satisfying the cursor's predicate
    fn next_match(&mut self) -> Result<Option<Record>>;
}

/// Shared cursor state machine over an engine's `RecordSource`.
///
/// Holds one record of lookahead so the cursor knows at creation time
/// whether any match exists.
pub(crate) struct EngineCursor<S> {
    status: CursorStatus,
    pending: Option<Record>,
    source: S,
}

impl<S: RecordSource> EngineCursor<S> {
    /// Build a cursor and position it on the first match
    pub(crate) fn start(mut source: S) -> Result<Self> {
        let pending = source.next_match()?;
        let status = if pending.is_some() {
            CursorStatus::Initialized
        } else {
            CursorStatus::EndOfResults
        };
        Ok(Self {
            status,
            pending,
            source,
        })
    }
}

impl<S: RecordSource> Cursor for EngineCursor<S> {
    fn status(&self) -> CursorStatus {
        self.status
    }

    fn next(&mut self) -> Result<Option<Record>> {
        if self.status == CursorStatus::EndOfResults {
            return Ok(None);
        }

        let current = match self.pending.take() {
            Some(record) => record,
            None => {
                self.status = CursorStatus::EndOfResults;
                return Ok(None);
            }
        };

        match self.source.next_match() {
            Ok(lookahead) => self.pending = lookahead,
            Err(e) => {
                self.status = CursorStatus::EndOfResults;
                return Err(e);
            }
        }

        self.status = CursorStatus::Active;
        Ok(Some(current))
    }
}

/// Drain a cursor into a vector of records
pub fn collect_records(cursor: &mut dyn Cursor) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(record) = cursor.next()? {
        records.push(record);
    }
    Ok(records)
}
