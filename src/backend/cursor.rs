//! Cursor combinators
//!
//! Used by the view path to union partitions and apply the filters a key
//! range cannot express. Each combinator owns its inner cursors and closes
//! them when it is closed.

use std::collections::{HashSet, VecDeque};

use crate::query::QueryRow;

use super::errors::{BackendError, BackendResult};
use super::{BoxCursor, RowCursor};

/// Cursor over rows already in memory
#[derive(Debug, Default)]
pub struct VecCursor {
    rows: VecDeque<QueryRow>,
    closed: bool,
}

impl VecCursor {
    pub fn new(rows: impl IntoIterator<Item = QueryRow>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            closed: false,
        }
    }
}

impl RowCursor for VecCursor {
    fn next_row(&mut self) -> BackendResult<Option<QueryRow>> {
        if self.closed {
            return Err(BackendError::CursorClosed);
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

/// Drains cursors one after another. Exhausted parts are closed eagerly.
pub struct ChainCursor {
    parts: VecDeque<BoxCursor>,
    closed: bool,
}

impl ChainCursor {
    pub fn new(parts: impl IntoIterator<Item = BoxCursor>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
            closed: false,
        }
    }
}

impl RowCursor for ChainCursor {
    fn next_row(&mut self) -> BackendResult<Option<QueryRow>> {
        if self.closed {
            return Err(BackendError::CursorClosed);
        }
        while let Some(front) = self.parts.front_mut() {
            if let Some(row) = front.next_row()? {
                return Ok(Some(row));
            }
            if let Some(mut done) = self.parts.pop_front() {
                done.close()?;
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> BackendResult<()> {
        self.closed = true;
        let mut first_err = None;
        for mut part in self.parts.drain(..) {
            if let Err(e) = part.close() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Skips rows rejected by a predicate
pub struct FilterCursor<F> {
    inner: BoxCursor,
    predicate: F,
}

impl<F> FilterCursor<F>
where
    F: FnMut(&QueryRow) -> bool + Send,
{
    pub fn new(inner: BoxCursor, predicate: F) -> Self {
        Self { inner, predicate }
    }
}

impl<F> RowCursor for FilterCursor<F>
where
    F: FnMut(&QueryRow) -> bool + Send,
{
    fn next_row(&mut self) -> BackendResult<Option<QueryRow>> {
        while let Some(row) = self.inner.next_row()? {
            if (self.predicate)(&row) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> BackendResult<()> {
        self.inner.close()
    }
}

/// Stops after a fixed number of rows
pub struct LimitCursor {
    inner: BoxCursor,
    remaining: u64,
}

impl LimitCursor {
    pub fn new(inner: BoxCursor, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl RowCursor for LimitCursor {
    fn next_row(&mut self) -> BackendResult<Option<QueryRow>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let row = self.inner.next_row()?;
        if row.is_some() {
            self.remaining -= 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> BackendResult<()> {
        self.inner.close()
    }
}

/// Drops rows whose key was already produced. Rows without a key pass.
pub struct DedupCursor<F> {
    inner: BoxCursor,
    key: F,
    seen: HashSet<u64>,
}

impl<F> DedupCursor<F>
where
    F: FnMut(&QueryRow) -> Option<u64> + Send,
{
    pub fn new(inner: BoxCursor, key: F) -> Self {
        Self {
            inner,
            key,
            seen: HashSet::new(),
        }
    }
}

impl<F> RowCursor for DedupCursor<F>
where
    F: FnMut(&QueryRow) -> Option<u64> + Send,
{
    fn next_row(&mut self) -> BackendResult<Option<QueryRow>> {
        while let Some(row) = self.inner.next_row()? {
            match (self.key)(&row) {
                Some(key) if !self.seen.insert(key) => continue,
                _ => return Ok(Some(row)),
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> BackendResult<()> {
        self.seen.clear();
        self.inner.close()
    }
}
