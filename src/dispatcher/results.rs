//! Lazy result stream over a backend cursor

use tracing::{debug, warn};

use crate::backend::BoxCursor;
use crate::query::{QueryError, QueryResult, QueryRow, QueryType};

/// Rows of one query, pulled on demand.
///
/// Whoever receives a `ResultIterator` owns exactly one `close` call. Once
/// `next_row` returns `None` (or an error) it keeps returning `None`.
/// Dropping an unclosed iterator still releases the cursor but logs
/// `RESULTS_LEAKED`.
pub struct ResultIterator {
    query_type: QueryType,
    cursor: Option<BoxCursor>,
    exhausted: bool,
    rows_read: u64,
}

impl ResultIterator {
    pub(crate) fn new(query_type: QueryType, cursor: BoxCursor) -> Self {
        Self {
            query_type,
            cursor: Some(cursor),
            exhausted: false,
            rows_read: 0,
        }
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Next row, or `None` once exhausted or closed
    pub fn next_row(&mut self) -> QueryResult<Option<QueryRow>> {
        if self.exhausted {
            return Ok(None);
        }
        let cursor = match self.cursor.as_mut() {
            Some(cursor) => cursor,
            None => return Ok(None),
        };

        match cursor.next_row() {
            Ok(Some(row)) => {
                self.rows_read += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => {
                self.exhausted = true;
                warn!(
                    event = "ITERATION_FAILED",
                    query_type = %self.query_type,
                    rows_read = self.rows_read,
                    error = %e
                );
                Err(QueryError::iteration(self.query_type, e))
            }
        }
    }

    /// Releases the cursor. Later calls are no-ops.
    pub fn close(&mut self) -> QueryResult<()> {
        self.exhausted = true;
        let mut cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => return Ok(()),
        };
        cursor
            .close()
            .map_err(|e| QueryError::iteration(self.query_type, e))?;
        debug!(
            event = "RESULTS_CLOSED",
            query_type = %self.query_type,
            rows_read = self.rows_read
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Rows returned so far
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Drains the remaining rows and returns how many there were. Does not
    /// close.
    pub fn count_rows(&mut self) -> QueryResult<u64> {
        let mut count = 0;
        while self.next_row()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

impl Iterator for ResultIterator {
    type Item = QueryResult<QueryRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl Drop for ResultIterator {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            warn!(
                event = "RESULTS_LEAKED",
                query_type = %self.query_type,
                rows_read = self.rows_read
            );
            if let Err(e) = cursor.close() {
                warn!(event = "CURSOR_CLOSE_FAILED", query_type = %self.query_type, error = %e);
            }
        }
    }
}

impl std::fmt::Debug for ResultIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultIterator")
            .field("query_type", &self.query_type)
            .field("closed", &self.is_closed())
            .field("exhausted", &self.exhausted)
            .field("rows_read", &self.rows_read)
            .finish()
    }
}
