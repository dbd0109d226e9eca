//! Lazy, offset-paged iteration over a store table.
//!
//! A [`Cursor`] owns its own connection to the database file and fetches one
//! row per step with `... ORDER BY rowid LIMIT 1 OFFSET n`. Nothing is held
//! open between steps, so the store's own connection is free to read and
//! write while a cursor is alive.
//!
//! Paging is positional, not key based. Rows inserted or deleted ahead of the
//! current offset while a cursor is alive shift the remaining rows: entries
//! may then be skipped or yielded twice. Create a new cursor (or take a
//! [`copy`](crate::KVMapping::copy)) when a consistent view is required.

use std::iter::FusedIterator;

use rusqlite::{Connection, Row};
use tracing::debug;

use crate::codec::Codec;
use crate::error::KVResult;

/// Converts one fetched row into an iterator item.
pub(crate) type RowFn<T> = fn(&Row<'_>, Codec) -> KVResult<T>;

/// Forward-only, one-shot iterator over keys, values or items.
///
/// Yields `Err` for rows that fail to decode and moves past them. An engine
/// error is yielded once and ends the cursor. Once a step finds no row, or
/// fails in the engine, the connection is released and every later call
/// returns `None`.
pub struct Cursor<T> {
    conn: Option<Connection>,
    sql: String,
    offset: i64,
    codec: Codec,
    transform: RowFn<T>,
}

impl<T> Cursor<T> {
    pub(crate) fn new(conn: Connection, sql: String, codec: Codec, transform: RowFn<T>) -> Self {
        Self {
            conn: Some(conn),
            sql,
            offset: 0,
            codec,
            transform,
        }
    }

    /// Number of rows consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset as u64
    }

    /// Returns true once the cursor has ended, at the end of the table or
    /// after an engine error.
    pub fn is_exhausted(&self) -> bool {
        self.conn.is_none()
    }

    fn fetch(&self, conn: &Connection) -> rusqlite::Result<Option<KVResult<T>>> {
        let mut stmt = conn.prepare_cached(&self.sql)?;
        let mut rows = stmt.query([self.offset])?;
        match rows.next()? {
            Some(row) => Ok(Some((self.transform)(row, self.codec))),
            None => Ok(None),
        }
    }

    fn finish(&mut self) {
        if let Some(conn) = self.conn.take() {
            debug!("sqlkv: cursor finished after {} rows", self.offset);
            if let Err((_, e)) = conn.close() {
                debug!("sqlkv: cursor close: {}", e);
            }
        }
    }
}

impl<T> Iterator for Cursor<T> {
    type Item = KVResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let conn = self.conn.as_ref()?;
        match self.fetch(conn) {
            Ok(Some(item)) => {
                self.offset += 1;
                Some(item)
            }
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                self.finish();
                Some(Err(e.into()))
            }
        }
    }
}

impl<T> FusedIterator for Cursor<T> {}
