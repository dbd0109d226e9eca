//! SQLite-backed mapping store.

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::KVMapping;
use crate::codec::Codec;
use crate::config::{DEFAULT_TABLE, StoreConfig};
use crate::cursor::{Cursor, RowFn};
use crate::error::{KVError, KVResult};

static MEMORY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Column set selected by bulk reads and cursors.
#[derive(Debug, Clone, Copy)]
enum Projection {
    Keys,
    Values,
    Items,
}

impl Projection {
    fn columns(self) -> &'static str {
        match self {
            Projection::Keys => "k",
            Projection::Values => "v",
            Projection::Items => "k, v",
        }
    }
}

/// SQL text for one table, built once at open time.
struct Statements {
    table: String,
    contains: String,
    get: String,
    upsert: String,
    delete: String,
    count: String,
    clear: String,
    first: String,
}

impl Statements {
    fn new(table: &str) -> KVResult<Self> {
        let t = quote_ident(table)?;
        Ok(Self {
            contains: format!("SELECT 1 FROM {t} WHERE k = ?1"),
            get: format!("SELECT v FROM {t} WHERE k = ?1"),
            upsert: format!(
                "INSERT INTO {t} (k, v) VALUES (?1, ?2) \
                 ON CONFLICT(k) DO UPDATE SET v = excluded.v"
            ),
            delete: format!("DELETE FROM {t} WHERE k = ?1"),
            count: format!("SELECT COUNT(*) FROM {t}"),
            clear: format!("DELETE FROM {t}"),
            first: format!("SELECT k, v FROM {t} ORDER BY rowid LIMIT 1"),
            table: t,
        })
    }

    fn select_all(&self, p: Projection) -> String {
        format!("SELECT {} FROM {} ORDER BY rowid", p.columns(), self.table)
    }

    fn select_at(&self, p: Projection) -> String {
        format!("{} LIMIT 1 OFFSET ?1", self.select_all(p))
    }
}

/// Quotes a table name as an SQL identifier.
fn quote_ident(name: &str) -> KVResult<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(KVError::InvalidTable(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

fn connect(path: &Path, busy_timeout: Option<Duration>) -> KVResult<Connection> {
    let conn = Connection::open(path)?;
    if let Some(timeout) = busy_timeout {
        conn.busy_timeout(timeout)?;
    }
    Ok(conn)
}

fn ensure_table(conn: &Connection, table: &str, stmts: &Statements) -> KVResult<()> {
    let exists = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (k TEXT, v TEXT, PRIMARY KEY(k))",
            stmts.table
        ))?;
        debug!("sqlkv: created table {}", stmts.table);
    }
    Ok(())
}

fn key_row(row: &Row<'_>, _: Codec) -> KVResult<String> {
    Ok(row.get(0)?)
}

fn value_row<V: DeserializeOwned>(row: &Row<'_>, codec: Codec) -> KVResult<V> {
    let text: String = row.get(0)?;
    codec.decode(&text)
}

fn item_row<V: DeserializeOwned>(row: &Row<'_>, codec: Codec) -> KVResult<(String, V)> {
    let key: String = row.get(0)?;
    let text: String = row.get(1)?;
    Ok((key, codec.decode(&text)?))
}

/// A persistent mapping over a two-column SQLite table.
///
/// Rows live in `table` as `k TEXT PRIMARY KEY, v TEXT`, with values
/// serialized by the store's [`Codec`]. Every write commits before it
/// returns. The connection is released by [`close`](Self::close) or when
/// the store is dropped.
///
/// The value type is fixed per store; it defaults to [`serde_json::Value`].
pub struct SqliteStore<V = serde_json::Value> {
    conn: Option<Connection>,
    path: PathBuf,
    table: String,
    codec: Codec,
    busy_timeout: Option<Duration>,
    sql: Statements,
    _value: PhantomData<fn() -> V>,
}

impl<V> SqliteStore<V> {
    /// Open or create a store at `path`, creating `table` if it is absent.
    pub fn open<P: AsRef<Path>>(path: P, table: &str, codec: Codec) -> KVResult<Self> {
        Self::open_with_config(
            &StoreConfig::new(path.as_ref().to_path_buf())
                .with_table(table)
                .with_codec(codec),
        )
    }

    /// Open a JSON store using the default table.
    pub fn open_default<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        Self::open(path, DEFAULT_TABLE, Codec::Json)
    }

    /// Open a store described by a [`StoreConfig`].
    pub fn open_with_config(config: &StoreConfig) -> KVResult<Self> {
        let sql = Statements::new(&config.table)?;
        let busy_timeout = config.busy_timeout();
        let conn = connect(&config.path, busy_timeout)?;
        ensure_table(&conn, &config.table, &sql)?;
        debug!(
            "sqlkv: opened {} table={} codec={}",
            config.path.display(),
            config.table,
            config.codec
        );

        Ok(Self {
            conn: Some(conn),
            path: config.path.clone(),
            table: config.table.clone(),
            codec: config.codec,
            busy_timeout,
            sql,
            _value: PhantomData,
        })
    }

    /// Open a store over a private in-memory database.
    ///
    /// The database is shared with the store's cursors and disappears when
    /// the store and all of its cursors are gone.
    pub fn open_in_memory(table: &str, codec: Codec) -> KVResult<Self> {
        let seq = MEMORY_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:sqlkv-mem-{}-{}?mode=memory&cache=shared",
            std::process::id(),
            seq
        );
        Self::open(uri, table, codec)
    }

    /// Database path (or URI) the store was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Table name holding the rows.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Release the connection. Later operations fail with [`KVError::Closed`].
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> KVResult<()> {
        match self.conn.take() {
            Some(conn) => {
                debug!("sqlkv: closing {}", self.path.display());
                conn.close().map_err(|(_, e)| KVError::Storage(e))
            }
            None => Ok(()),
        }
    }

    fn conn(&self) -> KVResult<&Connection> {
        self.conn.as_ref().ok_or(KVError::Closed)
    }

    fn collect<T>(&self, p: Projection, transform: RowFn<T>) -> KVResult<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&self.sql.select_all(p))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(transform(row, self.codec)?);
        }
        Ok(out)
    }

    fn cursor<T>(&self, p: Projection, transform: RowFn<T>) -> KVResult<Cursor<T>> {
        // The store's own connection must be open even though the cursor
        // does not use it.
        self.conn()?;
        let conn = connect(&self.path, self.busy_timeout)?;
        Ok(Cursor::new(conn, self.sql.select_at(p), self.codec, transform))
    }
}

impl<V> fmt::Debug for SqliteStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("table", &self.table)
            .field("codec", &self.codec)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<V> KVMapping for SqliteStore<V>
where
    V: Serialize + DeserializeOwned,
{
    type Value = V;
    type KeyIter = Cursor<String>;
    type ValueIter = Cursor<V>;
    type ItemIter = Cursor<(String, V)>;

    fn contains(&self, key: &str) -> KVResult<bool> {
        let conn = self.conn()?;
        Ok(conn.prepare_cached(&self.sql.contains)?.exists([key])?)
    }

    fn get(&self, key: &str) -> KVResult<V> {
        let conn = self.conn()?;
        let text: Option<String> = conn
            .prepare_cached(&self.sql.get)?
            .query_row([key], |row| row.get(0))
            .optional()?;
        match text {
            Some(text) => self.codec.decode(&text),
            None => Err(KVError::NotFound(key.to_string())),
        }
    }

    fn set(&self, key: &str, value: &V) -> KVResult<()> {
        let text = self.codec.encode(value)?;
        let conn = self.conn()?;
        conn.prepare_cached(&self.sql.upsert)?
            .execute(params![key, text])?;
        Ok(())
    }

    fn delete(&self, key: &str) -> KVResult<()> {
        let conn = self.conn()?;
        let removed = conn.prepare_cached(&self.sql.delete)?.execute([key])?;
        if removed == 0 {
            return Err(KVError::NotFound(key.to_string()));
        }
        Ok(())
    }

    fn len(&self) -> KVResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(&self.sql.count, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn keys(&self) -> KVResult<Vec<String>> {
        self.collect(Projection::Keys, key_row)
    }

    fn values(&self) -> KVResult<Vec<V>> {
        self.collect(Projection::Values, value_row::<V>)
    }

    fn items(&self) -> KVResult<Vec<(String, V)>> {
        self.collect(Projection::Items, item_row::<V>)
    }

    fn clear(&self) -> KVResult<()> {
        let conn = self.conn()?;
        let removed = conn.execute(&self.sql.clear, [])?;
        debug!("sqlkv: cleared {} rows from {}", removed, self.sql.table);
        Ok(())
    }

    fn pop(&self, key: &str) -> KVResult<V> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let text: Option<String> = tx
            .prepare_cached(&self.sql.get)?
            .query_row([key], |row| row.get(0))
            .optional()?;
        let Some(text) = text else {
            return Err(KVError::NotFound(key.to_string()));
        };
        let value = self.codec.decode(&text)?;
        tx.prepare_cached(&self.sql.delete)?.execute([key])?;
        tx.commit()?;
        Ok(value)
    }

    fn pop_item(&self) -> KVResult<(String, V)> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let row: Option<(String, String)> = tx
            .prepare_cached(&self.sql.first)?
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        let Some((key, text)) = row else {
            return Err(KVError::Empty);
        };
        let value = self.codec.decode(&text)?;
        tx.prepare_cached(&self.sql.delete)?.execute([&key])?;
        tx.commit()?;
        Ok((key, value))
    }

    fn update<I, K>(&self, entries: I) -> KVResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
    {
        let encoded = entries
            .into_iter()
            .map(|(k, v)| self.codec.encode(&v).map(|text| (k, text)))
            .collect::<KVResult<Vec<_>>>()?;

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&self.sql.upsert)?;
            for (key, text) in &encoded {
                let key: &str = key.as_ref();
                stmt.execute(params![key, text])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn iter_keys(&self) -> KVResult<Cursor<String>> {
        self.cursor(Projection::Keys, key_row)
    }

    fn iter_values(&self) -> KVResult<Cursor<V>> {
        self.cursor(Projection::Values, value_row::<V>)
    }

    fn iter_items(&self) -> KVResult<Cursor<(String, V)>> {
        self.cursor(Projection::Items, item_row::<V>)
    }
}
