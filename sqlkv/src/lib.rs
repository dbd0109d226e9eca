//! Dictionary-style key-value store on top of a single SQLite table.
//!
//! A [`SqliteStore`] keeps entries in a two-column table (`k TEXT PRIMARY KEY`,
//! `v TEXT`) inside an ordinary SQLite file. Values are serialized with a
//! [`Codec`] chosen at open time, and every write is committed before the
//! call returns. Several stores can share one file by using different tables.
//!
//! ```no_run
//! use giztoy_sqlkv::{Codec, KVMapping, SqliteStore};
//! use serde_json::json;
//!
//! # fn main() -> giztoy_sqlkv::KVResult<()> {
//! let store: SqliteStore = SqliteStore::open("settings.sqlite", "cfg", Codec::Json)?;
//! store.set("theme", &json!({"name": "dark", "size": 14}))?;
//! assert_eq!(store.get("theme")?["name"], "dark");
//!
//! for item in store.iter_items()? {
//!     let (key, value) = item?;
//!     println!("{key} = {value}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod cursor;
pub mod error;
pub mod store;

use std::collections::HashMap;

pub use codec::Codec;
pub use config::{DEFAULT_TABLE, StoreConfig};
pub use cursor::Cursor;
pub use error::{KVError, KVResult};
pub use store::SqliteStore;

/// Mapping operations over a persistent table.
///
/// Reads return owned, decoded values. Missing keys are reported as
/// [`KVError::NotFound`] rather than `None`, mirroring map indexing.
pub trait KVMapping {
    /// Decoded value type.
    type Value;
    type KeyIter: Iterator<Item = KVResult<String>>;
    type ValueIter: Iterator<Item = KVResult<Self::Value>>;
    type ItemIter: Iterator<Item = KVResult<(String, Self::Value)>>;

    /// Returns true if `key` has a row.
    fn contains(&self, key: &str) -> KVResult<bool>;

    /// Get the value for `key`.
    fn get(&self, key: &str) -> KVResult<Self::Value>;

    /// Insert or replace the value for `key`.
    fn set(&self, key: &str, value: &Self::Value) -> KVResult<()>;

    /// Remove `key`. Fails with [`KVError::NotFound`] if it is absent.
    fn delete(&self, key: &str) -> KVResult<()>;

    /// Number of rows.
    fn len(&self) -> KVResult<usize>;

    /// All keys, in table order.
    fn keys(&self) -> KVResult<Vec<String>>;

    /// All values, in the same order as [`keys`](Self::keys).
    fn values(&self) -> KVResult<Vec<Self::Value>>;

    /// All pairs, in the same order as [`keys`](Self::keys).
    fn items(&self) -> KVResult<Vec<(String, Self::Value)>>;

    /// Remove every row.
    fn clear(&self) -> KVResult<()>;

    /// Remove `key` and return its value.
    fn pop(&self, key: &str) -> KVResult<Self::Value>;

    /// Remove and return the first pair in table order.
    /// Fails with [`KVError::Empty`] when there is nothing to remove.
    fn pop_item(&self) -> KVResult<(String, Self::Value)>;

    /// Insert or replace many pairs at once. Either all of them are written
    /// or none are.
    fn update<I, K>(&self, entries: I) -> KVResult<()>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, Self::Value)>,
        K: AsRef<str>;

    /// Lazily iterate over keys.
    fn iter_keys(&self) -> KVResult<Self::KeyIter>;

    /// Lazily iterate over values.
    fn iter_values(&self) -> KVResult<Self::ValueIter>;

    /// Lazily iterate over pairs.
    fn iter_items(&self) -> KVResult<Self::ItemIter>;

    /// Get the value for `key`, or `default` if it is absent.
    fn get_or_default(&self, key: &str, default: Self::Value) -> KVResult<Self::Value> {
        match self.get(key) {
            Err(KVError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    /// Get the value for `key`, storing and returning `default` if it is absent.
    fn set_default(&self, key: &str, default: Self::Value) -> KVResult<Self::Value> {
        match self.get(key) {
            Err(KVError::NotFound(_)) => {
                self.set(key, &default)?;
                Ok(default)
            }
            other => other,
        }
    }

    /// Remove `key` and return its value, or `default` if it is absent.
    fn pop_or(&self, key: &str, default: Self::Value) -> KVResult<Self::Value> {
        match self.pop(key) {
            Err(KVError::NotFound(_)) => Ok(default),
            other => other,
        }
    }

    fn is_empty(&self) -> KVResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Materialize the whole table into memory.
    ///
    /// The copy is also the way to inspect or compare a store as a plain map;
    /// see [`eq_map`](Self::eq_map).
    fn copy(&self) -> KVResult<HashMap<String, Self::Value>> {
        Ok(self.items()?.into_iter().collect())
    }

    /// Returns true if the table holds exactly the entries of `other`.
    fn eq_map(&self, other: &HashMap<String, Self::Value>) -> KVResult<bool>
    where
        Self::Value: PartialEq,
    {
        Ok(self.copy()? == *other)
    }
}
