use rusqlite::{params, Connection, OptionalExtension};

use super::RowScanner;
use crate::error::{KvError, Result};
use crate::glob::GlobPattern;
use crate::types::KeyType;

/// A row of the `keys` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRow {
    pub id: i64,
    pub key_type: KeyType,
    pub expire_at: Option<i64>,
}

impl KeyRow {
    pub fn is_live(&self, now: i64) -> bool {
        self.expire_at.map_or(true, |at| at > now)
    }
}

/// Key metadata: existence, type tags, expiration and enumeration.
pub struct KeyStore<'c> {
    conn: &'c Connection,
    now: i64,
}

impl<'c> KeyStore<'c> {
    pub(crate) fn new(conn: &'c Connection, now: i64) -> Self {
        Self { conn, now }
    }

    /// Raw row for `key`, expired or not.
    pub(crate) fn lookup(&self, key: &str) -> Result<Option<KeyRow>> {
        let row: Option<(i64, i32, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT id, type, expire_at FROM keys WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((id, t, expire_at)) => {
                let key_type = KeyType::from_i32(t)
                    .ok_or_else(|| KvError::invalid(format!("unknown key type {}", t)))?;
                Ok(Some(KeyRow {
                    id,
                    key_type,
                    expire_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// The key's row if it exists and has not expired.
    pub fn get(&self, key: &str) -> Result<Option<KeyRow>> {
        Ok(self.lookup(key)?.filter(|row| row.is_live(self.now)))
    }

    /// Id of a live key of type `key_type`; another type is `WrongType`.
    pub fn typed(&self, key: &str, key_type: KeyType) -> Result<Option<i64>> {
        match self.get(key)? {
            Some(row) if row.key_type != key_type => Err(KvError::WrongType),
            Some(row) => Ok(Some(row.id)),
            None => Ok(None),
        }
    }

    /// Id of a live key of type `key_type`, creating it when absent. An
    /// expired row under the same name is dropped first.
    pub fn get_or_create(&self, key: &str, key_type: KeyType) -> Result<i64> {
        match self.lookup(key)? {
            Some(row) if row.is_live(self.now) => {
                if row.key_type != key_type {
                    return Err(KvError::WrongType);
                }
                Ok(row.id)
            }
            Some(row) => {
                self.delete_id(row.id)?;
                self.insert(key, key_type, None)
            }
            None => self.insert(key, key_type, None),
        }
    }

    /// Creates `key` from scratch, replacing any row under that name.
    pub fn create(&self, key: &str, key_type: KeyType, expire_at: Option<i64>) -> Result<i64> {
        self.conn
            .execute("DELETE FROM keys WHERE key = ?1", params![key])?;
        self.insert(key, key_type, expire_at)
    }

    fn insert(&self, key: &str, key_type: KeyType, expire_at: Option<i64>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO keys (key, type, expire_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![key, key_type as i32, expire_at, self.now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Deletes `key` with all its values. Returns false when it did not exist
    /// (an expired row is still removed).
    pub fn delete(&self, key: &str) -> Result<bool> {
        match self.lookup(key)? {
            Some(row) => {
                self.delete_id(row.id)?;
                Ok(row.is_live(self.now))
            }
            None => Ok(false),
        }
    }

    pub fn delete_id(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM keys WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn set_expire(&self, id: i64, expire_at: Option<i64>) -> Result<()> {
        self.conn.execute(
            "UPDATE keys SET expire_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![expire_at, self.now, id],
        )?;
        Ok(())
    }

    pub fn touch(&self, id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE keys SET updated_at = ?1 WHERE id = ?2",
            params![self.now, id],
        )?;
        Ok(())
    }

    /// Moves key `id` to the name `to`, dropping whatever `to` held.
    /// Values and expiration travel with the key.
    pub fn rename(&self, id: i64, to: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM keys WHERE key = ?1 AND id != ?2",
            params![to, id],
        )?;
        self.conn.execute(
            "UPDATE keys SET key = ?1, updated_at = ?2 WHERE id = ?3",
            params![to, self.now, id],
        )?;
        Ok(())
    }

    /// Number of live keys starting with `prefix`.
    pub fn count(&self, prefix: &str) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM keys
             WHERE substr(key, 1, length(?1)) = ?1
             AND (expire_at IS NULL OR expire_at > ?2)",
            params![prefix, self.now],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Deletes every key starting with `prefix`, expired or not.
    pub fn delete_all(&self, prefix: &str) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM keys WHERE substr(key, 1, length(?1)) = ?1",
            params![prefix],
        )?;
        Ok(n)
    }

    /// A uniformly random live key starting with `prefix`.
    pub fn random(&self, prefix: &str) -> Result<Option<String>> {
        let key = self
            .conn
            .query_row(
                "SELECT key FROM keys
                 WHERE substr(key, 1, length(?1)) = ?1
                 AND (expire_at IS NULL OR expire_at > ?2)
                 ORDER BY RANDOM() LIMIT 1",
                params![prefix, self.now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(key)
    }

    /// Live keys matching `pattern`, in key order.
    pub fn scan<T, F>(&self, pattern: &GlobPattern, f: F) -> Result<T>
    where
        F: FnOnce(&mut RowScanner<'_, String>) -> Result<T>,
    {
        let mut stmt = self.conn.prepare(
            "SELECT key FROM keys
             WHERE expire_at IS NULL OR expire_at > ?1
             ORDER BY key",
        )?;
        let rows = stmt.query(params![self.now])?;
        let mut scanner = RowScanner::new(rows, pattern, |row| row.get(0));
        f(&mut scanner)
    }

    pub fn purge_expired(&self) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM keys WHERE expire_at IS NOT NULL AND expire_at <= ?1",
            params![self.now],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::scan::Scanner;
    use crate::store::Store;

    #[test]
    fn test_get_or_create_checks_type() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| {
                let id = tx.keys().get_or_create("h", KeyType::Hash)?;
                assert_eq!(tx.keys().get_or_create("h", KeyType::Hash)?, id);
                assert!(matches!(
                    tx.keys().get_or_create("h", KeyType::List),
                    Err(KvError::WrongType)
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_expired_key_is_invisible() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| {
                let keys = tx.keys();
                keys.create("old", KeyType::Set, Some(tx.now() - 10))?;
                assert!(!keys.exists("old")?);
                assert_eq!(keys.typed("old", KeyType::Hash)?, None);
                // a new key of another type may take its place
                keys.get_or_create("old", KeyType::Hash)?;
                assert_eq!(keys.get("old")?.map(|r| r.key_type), Some(KeyType::Hash));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_reports_live_keys_only() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| {
                let keys = tx.keys();
                keys.create("live", KeyType::Set, None)?;
                keys.create("dead", KeyType::Set, Some(tx.now()))?;
                assert!(keys.delete("live")?);
                assert!(!keys.delete("dead")?);
                assert!(!keys.delete("missing")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_prefix_scoped_counts() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| {
                let keys = tx.keys();
                for k in ["a:1", "a:2", "b:1"] {
                    keys.create(k, KeyType::Set, None)?;
                }
                assert_eq!(keys.count("")?, 3);
                assert_eq!(keys.count("a:")?, 2);
                assert_eq!(keys.random("c:")?, None);
                assert_eq!(keys.random("b:")?.as_deref(), Some("b:1"));
                assert_eq!(keys.delete_all("a:")?, 2);
                assert_eq!(keys.count("")?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_scan_filters_by_pattern() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| {
                let keys = tx.keys();
                for k in ["user:2", "user:1", "session:1"] {
                    keys.create(k, KeyType::String, None)?;
                }
                let found = keys.scan(&GlobPattern::new("user:*"), |s| {
                    let mut out = Vec::new();
                    while let Some(k) = s.next_item()? {
                        out.push(k);
                    }
                    Ok(out)
                })?;
                assert_eq!(found, vec!["user:1", "user:2"]);
                Ok(())
            })
            .unwrap();
    }
}
