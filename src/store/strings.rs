use rusqlite::{params, Connection, OptionalExtension};

use super::KeyStore;
use crate::error::{KvError, Result};
use crate::types::KeyType;

/// A live string value with the key's current expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringEntry {
    pub value: Vec<u8>,
    pub expire_at: Option<i64>,
}

pub struct StringStore<'c> {
    conn: &'c Connection,
    now: i64,
}

impl<'c> StringStore<'c> {
    pub(crate) fn new(conn: &'c Connection, now: i64) -> Self {
        Self { conn, now }
    }

    /// Value and expiration of a live string key. Other types are
    /// `WrongType`.
    pub fn entry(&self, key: &str) -> Result<Option<StringEntry>> {
        let row: Option<(i32, Option<Vec<u8>>, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT k.type, s.value, k.expire_at
                 FROM keys k
                 LEFT JOIN strings s ON s.key_id = k.id
                 WHERE k.key = ?1 AND (k.expire_at IS NULL OR k.expire_at > ?2)",
                params![key, self.now],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((t, _, _)) if t != KeyType::String as i32 => Err(KvError::WrongType),
            Some((_, value, expire_at)) => Ok(Some(StringEntry {
                value: value.unwrap_or_default(),
                expire_at,
            })),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entry(key)?.map(|e| e.value))
    }

    /// Writes `value` under `key`, replacing a key of any type.
    pub fn put(&self, key: &str, value: &[u8], expire_at: Option<i64>) -> Result<()> {
        let keys = KeyStore::new(self.conn, self.now);
        if let Some(row) = keys.lookup(key)? {
            if row.key_type != KeyType::String || !row.is_live(self.now) {
                keys.delete_id(row.id)?;
            }
        }

        // Upsert key and get key_id in one statement (RETURNING eliminates extra SELECT)
        let key_id: i64 = self.conn.query_row(
            "INSERT INTO keys (key, type, expire_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 type = excluded.type,
                 expire_at = excluded.expire_at,
                 updated_at = excluded.updated_at
             RETURNING id",
            params![key, KeyType::String as i32, expire_at, self.now],
            |row| row.get(0),
        )?;

        self.conn.execute(
            "INSERT INTO strings (key_id, value) VALUES (?1, ?2)
             ON CONFLICT(key_id) DO UPDATE SET value = excluded.value",
            params![key_id, value],
        )?;
        Ok(())
    }
}
