use rusqlite::{params, Connection, OptionalExtension};

use super::RowScanner;
use crate::error::Result;
use crate::glob::GlobPattern;

/// Field/value pairs of hash keys, addressed by key id.
pub struct HashStore<'c> {
    conn: &'c Connection,
}

impl<'c> HashStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key_id: i64, field: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM hashes WHERE key_id = ?1 AND field = ?2",
                params![key_id, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn exists(&self, key_id: i64, field: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM hashes WHERE key_id = ?1 AND field = ?2",
                params![key_id, field],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Sets a field. Returns true when the field is new.
    pub fn set(&self, key_id: i64, field: &str, value: &[u8]) -> Result<bool> {
        let existed = self.exists(key_id, field)?;
        self.conn.execute(
            "INSERT INTO hashes (key_id, field, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(key_id, field) DO UPDATE SET value = excluded.value",
            params![key_id, field, value],
        )?;
        Ok(!existed)
    }

    /// Sets a field only when it is absent.
    pub fn set_nx(&self, key_id: i64, field: &str, value: &[u8]) -> Result<bool> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO hashes (key_id, field, value) VALUES (?1, ?2, ?3)",
            params![key_id, field, value],
        )?;
        Ok(n > 0)
    }

    pub fn delete(&self, key_id: i64, field: &str) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM hashes WHERE key_id = ?1 AND field = ?2",
            params![key_id, field],
        )?;
        Ok(n > 0)
    }

    pub fn len(&self, key_id: i64) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM hashes WHERE key_id = ?1",
            params![key_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// All pairs in field order.
    pub fn all(&self, key_id: i64) -> Result<Vec<(String, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM hashes WHERE key_id = ?1 ORDER BY field")?;
        let rows = stmt.query_map(params![key_id], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn scan<T, F>(&self, key_id: i64, pattern: &GlobPattern, f: F) -> Result<T>
    where
        F: FnOnce(&mut RowScanner<'_, (String, Vec<u8>)>) -> Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM hashes WHERE key_id = ?1 ORDER BY field")?;
        let rows = stmt.query(params![key_id])?;
        let mut scanner = RowScanner::new(rows, pattern, |row| Ok((row.get(0)?, row.get(1)?)));
        f(&mut scanner)
    }
}
