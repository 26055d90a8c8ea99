use rusqlite::{params, Connection, OptionalExtension};

use super::RowScanner;
use crate::context::Context;
use crate::error::Result;
use crate::glob::GlobPattern;

const PICK_BATCH: u64 = 1024;

/// Members of set keys, addressed by key id.
pub struct SetStore<'c> {
    conn: &'c Connection,
}

impl<'c> SetStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Returns true when the member was not already present.
    pub fn add(&self, key_id: i64, member: &[u8]) -> Result<bool> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO sets (key_id, member) VALUES (?1, ?2)",
            params![key_id, member],
        )?;
        Ok(n > 0)
    }

    pub fn remove(&self, key_id: i64, member: &[u8]) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM sets WHERE key_id = ?1 AND member = ?2",
            params![key_id, member],
        )?;
        Ok(n > 0)
    }

    pub fn contains(&self, key_id: i64, member: &[u8]) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sets WHERE key_id = ?1 AND member = ?2",
                params![key_id, member],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn len(&self, key_id: i64) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM sets WHERE key_id = ?1",
            params![key_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// All members in byte order.
    pub fn members(&self, key_id: i64) -> Result<Vec<Vec<u8>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT member FROM sets WHERE key_id = ?1 ORDER BY member")?;
        let rows = stmt.query_map(params![key_id], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Up to `count` distinct members picked at random.
    pub fn random(&self, key_id: i64, count: usize) -> Result<Vec<Vec<u8>>> {
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let mut stmt = self
            .conn
            .prepare("SELECT member FROM sets WHERE key_id = ?1 ORDER BY RANDOM() LIMIT ?2")?;
        let rows = stmt.query_map(params![key_id, limit], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// `count` independent random picks; the same member may come back
    /// more than once. Members are read once and indexes are drawn from
    /// SQLite's PRNG in batches, checking `ctx` between batches.
    pub fn random_with_repeats(&self, ctx: &Context, key_id: i64, count: u64) -> Result<Vec<Vec<u8>>> {
        let members = self.members(key_id)?;
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE picks(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM picks WHERE i < ?1)
             SELECT abs(random() % ?2) FROM picks",
        )?;
        let len = members.len() as i64;

        let mut results = Vec::new();
        let mut remaining = count;
        while remaining > 0 {
            ctx.check()?;
            let batch = remaining.min(PICK_BATCH);
            let rows = stmt.query_map(params![batch as i64, len], |row| row.get::<_, i64>(0))?;
            for idx in rows {
                if let Some(member) = members.get(idx? as usize) {
                    results.push(member.clone());
                }
            }
            remaining -= batch;
        }
        Ok(results)
    }

    pub fn scan<T, F>(&self, key_id: i64, pattern: &GlobPattern, f: F) -> Result<T>
    where
        F: FnOnce(&mut RowScanner<'_, Vec<u8>>) -> Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare("SELECT member FROM sets WHERE key_id = ?1 ORDER BY member")?;
        let rows = stmt.query(params![key_id])?;
        let mut scanner = RowScanner::new(rows, pattern, |row| row.get(0));
        f(&mut scanner)
    }
}

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::store::Store;
    use crate::types::KeyType;

    #[test]
    fn test_add_remove_contains() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| {
                let id = tx.keys().get_or_create("s", KeyType::Set)?;
                let s = tx.sets();
                assert!(s.add(id, b"b")?);
                assert!(s.add(id, b"a")?);
                assert!(!s.add(id, b"a")?);
                assert!(s.contains(id, b"a")?);
                assert_eq!(s.members(id)?, vec![b"a".to_vec(), b"b".to_vec()]);
                assert_eq!(s.random(id, 5)?.len(), 2);
                assert_eq!(s.random_with_repeats(&ctx, id, 5)?.len(), 5);
                assert!(s.remove(id, b"a")?);
                assert!(!s.contains(id, b"a")?);
                assert_eq!(s.len(id)?, 1);
                Ok(())
            })
            .unwrap();
    }
}
