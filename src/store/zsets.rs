use std::ops::Bound;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::RowScanner;
use crate::error::Result;
use crate::glob::GlobPattern;
use crate::types::ZMember;

/// Scored members of sorted-set keys, addressed by key id. Members are
/// ordered by (score, member bytes).
pub struct ZSetStore<'c> {
    conn: &'c Connection,
}

impl<'c> ZSetStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn score(&self, key_id: i64, member: &[u8]) -> Result<Option<f64>> {
        let score = self
            .conn
            .query_row(
                "SELECT score FROM zsets WHERE key_id = ?1 AND member = ?2",
                params![key_id, member],
                |row| row.get(0),
            )
            .optional()?;
        Ok(score)
    }

    pub fn put(&self, key_id: i64, member: &[u8], score: f64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO zsets (key_id, member, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(key_id, member) DO UPDATE SET score = excluded.score",
            params![key_id, member, score],
        )?;
        Ok(())
    }

    pub fn remove(&self, key_id: i64, member: &[u8]) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM zsets WHERE key_id = ?1 AND member = ?2",
            params![key_id, member],
        )?;
        Ok(n > 0)
    }

    pub fn len(&self, key_id: i64) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM zsets WHERE key_id = ?1",
            params![key_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Number of members ordered before (`score`, `member`).
    pub fn rank(&self, key_id: i64, score: f64, member: &[u8]) -> Result<i64> {
        // Count members with lower score, or same score but lexicographically smaller member
        let rank = self.conn.query_row(
            "SELECT COUNT(*) FROM zsets
             WHERE key_id = ?1 AND (score < ?2 OR (score = ?2 AND member < ?3))",
            params![key_id, score, member],
            |row| row.get(0),
        )?;
        Ok(rank)
    }

    /// `count` members starting at rank `offset` (count < 0: all remaining).
    pub fn range_by_rank(&self, key_id: i64, offset: i64, count: i64, rev: bool) -> Result<Vec<ZMember>> {
        let order = if rev { "DESC" } else { "ASC" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT member, score FROM zsets WHERE key_id = ?1
             ORDER BY score {0}, member {0} LIMIT ?2 OFFSET ?3",
            order
        ))?;
        let rows = stmt.query_map(params![key_id, count, offset], decode_member)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Members with a score inside `(min, max)`, skipping `offset` and
    /// returning at most `count` (count < 0: all).
    pub fn range_by_score(
        &self,
        key_id: i64,
        min: Bound<f64>,
        max: Bound<f64>,
        rev: bool,
        offset: i64,
        count: i64,
    ) -> Result<Vec<ZMember>> {
        let (filter, mut args) = score_filter(key_id, min, max);
        let order = if rev { "DESC" } else { "ASC" };
        args.push(SqlValue::Integer(count));
        args.push(SqlValue::Integer(offset));

        let mut stmt = self.conn.prepare(&format!(
            "SELECT member, score FROM zsets WHERE {1}
             ORDER BY score {0}, member {0} LIMIT ?{2} OFFSET ?{3}",
            order,
            filter,
            args.len() - 1,
            args.len()
        ))?;
        let rows = stmt.query_map(params_from_iter(args.iter()), decode_member)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn count_by_score(&self, key_id: i64, min: Bound<f64>, max: Bound<f64>) -> Result<i64> {
        let (filter, args) = score_filter(key_id, min, max);
        let n = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM zsets WHERE {}", filter),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// All members in (score, member) order.
    pub fn all(&self, key_id: i64) -> Result<Vec<ZMember>> {
        self.range_by_rank(key_id, 0, -1, false)
    }

    pub fn remove_by_rank(&self, key_id: i64, offset: i64, count: i64) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM zsets WHERE key_id = ?1 AND member IN (
                 SELECT member FROM zsets WHERE key_id = ?1
                 ORDER BY score ASC, member ASC LIMIT ?2 OFFSET ?3
             )",
            params![key_id, count, offset],
        )?;
        Ok(n)
    }

    pub fn remove_by_score(&self, key_id: i64, min: Bound<f64>, max: Bound<f64>) -> Result<usize> {
        let (filter, args) = score_filter(key_id, min, max);
        let n = self.conn.execute(
            &format!("DELETE FROM zsets WHERE {}", filter),
            params_from_iter(args.iter()),
        )?;
        Ok(n)
    }

    pub fn scan<T, F>(&self, key_id: i64, pattern: &GlobPattern, f: F) -> Result<T>
    where
        F: FnOnce(&mut RowScanner<'_, ZMember>) -> Result<T>,
    {
        let mut stmt = self
            .conn
            .prepare("SELECT member, score FROM zsets WHERE key_id = ?1 ORDER BY member")?;
        let rows = stmt.query(params![key_id])?;
        let mut scanner = RowScanner::new(rows, pattern, decode_member);
        f(&mut scanner)
    }
}

fn decode_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<ZMember> {
    Ok(ZMember {
        member: row.get(0)?,
        score: row.get(1)?,
    })
}

/// WHERE clause selecting the members of `key_id` inside the bounds, with
/// its positional arguments.
fn score_filter(key_id: i64, min: Bound<f64>, max: Bound<f64>) -> (String, Vec<SqlValue>) {
    let mut clause = String::from("key_id = ?1");
    let mut args = vec![SqlValue::Integer(key_id)];

    for (bound, incl, excl) in [(min, ">=", ">"), (max, "<=", "<")] {
        let (op, v) = match bound {
            Bound::Included(v) => (incl, v),
            Bound::Excluded(v) => (excl, v),
            Bound::Unbounded => continue,
        };
        args.push(SqlValue::Real(v));
        clause.push_str(&format!(" AND score {} ?{}", op, args.len()));
    }
    (clause, args)
}
