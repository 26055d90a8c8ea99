use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Gap between neighbouring positions, leaving room for inserts.
const LIST_GAP: i64 = 1_000_000;
const LIST_POS_MIN_THRESHOLD: i64 = i64::MIN / 4;
const LIST_POS_MAX_THRESHOLD: i64 = i64::MAX / 4;

/// List elements, addressed by key id. Each element has a sparse integer
/// position; logical indexes are ranks in position order.
pub struct ListStore<'c> {
    conn: &'c Connection,
}

impl<'c> ListStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn len(&self, key_id: i64) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM lists WHERE key_id = ?1",
            params![key_id],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// `count` elements starting at logical index `offset`.
    pub fn range(&self, key_id: i64, offset: i64, count: i64) -> Result<Vec<Vec<u8>>> {
        let mut stmt = self.conn.prepare(
            "SELECT value FROM lists WHERE key_id = ?1 ORDER BY pos ASC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![key_id, count, offset], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Every element with its position, head first.
    pub fn entries(&self, key_id: i64) -> Result<Vec<(i64, Vec<u8>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT pos, value FROM lists WHERE key_id = ?1 ORDER BY pos ASC")?;
        let rows = stmt.query_map(params![key_id], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Position and value of the element at logical index `index`.
    pub fn at(&self, key_id: i64, index: i64) -> Result<Option<(i64, Vec<u8>)>> {
        let entry = self
            .conn
            .query_row(
                "SELECT pos, value FROM lists WHERE key_id = ?1 ORDER BY pos ASC LIMIT 1 OFFSET ?2",
                params![key_id, index],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(entry)
    }

    /// Prepends `values` one by one, so the last value ends up at the head.
    pub fn push_front(&self, key_id: i64, values: &[Vec<u8>]) -> Result<()> {
        let mut min_pos = self.min_pos(key_id)?.unwrap_or(LIST_GAP);

        // Check if we would overflow - rebalance if needed
        let new_min = min_pos.saturating_sub((values.len() as i64) * LIST_GAP);
        if new_min < LIST_POS_MIN_THRESHOLD {
            self.rebalance(key_id)?;
            min_pos = self.min_pos(key_id)?.unwrap_or(LIST_GAP);
        }

        for (i, value) in values.iter().enumerate() {
            let pos = min_pos - ((i as i64 + 1) * LIST_GAP);
            self.insert(key_id, pos, value)?;
        }
        Ok(())
    }

    /// Appends `values` in order.
    pub fn push_back(&self, key_id: i64, values: &[Vec<u8>]) -> Result<()> {
        let mut max_pos = self.max_pos(key_id)?.unwrap_or(0);

        let new_max = max_pos.saturating_add((values.len() as i64) * LIST_GAP);
        if new_max > LIST_POS_MAX_THRESHOLD {
            self.rebalance(key_id)?;
            max_pos = self.max_pos(key_id)?.unwrap_or(0);
        }

        for (i, value) in values.iter().enumerate() {
            let pos = max_pos + ((i as i64 + 1) * LIST_GAP);
            self.insert(key_id, pos, value)?;
        }
        Ok(())
    }

    /// Removes and returns up to `count` elements from the head.
    pub fn pop_front(&self, key_id: i64, count: usize) -> Result<Vec<Vec<u8>>> {
        self.pop(key_id, count, "ASC")
    }

    /// Removes and returns up to `count` elements from the tail, tail first.
    pub fn pop_back(&self, key_id: i64, count: usize) -> Result<Vec<Vec<u8>>> {
        self.pop(key_id, count, "DESC")
    }

    fn pop(&self, key_id: i64, count: usize, order: &str) -> Result<Vec<Vec<u8>>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT pos, value FROM lists WHERE key_id = ?1 ORDER BY pos {} LIMIT ?2",
            order
        ))?;
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![key_id, limit], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let mut popped = Vec::new();
        for row in rows {
            popped.push(row?);
        }

        let mut values = Vec::with_capacity(popped.len());
        for (pos, value) in popped {
            self.remove(key_id, pos)?;
            values.push(value);
        }
        Ok(values)
    }

    pub fn set(&self, key_id: i64, pos: i64, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "UPDATE lists SET value = ?1 WHERE key_id = ?2 AND pos = ?3",
            params![value, key_id, pos],
        )?;
        Ok(())
    }

    pub fn remove(&self, key_id: i64, pos: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM lists WHERE key_id = ?1 AND pos = ?2",
            params![key_id, pos],
        )?;
        Ok(())
    }

    /// Inserts `value` next to the element at logical index `index`.
    pub fn insert_near(&self, key_id: i64, index: i64, before: bool, value: &[u8]) -> Result<()> {
        for attempt in 0..2 {
            let pivot = match self.at(key_id, index)? {
                Some((pos, _)) => pos,
                None => return Ok(()),
            };
            let neighbour = if before {
                self.conn
                    .query_row(
                        "SELECT MAX(pos) FROM lists WHERE key_id = ?1 AND pos < ?2",
                        params![key_id, pivot],
                        |row| row.get::<_, Option<i64>>(0),
                    )?
                    .unwrap_or(pivot.saturating_sub(2 * LIST_GAP))
            } else {
                self.conn
                    .query_row(
                        "SELECT MIN(pos) FROM lists WHERE key_id = ?1 AND pos > ?2",
                        params![key_id, pivot],
                        |row| row.get::<_, Option<i64>>(0),
                    )?
                    .unwrap_or(pivot.saturating_add(2 * LIST_GAP))
            };

            if (neighbour - pivot).abs() >= 2 {
                let pos = pivot + (neighbour - pivot) / 2;
                return self.insert(key_id, pos, value);
            }
            if attempt == 0 {
                self.rebalance(key_id)?;
            }
        }
        // rebalanced positions are always LIST_GAP apart
        Ok(())
    }

    /// Keeps `count` elements starting at logical index `offset`.
    pub fn retain(&self, key_id: i64, offset: i64, count: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM lists WHERE key_id = ?1 AND pos NOT IN (
                 SELECT pos FROM lists WHERE key_id = ?1 ORDER BY pos ASC LIMIT ?2 OFFSET ?3
             )",
            params![key_id, count, offset],
        )?;
        Ok(())
    }

    fn insert(&self, key_id: i64, pos: i64, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO lists (key_id, pos, value) VALUES (?1, ?2, ?3)",
            params![key_id, pos, value],
        )?;
        Ok(())
    }

    fn min_pos(&self, key_id: i64) -> Result<Option<i64>> {
        let pos = self.conn.query_row(
            "SELECT MIN(pos) FROM lists WHERE key_id = ?1",
            params![key_id],
            |row| row.get(0),
        )?;
        Ok(pos)
    }

    fn max_pos(&self, key_id: i64) -> Result<Option<i64>> {
        let pos = self.conn.query_row(
            "SELECT MAX(pos) FROM lists WHERE key_id = ?1",
            params![key_id],
            |row| row.get(0),
        )?;
        Ok(pos)
    }

    /// Respaces every element LIST_GAP apart, keeping order.
    fn rebalance(&self, key_id: i64) -> Result<()> {
        let items = self.entries(key_id)?;
        if items.is_empty() {
            return Ok(());
        }
        tracing::debug!(key_id, len = items.len(), "rebalancing list positions");

        self.conn
            .execute("DELETE FROM lists WHERE key_id = ?1", params![key_id])?;

        // Reinsert with fresh positions starting from LIST_GAP
        for (i, (_, value)) in items.iter().enumerate() {
            let new_pos = ((i as i64) + 1) * LIST_GAP;
            self.insert(key_id, new_pos, value)?;
        }
        Ok(())
    }
}
