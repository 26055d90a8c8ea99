use super::{drop_if_empty, resolve_index, Provider};
use crate::commands::ListCommands;
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::result::{nil_if_none, Status};
use crate::store::Tx;
use crate::types::{KeyType, LInsertPosition, Value};
use crate::zset::rank_window;

#[derive(Clone, Copy)]
enum End {
    Head,
    Tail,
}

impl Provider {
    fn push(&self, ctx: &Context, key: &str, values: &[Value], end: End) -> Result<i64> {
        if values.is_empty() {
            return self.llen(ctx, key);
        }
        let key = self.key(key);
        let values: Vec<Vec<u8>> = values.iter().map(Value::to_bytes).collect();
        self.store.update(ctx, |tx| {
            let id = tx.keys().get_or_create(&key, KeyType::List)?;
            let lists = tx.lists();
            match end {
                End::Head => lists.push_front(id, &values)?,
                End::Tail => lists.push_back(id, &values)?,
            }
            tx.keys().touch(id)?;
            lists.len(id)
        })
    }

    /// Pops up to `count` elements; a missing key is `None`.
    fn pop(&self, ctx: &Context, key: &str, count: usize, end: End) -> Result<Option<Vec<Vec<u8>>>> {
        let key = self.key(key);
        self.store
            .update(ctx, |tx| pop_from(tx, &key, count, end))
    }
}

fn pop_from(tx: &Tx<'_>, key: &str, count: usize, end: End) -> Result<Option<Vec<Vec<u8>>>> {
    let id = match tx.keys().typed(key, KeyType::List)? {
        Some(id) => id,
        None => return Ok(None),
    };
    let lists = tx.lists();
    let values = match end {
        End::Head => lists.pop_front(id, count)?,
        End::Tail => lists.pop_back(id, count)?,
    };
    drop_if_empty(tx, id, lists.len(id)?)?;
    Ok(Some(values))
}

fn first(values: Option<Vec<Vec<u8>>>) -> Result<Vec<u8>> {
    nil_if_none(values.and_then(|v| v.into_iter().next()))
}

impl ListCommands for Provider {
    fn lindex(&self, ctx: &Context, key: &str, index: i64) -> Result<Vec<u8>> {
        let key = self.key(key);
        let value = self.store.view(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::List)? {
                Some(id) => id,
                None => return Ok(None),
            };
            let lists = tx.lists();
            match resolve_index(index, lists.len(id)?) {
                Some(i) => Ok(lists.at(id, i)?.map(|(_, value)| value)),
                None => Ok(None),
            }
        })?;
        nil_if_none(value)
    }

    fn linsert(
        &self,
        ctx: &Context,
        key: &str,
        position: LInsertPosition,
        pivot: Value,
        value: Value,
    ) -> Result<i64> {
        let key = self.key(key);
        let (pivot, value) = (pivot.into_bytes(), value.into_bytes());
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::List)? {
                Some(id) => id,
                None => return Ok(0),
            };
            let lists = tx.lists();
            let index = match lists.entries(id)?.iter().position(|(_, v)| *v == pivot) {
                Some(i) => i as i64,
                None => return Ok(-1),
            };
            let before = position == LInsertPosition::Before;
            lists.insert_near(id, index, before, &value)?;
            tx.keys().touch(id)?;
            lists.len(id)
        })
    }

    fn llen(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::List)? {
            Some(id) => tx.lists().len(id),
            None => Ok(0),
        })
    }

    fn lpop(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        first(self.pop(ctx, key, 1, End::Head)?)
    }

    fn lpop_count(&self, ctx: &Context, key: &str, count: usize) -> Result<Vec<Vec<u8>>> {
        nil_if_none(self.pop(ctx, key, count, End::Head)?)
    }

    fn lpush(&self, ctx: &Context, key: &str, values: &[Value]) -> Result<i64> {
        self.push(ctx, key, values, End::Head)
    }

    fn lrange(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let key = self.key(key);
        self.store.view(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::List)? {
                Some(id) => id,
                None => return Ok(Vec::new()),
            };
            let lists = tx.lists();
            match rank_window(start, stop, lists.len(id)?) {
                Some((offset, count)) => lists.range(id, offset, count),
                None => Ok(Vec::new()),
            }
        })
    }

    fn lrem(&self, ctx: &Context, key: &str, count: i64, value: Value) -> Result<i64> {
        let key = self.key(key);
        let value = value.into_bytes();
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::List)? {
                Some(id) => id,
                None => return Ok(0),
            };
            let lists = tx.lists();
            let mut entries = lists.entries(id)?;
            if count < 0 {
                entries.reverse();
            }
            let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };

            let mut removed = 0;
            for (pos, _) in entries.iter().filter(|(_, v)| *v == value).take(limit) {
                lists.remove(id, *pos)?;
                removed += 1;
            }
            drop_if_empty(tx, id, lists.len(id)?)?;
            Ok(removed)
        })
    }

    fn lset(&self, ctx: &Context, key: &str, index: i64, value: Value) -> Result<Status> {
        let key = self.key(key);
        let value = value.into_bytes();
        self.store.update(ctx, |tx| {
            let id = tx.keys().typed(&key, KeyType::List)?.ok_or(KvError::Nil)?;
            let lists = tx.lists();
            let i = resolve_index(index, lists.len(id)?).ok_or(KvError::OutOfRange)?;
            let (pos, _) = lists.at(id, i)?.ok_or(KvError::OutOfRange)?;
            lists.set(id, pos, &value)?;
            tx.keys().touch(id)
        })?;
        Ok(Status::Ok)
    }

    fn ltrim(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Status> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::List)? {
                Some(id) => id,
                None => return Ok(()),
            };
            let lists = tx.lists();
            match rank_window(start, stop, lists.len(id)?) {
                Some((offset, count)) => {
                    lists.retain(id, offset, count)?;
                    drop_if_empty(tx, id, lists.len(id)?)
                }
                None => tx.keys().delete_id(id),
            }
        })?;
        Ok(Status::Ok)
    }

    fn rpop(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        first(self.pop(ctx, key, 1, End::Tail)?)
    }

    fn rpop_count(&self, ctx: &Context, key: &str, count: usize) -> Result<Vec<Vec<u8>>> {
        nil_if_none(self.pop(ctx, key, count, End::Tail)?)
    }

    fn rpoplpush(&self, ctx: &Context, source: &str, destination: &str) -> Result<Vec<u8>> {
        let (src, dst) = (self.key(source), self.key(destination));
        let value = self.store.update(ctx, |tx| {
            let keys = tx.keys();
            let src_id = match keys.typed(&src, KeyType::List)? {
                Some(id) => id,
                None => return Ok(None),
            };
            // the destination must hold a list before anything moves
            keys.typed(&dst, KeyType::List)?;

            let lists = tx.lists();
            let value = match lists.pop_back(src_id, 1)?.into_iter().next() {
                Some(v) => v,
                None => return Ok(None),
            };
            let dst_id = keys.get_or_create(&dst, KeyType::List)?;
            lists.push_front(dst_id, std::slice::from_ref(&value))?;
            keys.touch(dst_id)?;
            drop_if_empty(tx, src_id, lists.len(src_id)?)?;
            Ok(Some(value))
        })?;
        nil_if_none(value)
    }

    fn rpush(&self, ctx: &Context, key: &str, values: &[Value]) -> Result<i64> {
        self.push(ctx, key, values, End::Tail)
    }
}
