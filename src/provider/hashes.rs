use std::collections::HashMap;

use super::{drop_if_empty, parse_float, parse_int, Provider};
use crate::commands::HashCommands;
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::glob::GlobPattern;
use crate::result::{nil_if_none, Status};
use crate::scan;
use crate::types::{format_float, HScanPage, KeyType, Value};

impl HashCommands for Provider {
    fn hdel(&self, ctx: &Context, key: &str, fields: &[&str]) -> Result<i64> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::Hash)? {
                Some(id) => id,
                None => return Ok(0),
            };
            let hashes = tx.hashes();
            let mut deleted = 0;
            for field in fields {
                if hashes.delete(id, field)? {
                    deleted += 1;
                }
            }
            drop_if_empty(tx, id, hashes.len(id)?)?;
            Ok(deleted)
        })
    }

    fn hexists(&self, ctx: &Context, key: &str, field: &str) -> Result<bool> {
        let key = self.key(key);
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Hash)? {
            Some(id) => tx.hashes().exists(id, field),
            None => Ok(false),
        })
    }

    fn hget(&self, ctx: &Context, key: &str, field: &str) -> Result<Vec<u8>> {
        let key = self.key(key);
        let value = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Hash)? {
            Some(id) => tx.hashes().get(id, field),
            None => Ok(None),
        })?;
        nil_if_none(value)
    }

    fn hget_all(&self, ctx: &Context, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        let key = self.key(key);
        let pairs = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Hash)? {
            Some(id) => tx.hashes().all(id),
            None => Ok(Vec::new()),
        })?;
        Ok(pairs.into_iter().collect())
    }

    fn hincr_by(&self, ctx: &Context, key: &str, field: &str, increment: i64) -> Result<i64> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = tx.keys().get_or_create(&key, KeyType::Hash)?;
            let hashes = tx.hashes();
            let current = match hashes.get(id, field)? {
                Some(v) => parse_int(&v)?,
                None => 0,
            };
            let next = current
                .checked_add(increment)
                .ok_or_else(|| KvError::invalid("increment or decrement would overflow"))?;
            hashes.set(id, field, next.to_string().as_bytes())?;
            tx.keys().touch(id)?;
            Ok(next)
        })
    }

    fn hincr_by_float(&self, ctx: &Context, key: &str, field: &str, increment: f64) -> Result<f64> {
        if !increment.is_finite() {
            return Err(KvError::NotFloat);
        }
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = tx.keys().get_or_create(&key, KeyType::Hash)?;
            let hashes = tx.hashes();
            let current = match hashes.get(id, field)? {
                Some(v) => parse_float(&v)?,
                None => 0.0,
            };
            let next = current + increment;
            if !next.is_finite() {
                return Err(KvError::invalid("increment would produce NaN or Infinity"));
            }
            hashes.set(id, field, format_float(next).as_bytes())?;
            tx.keys().touch(id)?;
            Ok(next)
        })
    }

    fn hkeys(&self, ctx: &Context, key: &str) -> Result<Vec<String>> {
        let key = self.key(key);
        let pairs = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Hash)? {
            Some(id) => tx.hashes().all(id),
            None => Ok(Vec::new()),
        })?;
        Ok(pairs.into_iter().map(|(field, _)| field).collect())
    }

    fn hlen(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Hash)? {
            Some(id) => tx.hashes().len(id),
            None => Ok(0),
        })
    }

    fn hmget(&self, ctx: &Context, key: &str, fields: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        let key = self.key(key);
        self.store.view(ctx, |tx| {
            let mut values = HashMap::new();
            let id = match tx.keys().typed(&key, KeyType::Hash)? {
                Some(id) => id,
                None => return Ok(values),
            };
            let hashes = tx.hashes();
            for field in fields {
                if let Some(v) = hashes.get(id, field)? {
                    values.insert(field.to_string(), v);
                }
            }
            Ok(values)
        })
    }

    fn hmset(&self, ctx: &Context, key: &str, pairs: &[(&str, Value)]) -> Result<Status> {
        self.hset(ctx, key, pairs)?;
        Ok(Status::Ok)
    }

    fn hscan(&self, ctx: &Context, key: &str, cursor: u64, pattern: &str, count: i64) -> Result<HScanPage> {
        let key = self.key(key);
        let pattern = GlobPattern::new(pattern);
        let window = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Hash)? {
            Some(id) => tx
                .hashes()
                .scan(id, &pattern, |s| scan::window(ctx, s, cursor, count))
                .map(Some),
            None => Ok(None),
        })?;
        Ok(match window {
            Some(w) => HScanPage {
                cursor: w.cursor,
                fields: w.items,
            },
            None => HScanPage::default(),
        })
    }

    fn hset(&self, ctx: &Context, key: &str, pairs: &[(&str, Value)]) -> Result<i64> {
        if pairs.is_empty() {
            return Ok(0);
        }
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = tx.keys().get_or_create(&key, KeyType::Hash)?;
            let hashes = tx.hashes();
            let mut added = 0;
            for (field, value) in pairs {
                if hashes.set(id, field, &value.to_bytes())? {
                    added += 1;
                }
            }
            tx.keys().touch(id)?;
            Ok(added)
        })
    }

    fn hset_nx(&self, ctx: &Context, key: &str, field: &str, value: Value) -> Result<bool> {
        let key = self.key(key);
        let value = value.into_bytes();
        self.store.update(ctx, |tx| {
            let id = tx.keys().get_or_create(&key, KeyType::Hash)?;
            let added = tx.hashes().set_nx(id, field, &value)?;
            if added {
                tx.keys().touch(id)?;
            }
            Ok(added)
        })
    }

    fn hvals(&self, ctx: &Context, key: &str) -> Result<Vec<Vec<u8>>> {
        let key = self.key(key);
        let pairs = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Hash)? {
            Some(id) => tx.hashes().all(id),
            None => Ok(Vec::new()),
        })?;
        Ok(pairs.into_iter().map(|(_, value)| value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{KeyCommands, StringCommands};
    use crate::types::Expiry;

    fn setup() -> (Provider, Context) {
        (Provider::open_memory().unwrap(), Context::background())
    }

    #[test]
    fn test_hset_hget() {
        let (p, ctx) = setup();
        assert_eq!(
            p.hset(&ctx, "h", &[("name", "alice".into()), ("age", Value::Int(30))]).unwrap(),
            2
        );
        assert_eq!(p.hset(&ctx, "h", &[("name", "bob".into())]).unwrap(), 0);
        assert_eq!(p.hget(&ctx, "h", "name").unwrap(), b"bob".to_vec());
        assert_eq!(p.hget(&ctx, "h", "age").unwrap(), b"30".to_vec());
        assert!(p.hget(&ctx, "h", "missing").unwrap_err().is_nil());
        assert!(p.hget(&ctx, "nokey", "f").unwrap_err().is_nil());
        assert_eq!(p.hlen(&ctx, "h").unwrap(), 2);
    }

    #[test]
    fn test_hset_without_pairs_creates_nothing() {
        let (p, ctx) = setup();
        assert_eq!(p.hset(&ctx, "h", &[]).unwrap(), 0);
        assert_eq!(p.exists(&ctx, &["h"]).unwrap(), 0);
    }

    #[test]
    fn test_hdel_drops_empty_hash() {
        let (p, ctx) = setup();
        p.hset(&ctx, "h", &[("a", "1".into()), ("b", "2".into())]).unwrap();
        assert_eq!(p.hdel(&ctx, "h", &["a", "zz"]).unwrap(), 1);
        assert_eq!(p.exists(&ctx, &["h"]).unwrap(), 1);
        assert_eq!(p.hdel(&ctx, "h", &["b"]).unwrap(), 1);
        assert_eq!(p.exists(&ctx, &["h"]).unwrap(), 0);
        assert_eq!(p.hdel(&ctx, "h", &["b"]).unwrap(), 0);
    }

    #[test]
    fn test_hget_all_keys_vals() {
        let (p, ctx) = setup();
        p.hmset(&ctx, "h", &[("b", "2".into()), ("a", "1".into())]).unwrap();
        let all = p.hget_all(&ctx, "h").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], b"1".to_vec());
        assert_eq!(p.hkeys(&ctx, "h").unwrap(), vec!["a", "b"]);
        assert_eq!(p.hvals(&ctx, "h").unwrap(), vec![b"1".to_vec(), b"2".to_vec()]);
        assert!(p.hget_all(&ctx, "missing").unwrap().is_empty());

        let some = p.hmget(&ctx, "h", &["a", "c"]).unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some["a"], b"1".to_vec());
    }

    #[test]
    fn test_hincr() {
        let (p, ctx) = setup();
        assert_eq!(p.hincr_by(&ctx, "h", "n", 5).unwrap(), 5);
        assert_eq!(p.hincr_by(&ctx, "h", "n", -7).unwrap(), -2);
        assert_eq!(p.hincr_by_float(&ctx, "h", "f", 0.5).unwrap(), 0.5);
        assert_eq!(p.hincr_by_float(&ctx, "h", "n", 0.5).unwrap(), -1.5);
        p.hset(&ctx, "h", &[("s", "abc".into())]).unwrap();
        assert!(matches!(p.hincr_by(&ctx, "h", "s", 1), Err(KvError::NotInteger)));
        assert!(matches!(p.hincr_by_float(&ctx, "h", "s", 1.0), Err(KvError::NotFloat)));
    }

    #[test]
    fn test_hset_nx() {
        let (p, ctx) = setup();
        assert!(p.hset_nx(&ctx, "h", "f", "1".into()).unwrap());
        assert!(!p.hset_nx(&ctx, "h", "f", "2".into()).unwrap());
        assert_eq!(p.hget(&ctx, "h", "f").unwrap(), b"1".to_vec());
        assert!(p.hexists(&ctx, "h", "f").unwrap());
        assert!(!p.hexists(&ctx, "h", "g").unwrap());
    }

    #[test]
    fn test_wrong_type() {
        let (p, ctx) = setup();
        p.set(&ctx, "s", "v".into(), Expiry::Never).unwrap();
        assert!(matches!(p.hget(&ctx, "s", "f"), Err(KvError::WrongType)));
        assert!(matches!(
            p.hset(&ctx, "s", &[("f", "v".into())]),
            Err(KvError::WrongType)
        ));
    }

    #[test]
    fn test_hscan_pages() {
        let (p, ctx) = setup();
        let pairs: Vec<(String, Value)> = (0..15)
            .map(|i| (format!("f{:02}", i), Value::Int(i)))
            .collect();
        let refs: Vec<(&str, Value)> = pairs.iter().map(|(f, v)| (f.as_str(), v.clone())).collect();
        p.hset(&ctx, "h", &refs).unwrap();

        let first = p.hscan(&ctx, "h", 0, "*", 10).unwrap();
        assert_eq!(first.fields.len(), 10);
        assert_eq!(first.cursor, 10);
        let rest = p.hscan(&ctx, "h", first.cursor, "*", 10).unwrap();
        assert_eq!(rest.fields.len(), 5);
        assert_eq!(rest.cursor, 0);

        let filtered = p.hscan(&ctx, "h", 0, "f1*", 0).unwrap();
        assert_eq!(filtered.fields.len(), 5);
        assert_eq!(filtered.fields[0], ("f10".to_string(), b"10".to_vec()));

        let missing = p.hscan(&ctx, "nokey", 0, "*", 10).unwrap();
        assert!(missing.fields.is_empty());
        assert_eq!(missing.cursor, 0);
    }
}
