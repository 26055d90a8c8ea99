use std::collections::BTreeSet;

use super::{drop_if_empty, Provider};
use crate::commands::SetCommands;
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::glob::GlobPattern;
use crate::result::nil_if_none;
use crate::scan;
use crate::store::Tx;
use crate::types::{KeyType, ScanPage, Value};

type Members = BTreeSet<Vec<u8>>;

/// Largest SRANDMEMBER count accepted in either direction.
const MAX_RANDOM_COUNT: i64 = i64::MAX / 2;

#[derive(Clone, Copy)]
enum Combine {
    Diff,
    Inter,
    Union,
}

/// Members of a set key, or `None` when it does not exist.
fn members_of(tx: &Tx<'_>, key: &str) -> Result<Option<Members>> {
    match tx.keys().typed(key, KeyType::Set)? {
        Some(id) => Ok(Some(tx.sets().members(id)?.into_iter().collect())),
        None => Ok(None),
    }
}

fn combine(tx: &Tx<'_>, keys: &[String], op: Combine) -> Result<Members> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(members_of(tx, key)?);
    }
    let mut sets = sets.into_iter();
    let first = match sets.next() {
        Some(first) => first.unwrap_or_default(),
        None => return Ok(Members::new()),
    };

    let result = match op {
        Combine::Diff => sets.flatten().fold(first, |acc, other| {
            acc.difference(&other).cloned().collect()
        }),
        Combine::Union => sets.flatten().fold(first, |mut acc, other| {
            acc.extend(other);
            acc
        }),
        Combine::Inter => {
            let mut acc = first;
            for other in sets {
                // a missing key empties the intersection
                let other = other.unwrap_or_default();
                acc = acc.intersection(&other).cloned().collect();
            }
            acc
        }
    };
    Ok(result)
}

impl Provider {
    fn set_combine(&self, ctx: &Context, keys: &[&str], op: Combine) -> Result<Vec<Vec<u8>>> {
        let keys = self.prefix.apply_all(keys);
        let members = self.store.view(ctx, |tx| combine(tx, &keys, op))?;
        Ok(members.into_iter().collect())
    }

    fn set_combine_store(&self, ctx: &Context, destination: &str, keys: &[&str], op: Combine) -> Result<i64> {
        let keys = self.prefix.apply_all(keys);
        let dest = self.key(destination);
        self.store.update(ctx, |tx| {
            let members = combine(tx, &keys, op)?;
            if members.is_empty() {
                tx.keys().delete(&dest)?;
                return Ok(0);
            }
            let id = tx.keys().create(&dest, KeyType::Set, None)?;
            let sets = tx.sets();
            for member in &members {
                sets.add(id, member)?;
            }
            Ok(members.len() as i64)
        })
    }
}

impl SetCommands for Provider {
    fn sadd(&self, ctx: &Context, key: &str, members: &[Value]) -> Result<i64> {
        if members.is_empty() {
            return Ok(0);
        }
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = tx.keys().get_or_create(&key, KeyType::Set)?;
            let sets = tx.sets();
            let mut added = 0;
            for member in members {
                if sets.add(id, &member.to_bytes())? {
                    added += 1;
                }
            }
            tx.keys().touch(id)?;
            Ok(added)
        })
    }

    fn scard(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Set)? {
            Some(id) => tx.sets().len(id),
            None => Ok(0),
        })
    }

    fn sdiff(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>> {
        self.set_combine(ctx, keys, Combine::Diff)
    }

    fn sdiff_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64> {
        self.set_combine_store(ctx, destination, keys, Combine::Diff)
    }

    fn sinter(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>> {
        self.set_combine(ctx, keys, Combine::Inter)
    }

    fn sinter_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64> {
        self.set_combine_store(ctx, destination, keys, Combine::Inter)
    }

    fn sismember(&self, ctx: &Context, key: &str, member: Value) -> Result<bool> {
        let key = self.key(key);
        let member = member.into_bytes();
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Set)? {
            Some(id) => tx.sets().contains(id, &member),
            None => Ok(false),
        })
    }

    fn smembers(&self, ctx: &Context, key: &str) -> Result<Vec<Vec<u8>>> {
        let key = self.key(key);
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Set)? {
            Some(id) => tx.sets().members(id),
            None => Ok(Vec::new()),
        })
    }

    fn smove(&self, ctx: &Context, source: &str, destination: &str, member: Value) -> Result<bool> {
        let (src, dst) = (self.key(source), self.key(destination));
        let member = member.into_bytes();
        self.store.update(ctx, |tx| {
            let keys = tx.keys();
            let src_id = match keys.typed(&src, KeyType::Set)? {
                Some(id) => id,
                None => return Ok(false),
            };
            keys.typed(&dst, KeyType::Set)?;

            let sets = tx.sets();
            if !sets.contains(src_id, &member)? {
                return Ok(false);
            }
            if src == dst {
                return Ok(true);
            }
            sets.remove(src_id, &member)?;
            let dst_id = keys.get_or_create(&dst, KeyType::Set)?;
            sets.add(dst_id, &member)?;
            keys.touch(dst_id)?;
            drop_if_empty(tx, src_id, sets.len(src_id)?)?;
            Ok(true)
        })
    }

    fn spop(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        let popped = self.spop_n(ctx, key, 1)?;
        nil_if_none(popped.into_iter().next())
    }

    fn spop_n(&self, ctx: &Context, key: &str, count: usize) -> Result<Vec<Vec<u8>>> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::Set)? {
                Some(id) => id,
                None => return Ok(Vec::new()),
            };
            let sets = tx.sets();
            let popped = sets.random(id, count)?;
            for member in &popped {
                sets.remove(id, member)?;
            }
            drop_if_empty(tx, id, sets.len(id)?)?;
            Ok(popped)
        })
    }

    fn srandmember(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        let picked = self.srandmember_n(ctx, key, 1)?;
        nil_if_none(picked.into_iter().next())
    }

    fn srandmember_n(&self, ctx: &Context, key: &str, count: i64) -> Result<Vec<Vec<u8>>> {
        if !(-MAX_RANDOM_COUNT..=MAX_RANDOM_COUNT).contains(&count) {
            return Err(KvError::invalid("value is out of range"));
        }
        let key = self.key(key);
        self.store.view(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::Set)? {
                Some(id) => id,
                None => return Ok(Vec::new()),
            };
            if count < 0 {
                tx.sets().random_with_repeats(ctx, id, count.unsigned_abs())
            } else {
                tx.sets().random(id, usize::try_from(count).unwrap_or(usize::MAX))
            }
        })
    }

    fn srem(&self, ctx: &Context, key: &str, members: &[Value]) -> Result<i64> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::Set)? {
                Some(id) => id,
                None => return Ok(0),
            };
            let sets = tx.sets();
            let mut removed = 0;
            for member in members {
                if sets.remove(id, &member.to_bytes())? {
                    removed += 1;
                }
            }
            drop_if_empty(tx, id, sets.len(id)?)?;
            Ok(removed)
        })
    }

    fn sscan(&self, ctx: &Context, key: &str, cursor: u64, pattern: &str, count: i64) -> Result<ScanPage> {
        let key = self.key(key);
        let pattern = GlobPattern::new(pattern);
        let window = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::Set)? {
            Some(id) => tx
                .sets()
                .scan(id, &pattern, |s| scan::window(ctx, s, cursor, count))
                .map(Some),
            None => Ok(None),
        })?;
        Ok(match window {
            Some(w) => ScanPage {
                cursor: w.cursor,
                elements: w.items,
            },
            None => ScanPage::default(),
        })
    }

    fn sunion(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>> {
        self.set_combine(ctx, keys, Combine::Union)
    }

    fn sunion_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64> {
        self.set_combine_store(ctx, destination, keys, Combine::Union)
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

    fn vals(items: &[&str]) -> Vec<Vec<u8>> {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn values(items: &[&str]) -> Vec<Value> {
        items.iter().map(|s| Value::from(*s)).collect()
    }

    #[test]
    fn test_sadd_srem() {
        let (p, ctx) = setup();
        assert_eq!(p.sadd(&ctx, "s", &values(&["a", "b", "a"])).unwrap(), 2);
        assert_eq!(p.sadd(&ctx, "s", &values(&["b", "c"])).unwrap(), 1);
        assert_eq!(p.scard(&ctx, "s").unwrap(), 3);
        assert_eq!(p.smembers(&ctx, "s").unwrap(), vals(&["a", "b", "c"]));
        assert!(p.sismember(&ctx, "s", "a".into()).unwrap());
        assert!(!p.sismember(&ctx, "s", "z".into()).unwrap());
        assert_eq!(p.srem(&ctx, "s", &values(&["a", "b", "c", "z"])).unwrap(), 3);
        assert_eq!(p.exists(&ctx, &["s"]).unwrap(), 0);
        assert_eq!(p.sadd(&ctx, "empty", &[]).unwrap(), 0);
        assert_eq!(p.exists(&ctx, &["empty"]).unwrap(), 0);
    }

    #[test]
    fn test_set_algebra() {
        let (p, ctx) = setup();
        p.sadd(&ctx, "a", &values(&["1", "2", "3"])).unwrap();
        p.sadd(&ctx, "b", &values(&["2", "3", "4"])).unwrap();
        p.sadd(&ctx, "c", &values(&["3", "5"])).unwrap();

        assert_eq!(p.sinter(&ctx, &["a", "b", "c"]).unwrap(), vals(&["3"]));
        assert_eq!(p.sdiff(&ctx, &["a", "b"]).unwrap(), vals(&["1"]));
        assert_eq!(p.sdiff(&ctx, &["a", "missing"]).unwrap(), vals(&["1", "2", "3"]));
        assert_eq!(
            p.sunion(&ctx, &["a", "c", "missing"]).unwrap(),
            vals(&["1", "2", "3", "5"])
        );
        assert!(p.sinter(&ctx, &["a", "missing"]).unwrap().is_empty());
    }

    #[test]
    fn test_store_variants() {
        let (p, ctx) = setup();
        p.sadd(&ctx, "a", &values(&["1", "2"])).unwrap();
        p.sadd(&ctx, "b", &values(&["2", "3"])).unwrap();
        p.set(&ctx, "dest", "overwritten".into(), Expiry::Never).unwrap();

        assert_eq!(p.sunion_store(&ctx, "dest", &["a", "b"]).unwrap(), 3);
        assert_eq!(p.key_type(&ctx, "dest").unwrap(), "set");
        assert_eq!(p.sinter_store(&ctx, "dest", &["a", "b"]).unwrap(), 1);
        assert_eq!(p.smembers(&ctx, "dest").unwrap(), vals(&["2"]));
        assert_eq!(p.sdiff_store(&ctx, "dest", &["a", "a"]).unwrap(), 0);
        assert_eq!(p.exists(&ctx, &["dest"]).unwrap(), 0);
    }

    #[test]
    fn test_smove() {
        let (p, ctx) = setup();
        p.sadd(&ctx, "src", &values(&["a"])).unwrap();
        assert!(!p.smove(&ctx, "src", "dst", "z".into()).unwrap());
        assert!(p.smove(&ctx, "src", "src", "a".into()).unwrap());
        assert!(p.smove(&ctx, "src", "dst", "a".into()).unwrap());
        assert_eq!(p.exists(&ctx, &["src"]).unwrap(), 0);
        assert_eq!(p.smembers(&ctx, "dst").unwrap(), vals(&["a"]));
        assert!(!p.smove(&ctx, "missing", "dst", "a".into()).unwrap());

        p.set(&ctx, "str", "v".into(), Expiry::Never).unwrap();
        assert!(matches!(
            p.smove(&ctx, "dst", "str", "a".into()),
            Err(KvError::WrongType)
        ));
    }

    #[test]
    fn test_spop_srandmember() {
        let (p, ctx) = setup();
        p.sadd(&ctx, "s", &values(&["a", "b", "c"])).unwrap();
        assert_eq!(p.srandmember_n(&ctx, "s", 10).unwrap().len(), 3);
        assert_eq!(p.srandmember_n(&ctx, "s", -10).unwrap().len(), 10);
        assert!(p.srandmember_n(&ctx, "s", 0).unwrap().is_empty());
        assert!(p.srandmember(&ctx, "missing").unwrap_err().is_nil());

        let one = p.spop(&ctx, "s").unwrap();
        assert!(!p.sismember(&ctx, "s", one.into()).unwrap());
        assert_eq!(p.spop_n(&ctx, "s", 5).unwrap().len(), 2);
        assert_eq!(p.exists(&ctx, &["s"]).unwrap(), 0);
        assert!(p.spop(&ctx, "s").unwrap_err().is_nil());
    }

    #[test]
    fn test_extreme_random_counts() {
        let (p, ctx) = setup();
        p.sadd(&ctx, "s", &values(&["a"])).unwrap();

        for count in [i64::MIN, i64::MAX, i64::MIN / 2 - 1] {
            assert!(matches!(
                p.srandmember_n(&ctx, "s", count),
                Err(KvError::InvalidArgument(_))
            ));
        }
        // repeats span several batches
        let picks = p.srandmember_n(&ctx, "s", -2500).unwrap();
        assert_eq!(picks.len(), 2500);
        assert!(picks.iter().all(|m| m == b"a"));
        assert!(p.srandmember_n(&ctx, "missing", i64::MIN / 2).unwrap().is_empty());

        let cancelled = ctx.child();
        cancelled.cancel();
        assert!(p.srandmember_n(&cancelled, "s", -1_000_000_000_000).is_err());

        assert_eq!(p.spop_n(&ctx, "s", usize::MAX).unwrap(), vals(&["a"]));
        assert_eq!(p.exists(&ctx, &["s"]).unwrap(), 0);
    }

    #[test]
    fn test_sscan() {
        let (p, ctx) = setup();
        let members: Vec<Value> = (0..12).map(|i| Value::from(format!("m{:02}", i))).collect();
        p.sadd(&ctx, "s", &members).unwrap();

        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let page = p.sscan(&ctx, "s", cursor, "m*", 5).unwrap();
            seen.extend(page.elements);
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }
        assert_eq!(seen.len(), 12);
        assert_eq!(p.sscan(&ctx, "s", 0, "m1?", 0).unwrap().elements, vals(&["m10", "m11"]));
        assert!(p.sscan(&ctx, "missing", 0, "*", 10).unwrap().elements.is_empty());
    }
}
