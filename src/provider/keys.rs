use std::time::{Duration, SystemTime};

use super::Provider;
use crate::commands::KeyCommands;
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::expire::{self, ExpirePolicy};
use crate::glob::GlobPattern;
use crate::result::{nil_if_none, Status};
use crate::scan;
use crate::types::{KeyScanPage, KeyType};

impl Provider {
    /// Expiration `offset_ms` after the transaction's clock.
    fn expire_in(&self, ctx: &Context, key: &str, offset_ms: i64, policy: ExpirePolicy) -> Result<bool> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            expire::set_expiration(tx, &key, tx.now().saturating_add(offset_ms), policy)
        })
    }

    fn expire_until(&self, ctx: &Context, key: &str, at_ms: i64) -> Result<bool> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            expire::set_expiration(tx, &key, at_ms, ExpirePolicy::Always)
        })
    }
}

fn secs_ms(ttl: Duration) -> i64 {
    expire::whole_secs(ttl).saturating_mul(1000)
}

impl KeyCommands for Provider {
    fn db_size(&self, ctx: &Context) -> Result<i64> {
        self.store.view(ctx, |tx| tx.keys().count(self.prefix.as_str()))
    }

    fn del(&self, ctx: &Context, keys: &[&str]) -> Result<i64> {
        let keys = self.prefix.apply_all(keys);
        self.store.update(ctx, |tx| {
            let store = tx.keys();
            let mut deleted = 0;
            for key in &keys {
                if store.delete(key)? {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
    }

    fn exists(&self, ctx: &Context, keys: &[&str]) -> Result<i64> {
        let keys = self.prefix.apply_all(keys);
        self.store.view(ctx, |tx| {
            let store = tx.keys();
            let mut found = 0;
            for key in &keys {
                if store.exists(key)? {
                    found += 1;
                }
            }
            Ok(found)
        })
    }

    fn expire(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool> {
        self.expire_in(ctx, key, secs_ms(ttl), ExpirePolicy::Always)
    }

    fn expire_nx(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool> {
        self.expire_in(ctx, key, secs_ms(ttl), ExpirePolicy::IfAbsent)
    }

    fn expire_xx(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool> {
        self.expire_in(ctx, key, secs_ms(ttl), ExpirePolicy::IfPresent)
    }

    fn expire_gt(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool> {
        self.expire_in(ctx, key, secs_ms(ttl), ExpirePolicy::IfGreater)
    }

    fn expire_lt(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool> {
        self.expire_in(ctx, key, secs_ms(ttl), ExpirePolicy::IfLess)
    }

    fn expire_at(&self, ctx: &Context, key: &str, at: SystemTime) -> Result<bool> {
        let secs = expire::unix_millis(at).div_euclid(1000);
        self.expire_until(ctx, key, secs.saturating_mul(1000))
    }

    fn expire_time(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        let at = self.store.view(ctx, |tx| expire::expire_at(tx, &key))?;
        Ok(if at < 0 { at } else { at / 1000 })
    }

    fn pexpire(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool> {
        self.expire_in(ctx, key, expire::whole_millis(ttl), ExpirePolicy::Always)
    }

    fn pexpire_at(&self, ctx: &Context, key: &str, at: SystemTime) -> Result<bool> {
        self.expire_until(ctx, key, expire::unix_millis(at))
    }

    fn pexpire_time(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        self.store.view(ctx, |tx| expire::expire_at(tx, &key))
    }

    fn flush_all(&self, ctx: &Context) -> Result<Status> {
        let deleted = self
            .store
            .update(ctx, |tx| tx.keys().delete_all(self.prefix.as_str()))?;
        tracing::info!(deleted, prefix = self.prefix.as_str(), "flushed keys");
        Ok(Status::Ok)
    }

    fn persist(&self, ctx: &Context, key: &str) -> Result<bool> {
        let key = self.key(key);
        self.store.update(ctx, |tx| expire::persist(tx, &key))
    }

    fn keys(&self, ctx: &Context, pattern: &str) -> Result<Vec<String>> {
        let pattern = GlobPattern::new(&self.prefix.pattern(pattern));
        let keys = self.store.view(ctx, |tx| {
            tx.keys().scan(&pattern, |s| scan::collect(ctx, s))
        })?;
        Ok(keys.into_iter().map(|k| self.prefix.strip(k)).collect())
    }

    fn rename(&self, ctx: &Context, key: &str, new_key: &str) -> Result<Status> {
        let (from, to) = (self.key(key), self.key(new_key));
        self.store.update(ctx, |tx| {
            let keys = tx.keys();
            let row = keys.get(&from)?.ok_or(KvError::Nil)?;
            keys.rename(row.id, &to)
        })?;
        Ok(Status::Ok)
    }

    fn rename_nx(&self, ctx: &Context, key: &str, new_key: &str) -> Result<bool> {
        let (from, to) = (self.key(key), self.key(new_key));
        self.store.update(ctx, |tx| {
            let keys = tx.keys();
            let row = keys.get(&from)?.ok_or(KvError::Nil)?;
            if keys.exists(&to)? {
                return Ok(false);
            }
            keys.rename(row.id, &to)?;
            Ok(true)
        })
    }

    fn ttl(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        self.store.view(ctx, |tx| expire::remaining_secs(tx, &key))
    }

    fn pttl(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        self.store.view(ctx, |tx| expire::remaining_ms(tx, &key))
    }

    fn key_type(&self, ctx: &Context, key: &str) -> Result<&'static str> {
        let key = self.key(key);
        let row = self.store.view(ctx, |tx| tx.keys().get(&key))?;
        Ok(KeyType::name(row.map(|r| r.key_type)))
    }

    fn random_key(&self, ctx: &Context) -> Result<String> {
        let key = self
            .store
            .view(ctx, |tx| tx.keys().random(self.prefix.as_str()))?;
        nil_if_none(key).map(|k| self.prefix.strip(k))
    }

    fn scan(&self, ctx: &Context, cursor: u64, pattern: &str, count: i64) -> Result<KeyScanPage> {
        let pattern = GlobPattern::new(&self.prefix.pattern(pattern));
        let window = self.store.view(ctx, |tx| {
            tx.keys().scan(&pattern, |s| scan::window(ctx, s, cursor, count))
        })?;
        Ok(KeyScanPage {
            cursor: window.cursor,
            keys: window
                .items
                .into_iter()
                .map(|k| self.prefix.strip(k))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::StringCommands;
    use crate::types::Expiry;

    fn setup() -> (Provider, Context) {
        (Provider::open_memory().unwrap(), Context::background())
    }

    #[test]
    fn test_del_and_exists() {
        let (p, ctx) = setup();
        p.set(&ctx, "a", "1".into(), Expiry::Never).unwrap();
        p.set(&ctx, "b", "2".into(), Expiry::Never).unwrap();
        assert_eq!(p.exists(&ctx, &["a", "b", "c", "a"]).unwrap(), 3);
        assert_eq!(p.del(&ctx, &["a", "c"]).unwrap(), 1);
        assert_eq!(p.exists(&ctx, &["a"]).unwrap(), 0);
        assert_eq!(p.db_size(&ctx).unwrap(), 1);
    }

    #[test]
    fn test_expire_policies() {
        let (p, ctx) = setup();
        p.set(&ctx, "k", "v".into(), Expiry::Never).unwrap();
        assert!(!p.expire_xx(&ctx, "k", Duration::from_secs(100)).unwrap());
        assert!(!p.expire_gt(&ctx, "k", Duration::from_secs(100)).unwrap());
        assert!(!p.expire_lt(&ctx, "k", Duration::from_secs(100)).unwrap());
        assert!(p.expire_nx(&ctx, "k", Duration::from_secs(100)).unwrap());
        assert!(!p.expire_nx(&ctx, "k", Duration::from_secs(200)).unwrap());
        assert!(p.expire_gt(&ctx, "k", Duration::from_secs(200)).unwrap());
        assert!(!p.expire_gt(&ctx, "k", Duration::from_secs(150)).unwrap());
        assert!(p.expire_lt(&ctx, "k", Duration::from_secs(150)).unwrap());
        assert!(p.expire_xx(&ctx, "k", Duration::from_secs(50)).unwrap());
        let ttl = p.ttl(&ctx, "k").unwrap();
        assert!(ttl > 40 && ttl <= 50, "ttl was {}", ttl);
        assert!(!p.expire(&ctx, "missing", Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn test_ttl_sentinels() {
        let (p, ctx) = setup();
        assert_eq!(p.ttl(&ctx, "missing").unwrap(), -2);
        assert_eq!(p.pttl(&ctx, "missing").unwrap(), -2);
        assert_eq!(p.expire_time(&ctx, "missing").unwrap(), -2);
        p.set(&ctx, "k", "v".into(), Expiry::Never).unwrap();
        assert_eq!(p.ttl(&ctx, "k").unwrap(), -1);
        assert_eq!(p.pexpire_time(&ctx, "k").unwrap(), -1);
    }

    #[test]
    fn test_expire_at_and_times() {
        let (p, ctx) = setup();
        p.set(&ctx, "k", "v".into(), Expiry::Never).unwrap();
        let at = SystemTime::now() + Duration::from_secs(3600);
        assert!(p.expire_at(&ctx, "k", at).unwrap());
        let secs = expire::unix_millis(at) / 1000;
        assert_eq!(p.expire_time(&ctx, "k").unwrap(), secs);
        assert_eq!(p.pexpire_time(&ctx, "k").unwrap(), secs * 1000);

        assert!(p.pexpire_at(&ctx, "k", at).unwrap());
        assert_eq!(p.pexpire_time(&ctx, "k").unwrap(), expire::unix_millis(at));

        assert!(p.persist(&ctx, "k").unwrap());
        assert_eq!(p.ttl(&ctx, "k").unwrap(), -1);
    }

    #[test]
    fn test_expire_at_in_the_past_removes_key() {
        let (p, ctx) = setup();
        p.set(&ctx, "k", "v".into(), Expiry::Never).unwrap();
        let past = SystemTime::now() - Duration::from_secs(10);
        assert!(p.expire_at(&ctx, "k", past).unwrap());
        assert_eq!(p.exists(&ctx, &["k"]).unwrap(), 0);
    }

    #[test]
    fn test_pexpire() {
        let (p, ctx) = setup();
        p.set(&ctx, "k", "v".into(), Expiry::Never).unwrap();
        assert!(p.pexpire(&ctx, "k", Duration::from_millis(5000)).unwrap());
        let pttl = p.pttl(&ctx, "k").unwrap();
        assert!(pttl > 4000 && pttl <= 5000);
    }

    #[test]
    fn test_rename() {
        let (p, ctx) = setup();
        assert!(p.rename(&ctx, "missing", "x").unwrap_err().is_nil());
        p.set(&ctx, "a", "1".into(), Expiry::Never).unwrap();
        p.set(&ctx, "b", "2".into(), Expiry::Never).unwrap();
        p.expire(&ctx, "a", Duration::from_secs(100)).unwrap();

        assert!(!p.rename_nx(&ctx, "a", "b").unwrap());
        assert_eq!(p.rename(&ctx, "a", "b").unwrap(), Status::Ok);
        assert_eq!(p.get(&ctx, "b").unwrap(), b"1".to_vec());
        assert!(p.ttl(&ctx, "b").unwrap() > 0);
        assert!(p.rename_nx(&ctx, "b", "c").unwrap());
        assert_eq!(p.keys(&ctx, "*").unwrap(), vec!["c"]);
    }

    #[test]
    fn test_key_type() {
        let (p, ctx) = setup();
        assert_eq!(p.key_type(&ctx, "k").unwrap(), "none");
        p.set(&ctx, "k", "v".into(), Expiry::Never).unwrap();
        assert_eq!(p.key_type(&ctx, "k").unwrap(), "string");
    }

    #[test]
    fn test_keys_and_scan() {
        let (p, ctx) = setup();
        for i in 0..25 {
            p.set(&ctx, &format!("user:{:02}", i), "v".into(), Expiry::Never).unwrap();
        }
        p.set(&ctx, "other", "v".into(), Expiry::Never).unwrap();

        assert_eq!(p.keys(&ctx, "user:*").unwrap().len(), 25);
        assert_eq!(p.keys(&ctx, "").unwrap().len(), 26);

        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let page = p.scan(&ctx, cursor, "user:*", 10).unwrap();
            seen.extend(page.keys);
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }
        assert_eq!(seen.len(), 25);
        assert_eq!(seen[0], "user:00");
    }

    #[test]
    fn test_random_key_and_flush() {
        let (p, ctx) = setup();
        assert!(p.random_key(&ctx).unwrap_err().is_nil());
        p.set(&ctx, "only", "v".into(), Expiry::Never).unwrap();
        assert_eq!(p.random_key(&ctx).unwrap(), "only");
        assert_eq!(p.flush_all(&ctx).unwrap(), Status::Ok);
        assert_eq!(p.db_size(&ctx).unwrap(), 0);
    }
}
