use std::collections::HashMap;
use std::time::Duration;

use super::{parse_float, parse_int, Provider};
use crate::commands::StringCommands;
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::expire;
use crate::result::{nil_if_none, Status};
use crate::types::{format_float, Expiry, SetArgs, SetMode, SetReply, Value};

impl Provider {
    /// NX/XX write; a rejected write is `false` rather than `Nil`.
    fn set_if(&self, ctx: &Context, key: &str, value: Value, args: SetArgs) -> Result<bool> {
        match self.set_args(ctx, key, value, &args) {
            Ok(_) => Ok(true),
            Err(KvError::Nil) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn check_set_args(args: &SetArgs) -> Result<()> {
    let expirations = [args.ttl.is_some(), args.expire_at.is_some(), args.keep_ttl]
        .iter()
        .filter(|set| **set)
        .count();
    if expirations > 1 {
        return Err(KvError::invalid("only one of ttl, expire_at and keep_ttl may be set"));
    }
    if args.ttl == Some(Duration::ZERO) {
        return Err(KvError::invalid("invalid expire time in 'set' command"));
    }
    Ok(())
}

impl StringCommands for Provider {
    fn decr(&self, ctx: &Context, key: &str) -> Result<i64> {
        self.incr_by(ctx, key, -1)
    }

    fn decr_by(&self, ctx: &Context, key: &str, decrement: i64) -> Result<i64> {
        let increment = decrement
            .checked_neg()
            .ok_or_else(|| KvError::invalid("decrement would overflow"))?;
        self.incr_by(ctx, key, increment)
    }

    fn incr(&self, ctx: &Context, key: &str) -> Result<i64> {
        self.incr_by(ctx, key, 1)
    }

    fn incr_by(&self, ctx: &Context, key: &str, increment: i64) -> Result<i64> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let strings = tx.strings();
            let (current, expire_at) = match strings.entry(&key)? {
                Some(e) => (parse_int(&e.value)?, e.expire_at),
                None => (0, None),
            };
            let next = current
                .checked_add(increment)
                .ok_or_else(|| KvError::invalid("increment or decrement would overflow"))?;
            strings.put(&key, next.to_string().as_bytes(), expire_at)?;
            Ok(next)
        })
    }

    fn incr_by_float(&self, ctx: &Context, key: &str, increment: f64) -> Result<f64> {
        if !increment.is_finite() {
            return Err(KvError::NotFloat);
        }
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let strings = tx.strings();
            let (current, expire_at) = match strings.entry(&key)? {
                Some(e) => (parse_float(&e.value)?, e.expire_at),
                None => (0.0, None),
            };
            let next = current + increment;
            if !next.is_finite() {
                return Err(KvError::invalid("increment would produce NaN or Infinity"));
            }
            strings.put(&key, format_float(next).as_bytes(), expire_at)?;
            Ok(next)
        })
    }

    fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        let key = self.key(key);
        let value = self.store.view(ctx, |tx| tx.strings().get(&key))?;
        nil_if_none(value)
    }

    fn get_set(&self, ctx: &Context, key: &str, value: Value) -> Result<Vec<u8>> {
        let key = self.key(key);
        let value = value.into_bytes();
        let prev = self.store.update(ctx, |tx| {
            let strings = tx.strings();
            let prev = strings.get(&key)?;
            strings.put(&key, &value, None)?;
            Ok(prev)
        })?;
        nil_if_none(prev)
    }

    fn set(&self, ctx: &Context, key: &str, value: Value, expiry: Expiry) -> Result<Status> {
        self.set_args(ctx, key, value, &SetArgs::new().expiry(expiry))?;
        Ok(Status::Ok)
    }

    fn set_args(&self, ctx: &Context, key: &str, value: Value, args: &SetArgs) -> Result<SetReply> {
        check_set_args(args)?;
        let key = self.key(key);
        let value = value.into_bytes();

        let (applied, prev) = self.store.update(ctx, |tx| {
            let existing = tx.keys().get(&key)?;
            let prev = if args.get {
                tx.strings().get(&key)?
            } else {
                None
            };

            let applied = match args.mode {
                SetMode::Always => true,
                SetMode::IfNotExists => existing.is_none(),
                SetMode::IfExists => existing.is_some(),
            };
            if !applied {
                return Ok((false, prev));
            }

            let expire_at = if let Some(ttl) = args.ttl {
                Some(tx.now().saturating_add(expire::whole_millis(ttl)))
            } else if let Some(at) = args.expire_at {
                Some(expire::unix_millis(at))
            } else if args.keep_ttl {
                existing.and_then(|row| row.expire_at)
            } else {
                None
            };
            tx.strings().put(&key, &value, expire_at)?;
            Ok((true, prev))
        })?;

        // GET reports the old value whether or not NX/XX let the write through
        match (args.get, prev) {
            (true, Some(prev)) => Ok(SetReply::Prev(prev)),
            (true, None) => Err(KvError::Nil),
            (false, _) if applied => Ok(SetReply::Ok),
            (false, _) => Err(KvError::Nil),
        }
    }

    fn set_nx(&self, ctx: &Context, key: &str, value: Value, expiry: Expiry) -> Result<bool> {
        self.set_if(ctx, key, value, SetArgs::new().nx().expiry(expiry))
    }

    fn set_xx(&self, ctx: &Context, key: &str, value: Value, expiry: Expiry) -> Result<bool> {
        self.set_if(ctx, key, value, SetArgs::new().xx().expiry(expiry))
    }

    fn strlen(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        let value = self.store.view(ctx, |tx| tx.strings().get(&key))?;
        Ok(value.map_or(0, |v| v.len() as i64))
    }

    fn mget(&self, ctx: &Context, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        self.store.view(ctx, |tx| {
            let strings = tx.strings();
            let mut values = HashMap::new();
            for key in keys {
                // values of other types read as missing
                match strings.get(&self.key(key)) {
                    Ok(Some(v)) => {
                        values.insert(key.to_string(), v);
                    }
                    Ok(None) | Err(KvError::WrongType) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(values)
        })
    }

    fn mset(&self, ctx: &Context, pairs: &[(&str, Value)]) -> Result<Status> {
        self.store.update(ctx, |tx| {
            let strings = tx.strings();
            for (key, value) in pairs {
                strings.put(&self.key(key), &value.to_bytes(), None)?;
            }
            Ok(())
        })?;
        Ok(Status::Ok)
    }

    fn mset_nx(&self, ctx: &Context, pairs: &[(&str, Value)]) -> Result<bool> {
        self.store.update(ctx, |tx| {
            let keys = tx.keys();
            for (key, _) in pairs {
                if keys.exists(&self.key(key))? {
                    return Ok(false);
                }
            }
            let strings = tx.strings();
            for (key, value) in pairs {
                strings.put(&self.key(key), &value.to_bytes(), None)?;
            }
            Ok(true)
        })
    }
}
