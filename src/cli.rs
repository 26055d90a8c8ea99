//! Text command dispatch for the `redcache` binary.
//!
//! Each command line is split into words, matched by name and run against
//! any [`Cache`]. Errors become error replies; `Nil` becomes `(nil)`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::commands::{Cache, ZAddArgs};
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::reply::Reply;
use crate::scan::DEFAULT_COUNT;
use crate::types::{Expiry, LInsertPosition, SetArgs, SetReply, Value, ZAddMode, ZMember};
use crate::zset::{parse_score, Aggregate, ScoreRange, ZRangeArgs, ZStore};

/// Runs one command and returns its reply.
pub fn execute(cache: &dyn Cache, ctx: &Context, words: &[String]) -> Reply {
    let (name, rest) = match words.split_first() {
        Some(split) => split,
        None => return Reply::error("empty command"),
    };
    let cmd = name.to_ascii_uppercase();
    let args = Args { name: name.as_str(), items: rest };

    tracing::debug!(command = %cmd, args = rest.len(), "executing");
    match dispatch(cache, ctx, &cmd, &args) {
        Ok(reply) => reply,
        Err(e) => e.into(),
    }
}

/// Splits a command line into words. Double quotes group words and accept
/// `\"` and `\\` escapes.
pub fn split_line(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.peek().map_or(false, |c| c.is_whitespace()) {
            chars.next();
        }
        let first = match chars.peek() {
            Some(c) => *c,
            None => return Ok(words),
        };

        let mut word = String::new();
        if first == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(c) => word.push(c),
                        None => return Err(KvError::invalid("unbalanced quotes")),
                    },
                    Some(c) => word.push(c),
                    None => return Err(KvError::invalid("unbalanced quotes")),
                }
            }
        } else {
            while let Some(c) = chars.peek().copied() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
        }
        words.push(word);
    }
}

struct Args<'a> {
    name: &'a str,
    items: &'a [String],
}

impl<'a> Args<'a> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn wrong_arity(&self) -> KvError {
        KvError::invalid(format!(
            "wrong number of arguments for '{}' command",
            self.name.to_ascii_lowercase()
        ))
    }

    fn exactly(&self, n: usize) -> Result<()> {
        if self.len() != n {
            return Err(self.wrong_arity());
        }
        Ok(())
    }

    fn at_least(&self, n: usize) -> Result<()> {
        if self.len() < n {
            return Err(self.wrong_arity());
        }
        Ok(())
    }

    fn str(&self, i: usize) -> &'a str {
        self.items[i].as_str()
    }

    fn value(&self, i: usize) -> Value {
        Value::Text(self.items[i].clone())
    }

    fn values(&self, from: usize) -> Vec<Value> {
        self.items[from..].iter().map(|s| Value::Text(s.clone())).collect()
    }

    fn strs(&self, from: usize) -> Vec<&'a str> {
        self.items[from..].iter().map(String::as_str).collect()
    }

    fn int(&self, i: usize) -> Result<i64> {
        self.items[i].parse().map_err(|_| KvError::NotInteger)
    }

    fn uint(&self, i: usize) -> Result<u64> {
        self.items[i].parse().map_err(|_| KvError::NotInteger)
    }

    fn float(&self, i: usize) -> Result<f64> {
        parse_score(&self.items[i])
    }

    fn flag(&self, i: usize) -> String {
        self.items[i].to_ascii_uppercase()
    }

    /// Key/value pairs starting at `from`.
    fn pairs(&self, from: usize) -> Result<Vec<(&'a str, Value)>> {
        let rest = &self.items[from..];
        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err(self.wrong_arity());
        }
        Ok(rest
            .chunks(2)
            .map(|p| (p[0].as_str(), Value::Text(p[1].clone())))
            .collect())
    }
}

fn syntax_error() -> KvError {
    KvError::invalid("syntax error")
}

fn unix_time(offset: Duration) -> Result<SystemTime> {
    UNIX_EPOCH
        .checked_add(offset)
        .ok_or_else(|| KvError::invalid("invalid expire time"))
}

fn secs_since_epoch(secs: i64) -> Result<SystemTime> {
    unix_time(Duration::from_secs(secs.max(0) as u64))
}

fn millis_since_epoch(ms: i64) -> Result<SystemTime> {
    unix_time(Duration::from_millis(ms.max(0) as u64))
}

fn dispatch(c: &dyn Cache, ctx: &Context, cmd: &str, a: &Args<'_>) -> Result<Reply> {
    let reply = match cmd {
        "PING" => Reply::pong(),

        // Keys
        "DBSIZE" => c.db_size(ctx)?.into(),
        "DEL" => {
            a.at_least(1)?;
            c.del(ctx, &a.strs(0))?.into()
        }
        "EXISTS" => {
            a.at_least(1)?;
            c.exists(ctx, &a.strs(0))?.into()
        }
        "EXPIRE" | "PEXPIRE" => cmd_expire(c, ctx, cmd, a)?,
        "EXPIREAT" => {
            a.exactly(2)?;
            c.expire_at(ctx, a.str(0), secs_since_epoch(a.int(1)?)?)?.into()
        }
        "PEXPIREAT" => {
            a.exactly(2)?;
            c.pexpire_at(ctx, a.str(0), millis_since_epoch(a.int(1)?)?)?.into()
        }
        "EXPIRETIME" => {
            a.exactly(1)?;
            c.expire_time(ctx, a.str(0))?.into()
        }
        "PEXPIRETIME" => {
            a.exactly(1)?;
            c.pexpire_time(ctx, a.str(0))?.into()
        }
        "FLUSHALL" | "FLUSHDB" => c.flush_all(ctx)?.into(),
        "PERSIST" => {
            a.exactly(1)?;
            c.persist(ctx, a.str(0))?.into()
        }
        "KEYS" => {
            a.exactly(1)?;
            let keys = c.keys(ctx, a.str(0))?;
            Reply::Array(keys.into_iter().map(Reply::from).collect())
        }
        "RENAME" => {
            a.exactly(2)?;
            match c.rename(ctx, a.str(0), a.str(1)) {
                Err(KvError::Nil) => Reply::error("no such key"),
                other => other?.into(),
            }
        }
        "RENAMENX" => {
            a.exactly(2)?;
            match c.rename_nx(ctx, a.str(0), a.str(1)) {
                Err(KvError::Nil) => Reply::error("no such key"),
                other => other?.into(),
            }
        }
        "TTL" => {
            a.exactly(1)?;
            c.ttl(ctx, a.str(0))?.into()
        }
        "PTTL" => {
            a.exactly(1)?;
            c.pttl(ctx, a.str(0))?.into()
        }
        "TYPE" => {
            a.exactly(1)?;
            Reply::SimpleString(c.key_type(ctx, a.str(0))?.to_string())
        }
        "RANDOMKEY" => c.random_key(ctx)?.into(),
        "SCAN" => {
            a.at_least(1)?;
            let (pattern, count) = scan_options(a, 1)?;
            let page = c.scan(ctx, a.uint(0)?, &pattern, count)?;
            Reply::page(page.cursor, page.keys.into_iter().map(Reply::from).collect())
        }

        // Strings
        "GET" => {
            a.exactly(1)?;
            c.get(ctx, a.str(0))?.into()
        }
        "GETSET" => {
            a.exactly(2)?;
            c.get_set(ctx, a.str(0), a.value(1))?.into()
        }
        "SET" => cmd_set(c, ctx, a)?,
        "SETNX" => {
            a.exactly(2)?;
            c.set_nx(ctx, a.str(0), a.value(1), Expiry::Never)?.into()
        }
        "INCR" => {
            a.exactly(1)?;
            c.incr(ctx, a.str(0))?.into()
        }
        "INCRBY" => {
            a.exactly(2)?;
            c.incr_by(ctx, a.str(0), a.int(1)?)?.into()
        }
        "INCRBYFLOAT" => {
            a.exactly(2)?;
            Reply::float(c.incr_by_float(ctx, a.str(0), a.float(1)?)?)
        }
        "DECR" => {
            a.exactly(1)?;
            c.decr(ctx, a.str(0))?.into()
        }
        "DECRBY" => {
            a.exactly(2)?;
            c.decr_by(ctx, a.str(0), a.int(1)?)?.into()
        }
        "STRLEN" => {
            a.exactly(1)?;
            c.strlen(ctx, a.str(0))?.into()
        }
        "MGET" => {
            a.at_least(1)?;
            let keys = a.strs(0);
            let found = c.mget(ctx, &keys)?;
            Reply::Array(keys.iter().map(|k| Reply::from(found.get(*k).cloned())).collect())
        }
        "MSET" => c.mset(ctx, &a.pairs(0)?)?.into(),
        "MSETNX" => c.mset_nx(ctx, &a.pairs(0)?)?.into(),

        // Hashes
        "HSET" => {
            a.at_least(3)?;
            c.hset(ctx, a.str(0), &a.pairs(1)?)?.into()
        }
        "HMSET" => {
            a.at_least(3)?;
            c.hmset(ctx, a.str(0), &a.pairs(1)?)?.into()
        }
        "HSETNX" => {
            a.exactly(3)?;
            c.hset_nx(ctx, a.str(0), a.str(1), a.value(2))?.into()
        }
        "HGET" => {
            a.exactly(2)?;
            c.hget(ctx, a.str(0), a.str(1))?.into()
        }
        "HDEL" => {
            a.at_least(2)?;
            c.hdel(ctx, a.str(0), &a.strs(1))?.into()
        }
        "HEXISTS" => {
            a.exactly(2)?;
            c.hexists(ctx, a.str(0), a.str(1))?.into()
        }
        "HGETALL" => {
            a.exactly(1)?;
            let mut pairs: Vec<_> = c.hget_all(ctx, a.str(0))?.into_iter().collect();
            pairs.sort();
            let mut out = Vec::with_capacity(pairs.len() * 2);
            for (field, value) in pairs {
                out.push(Reply::from(field));
                out.push(Reply::from(value));
            }
            Reply::Array(out)
        }
        "HINCRBY" => {
            a.exactly(3)?;
            c.hincr_by(ctx, a.str(0), a.str(1), a.int(2)?)?.into()
        }
        "HINCRBYFLOAT" => {
            a.exactly(3)?;
            Reply::float(c.hincr_by_float(ctx, a.str(0), a.str(1), a.float(2)?)?)
        }
        "HKEYS" => {
            a.exactly(1)?;
            let fields = c.hkeys(ctx, a.str(0))?;
            Reply::Array(fields.into_iter().map(Reply::from).collect())
        }
        "HVALS" => {
            a.exactly(1)?;
            Reply::bulk_array(c.hvals(ctx, a.str(0))?)
        }
        "HLEN" => {
            a.exactly(1)?;
            c.hlen(ctx, a.str(0))?.into()
        }
        "HMGET" => {
            a.at_least(2)?;
            let fields = a.strs(1);
            let found = c.hmget(ctx, a.str(0), &fields)?;
            Reply::Array(fields.iter().map(|f| Reply::from(found.get(*f).cloned())).collect())
        }
        "HSCAN" => {
            a.at_least(2)?;
            let (pattern, count) = scan_options(a, 2)?;
            let page = c.hscan(ctx, a.str(0), a.uint(1)?, &pattern, count)?;
            let mut items = Vec::with_capacity(page.fields.len() * 2);
            for (field, value) in page.fields {
                items.push(Reply::from(field));
                items.push(Reply::from(value));
            }
            Reply::page(page.cursor, items)
        }

        // Lists
        "LPUSH" => {
            a.at_least(2)?;
            c.lpush(ctx, a.str(0), &a.values(1))?.into()
        }
        "RPUSH" => {
            a.at_least(2)?;
            c.rpush(ctx, a.str(0), &a.values(1))?.into()
        }
        "LPOP" | "RPOP" => cmd_pop(c, ctx, cmd, a)?,
        "LLEN" => {
            a.exactly(1)?;
            c.llen(ctx, a.str(0))?.into()
        }
        "LRANGE" => {
            a.exactly(3)?;
            Reply::bulk_array(c.lrange(ctx, a.str(0), a.int(1)?, a.int(2)?)?)
        }
        "LINDEX" => {
            a.exactly(2)?;
            c.lindex(ctx, a.str(0), a.int(1)?)?.into()
        }
        "LINSERT" => {
            a.exactly(4)?;
            let position = match a.flag(1).as_str() {
                "BEFORE" => LInsertPosition::Before,
                "AFTER" => LInsertPosition::After,
                _ => return Err(syntax_error()),
            };
            c.linsert(ctx, a.str(0), position, a.value(2), a.value(3))?.into()
        }
        "LREM" => {
            a.exactly(3)?;
            c.lrem(ctx, a.str(0), a.int(1)?, a.value(2))?.into()
        }
        "LSET" => {
            a.exactly(3)?;
            match c.lset(ctx, a.str(0), a.int(1)?, a.value(2)) {
                Err(KvError::Nil) => Reply::error("no such key"),
                other => other?.into(),
            }
        }
        "LTRIM" => {
            a.exactly(3)?;
            c.ltrim(ctx, a.str(0), a.int(1)?, a.int(2)?)?.into()
        }
        "RPOPLPUSH" => {
            a.exactly(2)?;
            c.rpoplpush(ctx, a.str(0), a.str(1))?.into()
        }

        // Sets
        "SADD" => {
            a.at_least(2)?;
            c.sadd(ctx, a.str(0), &a.values(1))?.into()
        }
        "SREM" => {
            a.at_least(2)?;
            c.srem(ctx, a.str(0), &a.values(1))?.into()
        }
        "SCARD" => {
            a.exactly(1)?;
            c.scard(ctx, a.str(0))?.into()
        }
        "SISMEMBER" => {
            a.exactly(2)?;
            c.sismember(ctx, a.str(0), a.value(1))?.into()
        }
        "SMEMBERS" => {
            a.exactly(1)?;
            Reply::bulk_array(c.smembers(ctx, a.str(0))?)
        }
        "SMOVE" => {
            a.exactly(3)?;
            c.smove(ctx, a.str(0), a.str(1), a.value(2))?.into()
        }
        "SPOP" => match a.len() {
            1 => c.spop(ctx, a.str(0))?.into(),
            2 => {
                let count = usize::try_from(a.uint(1)?).unwrap_or(usize::MAX);
                Reply::bulk_array(c.spop_n(ctx, a.str(0), count)?)
            }
            _ => return Err(a.wrong_arity()),
        },
        "SRANDMEMBER" => match a.len() {
            1 => c.srandmember(ctx, a.str(0))?.into(),
            2 => Reply::bulk_array(c.srandmember_n(ctx, a.str(0), a.int(1)?)?),
            _ => return Err(a.wrong_arity()),
        },
        "SDIFF" => {
            a.at_least(1)?;
            Reply::bulk_array(c.sdiff(ctx, &a.strs(0))?)
        }
        "SINTER" => {
            a.at_least(1)?;
            Reply::bulk_array(c.sinter(ctx, &a.strs(0))?)
        }
        "SUNION" => {
            a.at_least(1)?;
            Reply::bulk_array(c.sunion(ctx, &a.strs(0))?)
        }
        "SDIFFSTORE" => {
            a.at_least(2)?;
            c.sdiff_store(ctx, a.str(0), &a.strs(1))?.into()
        }
        "SINTERSTORE" => {
            a.at_least(2)?;
            c.sinter_store(ctx, a.str(0), &a.strs(1))?.into()
        }
        "SUNIONSTORE" => {
            a.at_least(2)?;
            c.sunion_store(ctx, a.str(0), &a.strs(1))?.into()
        }
        "SSCAN" => {
            a.at_least(2)?;
            let (pattern, count) = scan_options(a, 2)?;
            let page = c.sscan(ctx, a.str(0), a.uint(1)?, &pattern, count)?;
            Reply::page(page.cursor, page.elements.into_iter().map(Reply::from).collect())
        }

        // Sorted sets
        "ZADD" => cmd_zadd(c, ctx, a)?,
        "ZCARD" => {
            a.exactly(1)?;
            c.zcard(ctx, a.str(0))?.into()
        }
        "ZCOUNT" => {
            a.exactly(3)?;
            c.zcount(ctx, a.str(0), &ScoreRange::parse(a.str(1), a.str(2))?)?.into()
        }
        "ZINCRBY" => {
            a.exactly(3)?;
            Reply::float(c.zincr_by(ctx, a.str(0), a.float(1)?, a.value(2))?)
        }
        "ZSCORE" => {
            a.exactly(2)?;
            Reply::float(c.zscore(ctx, a.str(0), a.value(1))?)
        }
        "ZRANK" | "ZREVRANK" => {
            a.at_least(2)?;
            let with_score = match a.len() {
                2 => false,
                3 if a.flag(2) == "WITHSCORE" => true,
                _ => return Err(syntax_error()),
            };
            let rs = if cmd == "ZRANK" {
                c.zrank_with_score(ctx, a.str(0), a.value(1))?
            } else {
                c.zrev_rank_with_score(ctx, a.str(0), a.value(1))?
            };
            if with_score {
                Reply::Array(vec![rs.rank.into(), Reply::float(rs.score)])
            } else {
                rs.rank.into()
            }
        }
        "ZREM" => {
            a.at_least(2)?;
            c.zrem(ctx, a.str(0), &a.values(1))?.into()
        }
        "ZREMRANGEBYRANK" => {
            a.exactly(3)?;
            c.zrem_range_by_rank(ctx, a.str(0), a.int(1)?, a.int(2)?)?.into()
        }
        "ZREMRANGEBYSCORE" => {
            a.exactly(3)?;
            c.zrem_range_by_score(ctx, a.str(0), &ScoreRange::parse(a.str(1), a.str(2))?)?.into()
        }
        "ZRANGE" | "ZREVRANGE" | "ZRANGEBYSCORE" | "ZREVRANGEBYSCORE" => cmd_zrange(c, ctx, cmd, a)?,
        "ZINTER" | "ZUNION" | "ZDIFF" => {
            let (store, with_scores) = zstore_options(a, 0, cmd != "ZDIFF")?;
            let members = match cmd {
                "ZINTER" => c.zinter_with_scores(ctx, &store)?,
                "ZUNION" => c.zunion_with_scores(ctx, &store)?,
                _ => {
                    let keys: Vec<&str> = store.keys.iter().map(String::as_str).collect();
                    c.zdiff_with_scores(ctx, &keys)?
                }
            };
            Reply::members(members, with_scores)
        }
        "ZINTERSTORE" | "ZUNIONSTORE" | "ZDIFFSTORE" => {
            a.at_least(1)?;
            let (store, with_scores) = zstore_options(a, 1, cmd != "ZDIFFSTORE")?;
            if with_scores {
                return Err(syntax_error());
            }
            let dest = a.str(0);
            match cmd {
                "ZINTERSTORE" => c.zinter_store(ctx, dest, &store)?.into(),
                "ZUNIONSTORE" => c.zunion_store(ctx, dest, &store)?.into(),
                _ => {
                    let keys: Vec<&str> = store.keys.iter().map(String::as_str).collect();
                    c.zdiff_store(ctx, dest, &keys)?.into()
                }
            }
        }
        "ZSCAN" => {
            a.at_least(2)?;
            let (pattern, count) = scan_options(a, 2)?;
            let page = c.zscan(ctx, a.str(0), a.uint(1)?, &pattern, count)?;
            let mut items = Vec::with_capacity(page.members.len() * 2);
            for m in page.members {
                items.push(Reply::from_bytes(m.member));
                items.push(Reply::float(m.score));
            }
            Reply::page(page.cursor, items)
        }

        _ => return Err(KvError::invalid(format!("unknown command '{}'", a.name))),
    };
    Ok(reply)
}

/// Parses `[MATCH pattern] [COUNT n]` starting at `from`.
fn scan_options(a: &Args<'_>, from: usize) -> Result<(String, i64)> {
    let mut pattern = "*".to_string();
    let mut count = DEFAULT_COUNT;
    let mut i = from;
    while i < a.len() {
        if i + 1 >= a.len() {
            return Err(syntax_error());
        }
        match a.flag(i).as_str() {
            "MATCH" => pattern = a.str(i + 1).to_string(),
            "COUNT" => count = a.int(i + 1)?,
            _ => return Err(syntax_error()),
        }
        i += 2;
    }
    Ok((pattern, count))
}

fn cmd_expire(c: &dyn Cache, ctx: &Context, cmd: &str, a: &Args<'_>) -> Result<Reply> {
    if a.len() < 2 || a.len() > 3 {
        return Err(a.wrong_arity());
    }
    let key = a.str(0);
    let n = a.int(1)?;
    if n < 0 {
        // a negative timeout expires the key right away
        return Ok(c.expire_at(ctx, key, UNIX_EPOCH)?.into());
    }
    let ttl = if cmd == "PEXPIRE" {
        Duration::from_millis(n as u64)
    } else {
        Duration::from_secs(n as u64)
    };

    let flag = if a.len() == 3 { a.flag(2) } else { String::new() };
    let done = match (cmd, flag.as_str()) {
        ("PEXPIRE", "") => c.pexpire(ctx, key, ttl)?,
        ("PEXPIRE", _) => return Err(syntax_error()),
        (_, "") => c.expire(ctx, key, ttl)?,
        (_, "NX") => c.expire_nx(ctx, key, ttl)?,
        (_, "XX") => c.expire_xx(ctx, key, ttl)?,
        (_, "GT") => c.expire_gt(ctx, key, ttl)?,
        (_, "LT") => c.expire_lt(ctx, key, ttl)?,
        _ => return Err(syntax_error()),
    };
    Ok(done.into())
}

fn cmd_set(c: &dyn Cache, ctx: &Context, a: &Args<'_>) -> Result<Reply> {
    a.at_least(2)?;
    let mut opts = SetArgs::new();
    let mut i = 2;
    while i < a.len() {
        let flag = a.flag(i);
        match flag.as_str() {
            "NX" => opts = opts.nx(),
            "XX" => opts = opts.xx(),
            "GET" => opts = opts.get(),
            "KEEPTTL" => opts = opts.keep_ttl(),
            "EX" | "PX" | "EXAT" | "PXAT" => {
                i += 1;
                if i >= a.len() {
                    return Err(syntax_error());
                }
                let n = a.int(i)?;
                if n <= 0 {
                    return Err(KvError::invalid("invalid expire time in 'set' command"));
                }
                opts = match flag.as_str() {
                    "EX" => opts.ttl(Duration::from_secs(n as u64)),
                    "PX" => opts.ttl(Duration::from_millis(n as u64)),
                    "EXAT" => opts.expire_at(secs_since_epoch(n)?),
                    _ => opts.expire_at(millis_since_epoch(n)?),
                };
            }
            _ => return Err(syntax_error()),
        }
        i += 1;
    }

    match c.set_args(ctx, a.str(0), a.value(1), &opts)? {
        SetReply::Ok => Ok(Reply::ok()),
        SetReply::Prev(prev) => Ok(Reply::from_bytes(prev)),
    }
}

fn cmd_pop(c: &dyn Cache, ctx: &Context, cmd: &str, a: &Args<'_>) -> Result<Reply> {
    let key = match a.len() {
        1 | 2 => a.str(0),
        _ => return Err(a.wrong_arity()),
    };
    if a.len() == 1 {
        let value = if cmd == "LPOP" { c.lpop(ctx, key)? } else { c.rpop(ctx, key)? };
        return Ok(value.into());
    }
    let count = usize::try_from(a.uint(1)?).unwrap_or(usize::MAX);
    let values = if cmd == "LPOP" {
        c.lpop_count(ctx, key, count)?
    } else {
        c.rpop_count(ctx, key, count)?
    };
    Ok(Reply::bulk_array(values))
}

fn cmd_zadd(c: &dyn Cache, ctx: &Context, a: &Args<'_>) -> Result<Reply> {
    a.at_least(3)?;
    let mut args = ZAddArgs::default();
    let mut i = 1;
    while i < a.len() {
        match a.flag(i).as_str() {
            "CH" => args.ch = true,
            flag @ ("NX" | "XX" | "GT" | "LT") => args.mode = ZAddMode::parse(flag)?,
            _ => break,
        }
        i += 1;
    }

    let rest = &a.items[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(syntax_error());
    }
    let mut members = Vec::with_capacity(rest.len() / 2);
    for pair in rest.chunks(2) {
        members.push(ZMember::new(parse_score(&pair[0])?, pair[1].as_str()));
    }
    Ok(c.zadd_args(ctx, a.str(0), args, &members)?.into())
}

fn cmd_zrange(c: &dyn Cache, ctx: &Context, cmd: &str, a: &Args<'_>) -> Result<Reply> {
    a.at_least(3)?;
    let key = a.str(0);
    let (mut by_score, mut rev) = match cmd {
        "ZREVRANGE" => (false, true),
        "ZRANGEBYSCORE" => (true, false),
        "ZREVRANGEBYSCORE" => (true, true),
        _ => (false, false),
    };
    let mut with_scores = false;
    let mut limit = None;

    let mut i = 3;
    while i < a.len() {
        match a.flag(i).as_str() {
            "WITHSCORES" => with_scores = true,
            "BYSCORE" if cmd == "ZRANGE" => by_score = true,
            "REV" if cmd == "ZRANGE" => rev = true,
            "LIMIT" => {
                if i + 2 >= a.len() {
                    return Err(syntax_error());
                }
                limit = Some((a.int(i + 1)?, a.int(i + 2)?));
                i += 2;
            }
            _ => return Err(syntax_error()),
        }
        i += 1;
    }

    let mut args = if by_score {
        // reversed score ranges are written max first
        let (lo, hi) = if rev { (a.str(2), a.str(1)) } else { (a.str(1), a.str(2)) };
        ZRangeArgs::by_score(ScoreRange::parse(lo, hi)?)
    } else {
        ZRangeArgs::by_rank(a.int(1)?, a.int(2)?)
    };
    if rev {
        args = args.rev();
    }
    if let Some((offset, count)) = limit {
        args = args.limit(offset, count);
    }
    Ok(Reply::members(c.zrange_args_with_scores(ctx, key, &args)?, with_scores))
}

/// Parses `numkeys key... [WEIGHTS w...] [AGGREGATE SUM|MIN|MAX] [WITHSCORES]`
/// starting at `from`. WEIGHTS and AGGREGATE are rejected unless `weighted`.
fn zstore_options(a: &Args<'_>, from: usize, weighted: bool) -> Result<(ZStore, bool)> {
    if a.len() <= from {
        return Err(a.wrong_arity());
    }
    let numkeys = usize::try_from(a.uint(from)?).map_err(|_| a.wrong_arity())?;
    let keys_end = from
        .checked_add(1)
        .and_then(|n| n.checked_add(numkeys))
        .ok_or_else(|| a.wrong_arity())?;
    if numkeys == 0 || keys_end > a.len() {
        return Err(KvError::invalid("numkeys must match the number of keys"));
    }
    let mut store = ZStore::new(a.strs(from + 1).into_iter().take(numkeys));
    let mut with_scores = false;

    let mut i = keys_end;
    while i < a.len() {
        match a.flag(i).as_str() {
            "WITHSCORES" => with_scores = true,
            "WEIGHTS" if weighted => {
                if i + numkeys >= a.len() {
                    return Err(syntax_error());
                }
                let mut weights = Vec::with_capacity(numkeys);
                for j in 0..numkeys {
                    weights.push(a.float(i + 1 + j)?);
                }
                store = store.weights(weights);
                i += numkeys;
            }
            "AGGREGATE" if weighted => {
                if i + 1 >= a.len() {
                    return Err(syntax_error());
                }
                store = store.aggregate(Aggregate::parse(a.str(i + 1))?);
                i += 1;
            }
            _ => return Err(syntax_error()),
        }
        i += 1;
    }
    Ok((store, with_scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;

    fn run(p: &Provider, ctx: &Context, line: &str) -> Reply {
        execute(p, ctx, &split_line(line).unwrap())
    }

    fn bulk(s: &str) -> Reply {
        Reply::from_bytes(s.as_bytes().to_vec())
    }

    #[test]
    fn test_split_line() {
        assert_eq!(split_line("  set k  v ").unwrap(), vec!["set", "k", "v"]);
        assert_eq!(
            split_line(r#"set "a key" "say \"hi\"""#).unwrap(),
            vec!["set", "a key", "say \"hi\""]
        );
        assert!(split_line("\"open").is_err());
        assert!(split_line("   ").unwrap().is_empty());
    }

    #[test]
    fn test_strings() {
        let p = Provider::open_memory().unwrap();
        let ctx = Context::background();
        assert_eq!(run(&p, &ctx, "SET k v"), Reply::ok());
        assert_eq!(run(&p, &ctx, "get k"), bulk("v"));
        assert_eq!(run(&p, &ctx, "GET missing"), Reply::null());
        assert_eq!(run(&p, &ctx, "SET k w NX"), Reply::null());
        assert_eq!(run(&p, &ctx, "SET k w XX GET"), bulk("v"));
        assert_eq!(run(&p, &ctx, "INCRBY n 5"), Reply::Integer(5));
        assert_eq!(run(&p, &ctx, "INCRBYFLOAT n 0.5"), bulk("5.5"));
        assert_eq!(
            run(&p, &ctx, "MGET k nope"),
            Reply::Array(vec![bulk("w"), Reply::null()])
        );
        assert!(run(&p, &ctx, "SET k v EX 0").is_error());
        assert!(run(&p, &ctx, "GET").is_error());
    }

    #[test]
    fn test_expire_flags() {
        let p = Provider::open_memory().unwrap();
        let ctx = Context::background();
        run(&p, &ctx, "SET k v");
        assert_eq!(run(&p, &ctx, "EXPIRE k 100 XX"), Reply::Integer(0));
        assert_eq!(run(&p, &ctx, "EXPIRE k 100 NX"), Reply::Integer(1));
        assert_eq!(run(&p, &ctx, "EXPIRE k 50 GT"), Reply::Integer(0));
        assert_eq!(run(&p, &ctx, "EXPIRE k 50 LT"), Reply::Integer(1));
        assert_eq!(run(&p, &ctx, "PERSIST k"), Reply::Integer(1));
        assert_eq!(run(&p, &ctx, "TTL k"), Reply::Integer(-1));
        assert_eq!(run(&p, &ctx, "EXPIRE k -1"), Reply::Integer(1));
        assert_eq!(run(&p, &ctx, "TTL k"), Reply::Integer(-2));
        assert!(run(&p, &ctx, "EXPIRE k 1 SOON").is_error());
    }

    #[test]
    fn test_wrong_type_reply() {
        let p = Provider::open_memory().unwrap();
        let ctx = Context::background();
        run(&p, &ctx, "RPUSH l a b");
        let reply = run(&p, &ctx, "GET l");
        assert!(reply.to_string().contains("WRONGTYPE"));
    }

    #[test]
    fn test_zset_commands() {
        let p = Provider::open_memory().unwrap();
        let ctx = Context::background();
        assert_eq!(run(&p, &ctx, "ZADD a 1 x 2 y"), Reply::Integer(2));
        assert_eq!(run(&p, &ctx, "ZADD b 3 y 4 z"), Reply::Integer(2));
        assert_eq!(
            run(&p, &ctx, "ZINTER 2 a b WITHSCORES"),
            Reply::Array(vec![bulk("y"), bulk("5")])
        );
        assert_eq!(
            run(&p, &ctx, "ZINTERSTORE d 2 a b AGGREGATE MIN"),
            Reply::Integer(1)
        );
        assert_eq!(run(&p, &ctx, "ZSCORE d y"), bulk("2"));
        assert_eq!(
            run(&p, &ctx, "ZRANGE a +inf -inf BYSCORE REV LIMIT 0 1"),
            Reply::Array(vec![bulk("y")])
        );
        assert_eq!(
            run(&p, &ctx, "ZREVRANGEBYSCORE a (2 -inf"),
            Reply::Array(vec![bulk("x")])
        );
        assert_eq!(run(&p, &ctx, "ZRANK a y"), Reply::Integer(1));
        assert_eq!(run(&p, &ctx, "ZRANK a nope"), Reply::null());
        assert!(run(&p, &ctx, "ZINTER 3 a b").is_error());
    }

    #[test]
    fn test_scan_reply() {
        let p = Provider::open_memory().unwrap();
        let ctx = Context::background();
        run(&p, &ctx, "MSET a 1 b 2 c 3");
        assert_eq!(
            run(&p, &ctx, "SCAN 0 COUNT 2"),
            Reply::page(2, vec![bulk("a"), bulk("b")])
        );
        assert_eq!(
            run(&p, &ctx, "SCAN 2 MATCH * COUNT 2"),
            Reply::page(0, vec![bulk("c")])
        );
    }

    #[test]
    fn test_huge_and_malformed_numbers() {
        let p = Provider::open_memory().unwrap();
        let ctx = Context::background();
        run(&p, &ctx, "ZADD k 1 a");
        run(&p, &ctx, "SADD s a b");
        run(&p, &ctx, "RPUSH l x y");

        assert!(run(&p, &ctx, "ZUNIONSTORE d 18446744073709551615 k").is_error());
        assert!(run(&p, &ctx, "ZINTER 18446744073709551615 k").is_error());
        assert!(run(&p, &ctx, "ZUNIONSTORE d 99999999999999999999 k").is_error());
        assert!(run(&p, &ctx, "ZUNIONSTORE d -1 k").is_error());
        assert!(run(&p, &ctx, "ZUNIONSTORE d 1 k WEIGHTS").is_error());
        assert_eq!(run(&p, &ctx, "ZUNIONSTORE d 1 k"), Reply::Integer(1));

        assert!(run(&p, &ctx, "SRANDMEMBER s -9223372036854775808").is_error());
        assert!(run(&p, &ctx, "SRANDMEMBER s abc").is_error());
        assert!(run(&p, &ctx, "EXPIRE s 1.5").is_error());
        assert_eq!(run(&p, &ctx, "EXPIREAT s 9223372036854775807"), Reply::Integer(1));
        assert!(matches!(run(&p, &ctx, "TTL s"), Reply::Integer(t) if t > 0));
        assert_eq!(run(&p, &ctx, "EXPIRE s 9223372036854775807"), Reply::Integer(1));
        assert!(matches!(run(&p, &ctx, "PTTL s"), Reply::Integer(t) if t > 0));
        assert!(run(&p, &ctx, "SET k2 v EX notanumber").is_error());
        assert!(run(&p, &ctx, "SCAN 0 COUNT many").is_error());

        assert_eq!(
            run(&p, &ctx, "LPOP l 18446744073709551615"),
            Reply::Array(vec![bulk("x"), bulk("y")])
        );
        assert!(!run(&p, &ctx, "SPOP s 18446744073709551615").is_error());
        assert_eq!(run(&p, &ctx, "EXISTS s l"), Reply::Integer(0));
    }

    #[test]
    fn test_unknown_command() {
        let p = Provider::open_memory().unwrap();
        let ctx = Context::background();
        assert_eq!(
            run(&p, &ctx, "FROB x"),
            Reply::Error("ERR unknown command 'FROB'".to_string())
        );
    }
}
