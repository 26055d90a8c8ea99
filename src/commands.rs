//! The command surface, one trait per data type.
//!
//! Keys are logical (unprefixed) names. Every method takes the caller's
//! [`Context`] first and runs in exactly one store transaction. A missing
//! entry is reported as [`KvError::Nil`](crate::KvError::Nil); conditional
//! no-ops return `false` or `0`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::context::Context;
use crate::error::Result;
use crate::result::Status;
use crate::types::{
    Expiry, HScanPage, KeyScanPage, LInsertPosition, ScanPage, SetArgs, SetReply, Value, ZAddMode,
    ZMember, ZRankScore, ZScanPage,
};
use crate::zset::{ScoreRange, ZRangeArgs, ZStore};

pub trait KeyCommands {
    /// Number of live keys visible to this provider.
    fn db_size(&self, ctx: &Context) -> Result<i64>;

    /// Deletes keys, returning how many existed.
    fn del(&self, ctx: &Context, keys: &[&str]) -> Result<i64>;

    /// Counts existing keys; a key named twice counts twice.
    fn exists(&self, ctx: &Context, keys: &[&str]) -> Result<i64>;

    /// Sets a relative expiration, truncated to whole seconds.
    fn expire(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool>;
    /// EXPIRE NX: only when the key has no expiration.
    fn expire_nx(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool>;
    /// EXPIRE XX: only when the key already has an expiration.
    fn expire_xx(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool>;
    /// EXPIRE GT: only when the new expiration is later.
    fn expire_gt(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool>;
    /// EXPIRE LT: only when the new expiration is earlier.
    fn expire_lt(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool>;
    fn expire_at(&self, ctx: &Context, key: &str, at: SystemTime) -> Result<bool>;
    /// Expiration as unix seconds, -1 without expiration, -2 for a missing key.
    fn expire_time(&self, ctx: &Context, key: &str) -> Result<i64>;

    /// Sets a relative expiration, truncated to whole milliseconds.
    fn pexpire(&self, ctx: &Context, key: &str, ttl: Duration) -> Result<bool>;
    fn pexpire_at(&self, ctx: &Context, key: &str, at: SystemTime) -> Result<bool>;
    /// Expiration as unix milliseconds, -1 or -2 like [`expire_time`](Self::expire_time).
    fn pexpire_time(&self, ctx: &Context, key: &str) -> Result<i64>;

    /// Deletes every key visible to this provider.
    fn flush_all(&self, ctx: &Context) -> Result<Status>;

    fn persist(&self, ctx: &Context, key: &str) -> Result<bool>;

    /// All keys matching a glob pattern. O(N) in the number of keys.
    fn keys(&self, ctx: &Context, pattern: &str) -> Result<Vec<String>>;

    /// Renames a key, overwriting `new_key`. A missing key is `Nil`.
    fn rename(&self, ctx: &Context, key: &str, new_key: &str) -> Result<Status>;
    /// Renames only when `new_key` does not exist.
    fn rename_nx(&self, ctx: &Context, key: &str, new_key: &str) -> Result<bool>;

    /// Remaining seconds, -1 without expiration, -2 for a missing key.
    fn ttl(&self, ctx: &Context, key: &str) -> Result<i64>;
    fn pttl(&self, ctx: &Context, key: &str) -> Result<i64>;

    /// `string`, `list`, `set`, `zset`, `hash` or `none`.
    fn key_type(&self, ctx: &Context, key: &str) -> Result<&'static str>;

    fn random_key(&self, ctx: &Context) -> Result<String>;

    /// One page of keys matching `pattern`.
    ///
    /// Each call costs O(cursor + count): the cursor is the number of
    /// matching keys already returned, so the iteration is replayed up to it.
    fn scan(&self, ctx: &Context, cursor: u64, pattern: &str, count: i64) -> Result<KeyScanPage>;
}

pub trait StringCommands {
    fn decr(&self, ctx: &Context, key: &str) -> Result<i64>;
    fn decr_by(&self, ctx: &Context, key: &str, decrement: i64) -> Result<i64>;
    fn incr(&self, ctx: &Context, key: &str) -> Result<i64>;
    /// Adds to the integer stored at `key` (0 when missing), keeping its TTL.
    fn incr_by(&self, ctx: &Context, key: &str, increment: i64) -> Result<i64>;
    fn incr_by_float(&self, ctx: &Context, key: &str, increment: f64) -> Result<f64>;

    fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>>;
    /// Sets a new value and returns the old one (`Nil` when there was none).
    fn get_set(&self, ctx: &Context, key: &str, value: Value) -> Result<Vec<u8>>;

    /// Plain SET. [`Expiry::Never`] clears any TTL the key had.
    fn set(&self, ctx: &Context, key: &str, value: Value, expiry: Expiry) -> Result<Status>;
    /// SET with NX/XX, expiration, GET and KEEPTTL.
    ///
    /// Returns `Nil` when the write was not applied, or when `get` was
    /// requested and the key did not exist.
    fn set_args(&self, ctx: &Context, key: &str, value: Value, args: &SetArgs) -> Result<SetReply>;
    fn set_nx(&self, ctx: &Context, key: &str, value: Value, expiry: Expiry) -> Result<bool>;
    fn set_xx(&self, ctx: &Context, key: &str, value: Value, expiry: Expiry) -> Result<bool>;

    fn strlen(&self, ctx: &Context, key: &str) -> Result<i64>;

    /// Values of the keys that exist, by key.
    fn mget(&self, ctx: &Context, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>>;
    fn mset(&self, ctx: &Context, pairs: &[(&str, Value)]) -> Result<Status>;
    /// Sets all pairs, or none when any key exists.
    fn mset_nx(&self, ctx: &Context, pairs: &[(&str, Value)]) -> Result<bool>;
}

pub trait HashCommands {
    fn hdel(&self, ctx: &Context, key: &str, fields: &[&str]) -> Result<i64>;
    fn hexists(&self, ctx: &Context, key: &str, field: &str) -> Result<bool>;
    fn hget(&self, ctx: &Context, key: &str, field: &str) -> Result<Vec<u8>>;
    fn hget_all(&self, ctx: &Context, key: &str) -> Result<HashMap<String, Vec<u8>>>;
    fn hincr_by(&self, ctx: &Context, key: &str, field: &str, increment: i64) -> Result<i64>;
    fn hincr_by_float(&self, ctx: &Context, key: &str, field: &str, increment: f64) -> Result<f64>;
    fn hkeys(&self, ctx: &Context, key: &str) -> Result<Vec<String>>;
    fn hlen(&self, ctx: &Context, key: &str) -> Result<i64>;
    /// Values of the fields that exist, by field.
    fn hmget(&self, ctx: &Context, key: &str, fields: &[&str]) -> Result<HashMap<String, Vec<u8>>>;
    fn hmset(&self, ctx: &Context, key: &str, pairs: &[(&str, Value)]) -> Result<Status>;
    /// One page of fields. O(cursor + count) per call.
    fn hscan(&self, ctx: &Context, key: &str, cursor: u64, pattern: &str, count: i64) -> Result<HScanPage>;
    /// Returns the number of fields that were added.
    fn hset(&self, ctx: &Context, key: &str, pairs: &[(&str, Value)]) -> Result<i64>;
    fn hset_nx(&self, ctx: &Context, key: &str, field: &str, value: Value) -> Result<bool>;
    fn hvals(&self, ctx: &Context, key: &str) -> Result<Vec<Vec<u8>>>;
}

pub trait ListCommands {
    fn lindex(&self, ctx: &Context, key: &str, index: i64) -> Result<Vec<u8>>;
    /// Returns the new length, -1 when `pivot` is absent, 0 when the key is.
    fn linsert(
        &self,
        ctx: &Context,
        key: &str,
        position: LInsertPosition,
        pivot: Value,
        value: Value,
    ) -> Result<i64>;
    fn llen(&self, ctx: &Context, key: &str) -> Result<i64>;
    fn lpop(&self, ctx: &Context, key: &str) -> Result<Vec<u8>>;
    fn lpop_count(&self, ctx: &Context, key: &str, count: usize) -> Result<Vec<Vec<u8>>>;
    fn lpush(&self, ctx: &Context, key: &str, values: &[Value]) -> Result<i64>;
    fn lrange(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;
    /// count > 0 removes from the head, count < 0 from the tail, 0 all.
    fn lrem(&self, ctx: &Context, key: &str, count: i64, value: Value) -> Result<i64>;
    fn lset(&self, ctx: &Context, key: &str, index: i64, value: Value) -> Result<Status>;
    fn ltrim(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Status>;
    fn rpop(&self, ctx: &Context, key: &str) -> Result<Vec<u8>>;
    fn rpop_count(&self, ctx: &Context, key: &str, count: usize) -> Result<Vec<Vec<u8>>>;
    /// Pops the tail of `source` and pushes it onto the head of
    /// `destination`. The same key rotates the list.
    fn rpoplpush(&self, ctx: &Context, source: &str, destination: &str) -> Result<Vec<u8>>;
    fn rpush(&self, ctx: &Context, key: &str, values: &[Value]) -> Result<i64>;
}

pub trait SetCommands {
    fn sadd(&self, ctx: &Context, key: &str, members: &[Value]) -> Result<i64>;
    fn scard(&self, ctx: &Context, key: &str) -> Result<i64>;
    fn sdiff(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>>;
    fn sdiff_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64>;
    fn sinter(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>>;
    fn sinter_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64>;
    fn sismember(&self, ctx: &Context, key: &str, member: Value) -> Result<bool>;
    fn smembers(&self, ctx: &Context, key: &str) -> Result<Vec<Vec<u8>>>;
    fn smove(&self, ctx: &Context, source: &str, destination: &str, member: Value) -> Result<bool>;
    fn spop(&self, ctx: &Context, key: &str) -> Result<Vec<u8>>;
    fn spop_n(&self, ctx: &Context, key: &str, count: usize) -> Result<Vec<Vec<u8>>>;
    fn srandmember(&self, ctx: &Context, key: &str) -> Result<Vec<u8>>;
    /// Positive `count`: distinct members. Negative: `|count|` picks that
    /// may repeat.
    fn srandmember_n(&self, ctx: &Context, key: &str, count: i64) -> Result<Vec<Vec<u8>>>;
    fn srem(&self, ctx: &Context, key: &str, members: &[Value]) -> Result<i64>;
    /// One page of members. O(cursor + count) per call.
    fn sscan(&self, ctx: &Context, key: &str, cursor: u64, pattern: &str, count: i64) -> Result<ScanPage>;
    fn sunion(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>>;
    fn sunion_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64>;
}

/// ZADD options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZAddArgs {
    pub mode: ZAddMode,
    /// Count changed members as well as added ones.
    pub ch: bool,
}

pub trait SortedSetCommands {
    /// Adds or updates members, returning how many were added.
    fn zadd(&self, ctx: &Context, key: &str, members: &[ZMember]) -> Result<i64>;
    fn zadd_args(&self, ctx: &Context, key: &str, args: ZAddArgs, members: &[ZMember]) -> Result<i64>;
    fn zcard(&self, ctx: &Context, key: &str) -> Result<i64>;
    fn zcount(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<i64>;
    fn zincr_by(&self, ctx: &Context, key: &str, increment: f64, member: Value) -> Result<f64>;

    fn zinter(&self, ctx: &Context, store: &ZStore) -> Result<Vec<Vec<u8>>>;
    fn zinter_with_scores(&self, ctx: &Context, store: &ZStore) -> Result<Vec<ZMember>>;
    fn zinter_store(&self, ctx: &Context, destination: &str, store: &ZStore) -> Result<i64>;
    fn zunion(&self, ctx: &Context, store: &ZStore) -> Result<Vec<Vec<u8>>>;
    fn zunion_with_scores(&self, ctx: &Context, store: &ZStore) -> Result<Vec<ZMember>>;
    fn zunion_store(&self, ctx: &Context, destination: &str, store: &ZStore) -> Result<i64>;
    /// Members of the first key missing from every other key.
    fn zdiff(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>>;
    fn zdiff_with_scores(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<ZMember>>;
    fn zdiff_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64>;

    fn zrange(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;
    fn zrange_with_scores(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<ZMember>>;
    fn zrange_args(&self, ctx: &Context, key: &str, args: &ZRangeArgs) -> Result<Vec<Vec<u8>>>;
    fn zrange_args_with_scores(&self, ctx: &Context, key: &str, args: &ZRangeArgs) -> Result<Vec<ZMember>>;
    fn zrange_by_score(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<Vec<u8>>>;
    fn zrange_by_score_with_scores(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<ZMember>>;

    /// 0-based position in ascending order.
    fn zrank(&self, ctx: &Context, key: &str, member: Value) -> Result<i64>;
    fn zrank_with_score(&self, ctx: &Context, key: &str, member: Value) -> Result<ZRankScore>;

    fn zrem(&self, ctx: &Context, key: &str, members: &[Value]) -> Result<i64>;
    fn zrem_range_by_rank(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<i64>;
    fn zrem_range_by_score(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<i64>;

    fn zrev_range(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;
    fn zrev_range_with_scores(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<ZMember>>;
    fn zrev_range_by_score(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<Vec<u8>>>;
    fn zrev_range_by_score_with_scores(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<ZMember>>;
    /// 0-based position in descending order.
    fn zrev_rank(&self, ctx: &Context, key: &str, member: Value) -> Result<i64>;
    fn zrev_rank_with_score(&self, ctx: &Context, key: &str, member: Value) -> Result<ZRankScore>;

    /// One page of members. O(cursor + count) per call.
    fn zscan(&self, ctx: &Context, key: &str, cursor: u64, pattern: &str, count: i64) -> Result<ZScanPage>;
    fn zscore(&self, ctx: &Context, key: &str, member: Value) -> Result<f64>;
}

/// Every command family at once.
pub trait Cache:
    KeyCommands + StringCommands + HashCommands + ListCommands + SetCommands + SortedSetCommands + Send + Sync
{
}

impl<T> Cache for T where
    T: KeyCommands
        + StringCommands
        + HashCommands
        + ListCommands
        + SetCommands
        + SortedSetCommands
        + Send
        + Sync
{
}
