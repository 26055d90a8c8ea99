//! Conditional key expiration (EXPIRE NX/XX/GT/LT) and TTL queries.
//!
//! Expirations are absolute unix timestamps in milliseconds. A key without
//! one reports `-1` as its current expiration, which is what the policies
//! compare against.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::store::Tx;

/// Reply of TTL-style queries for a key that exists without an expiration.
pub const NO_EXPIRY: i64 = -1;
/// Reply of TTL-style queries for a key that does not exist.
pub const NO_KEY: i64 = -2;

/// When a new expiration may replace the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpirePolicy {
    #[default]
    Always,
    /// NX: only keys without an expiration.
    IfAbsent,
    /// XX: only keys that already expire.
    IfPresent,
    /// GT: only when the new expiration is later than the current one.
    IfGreater,
    /// LT: only when the new expiration is earlier than the current one.
    IfLess,
}

impl ExpirePolicy {
    /// `current` is the key's expiration in ms, or [`NO_EXPIRY`].
    ///
    /// GT and LT never apply to a key without an expiration, even though
    /// Redis treats "no TTL" as infinite for LT.
    pub fn allows(self, current: i64, requested: i64) -> bool {
        let has_ttl = current >= 0;
        match self {
            ExpirePolicy::Always => true,
            ExpirePolicy::IfAbsent => !has_ttl,
            ExpirePolicy::IfPresent => has_ttl,
            ExpirePolicy::IfGreater => has_ttl && requested > current,
            ExpirePolicy::IfLess => has_ttl && requested < current,
        }
    }
}

/// Sets the expiration of `key` to `at_ms` when `policy` allows it.
///
/// Returns false, without touching anything, for a missing or already
/// expired key or when the policy rejects the change.
pub fn set_expiration(tx: &Tx<'_>, key: &str, at_ms: i64, policy: ExpirePolicy) -> Result<bool> {
    let keys = tx.keys();
    let row = match keys.get(key)? {
        Some(row) => row,
        None => return Ok(false),
    };

    let current = row.expire_at.unwrap_or(NO_EXPIRY);
    if !policy.allows(current, at_ms) {
        tracing::trace!(key, current, requested = at_ms, ?policy, "expiration rejected by policy");
        return Ok(false);
    }

    keys.set_expire(row.id, Some(at_ms))?;
    Ok(true)
}

/// Removes the expiration of `key`. Returns false when the key is missing or
/// has no expiration.
pub fn persist(tx: &Tx<'_>, key: &str) -> Result<bool> {
    let keys = tx.keys();
    match keys.get(key)? {
        Some(row) if row.expire_at.is_some() => {
            keys.set_expire(row.id, None)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Absolute expiration in ms of `key`, [`NO_EXPIRY`] or [`NO_KEY`].
pub fn expire_at(tx: &Tx<'_>, key: &str) -> Result<i64> {
    Ok(match tx.keys().get(key)? {
        Some(row) => row.expire_at.unwrap_or(NO_EXPIRY),
        None => NO_KEY,
    })
}

/// Remaining time to live in milliseconds, or a negative sentinel.
pub fn remaining_ms(tx: &Tx<'_>, key: &str) -> Result<i64> {
    let at = expire_at(tx, key)?;
    if at < 0 {
        return Ok(at);
    }
    Ok((at - tx.now()).max(0))
}

/// Remaining time to live in whole seconds, or a negative sentinel.
pub fn remaining_secs(tx: &Tx<'_>, key: &str) -> Result<i64> {
    let ms = remaining_ms(tx, key)?;
    Ok(if ms < 0 { ms } else { ms / 1000 })
}

/// Whole seconds of `ttl`; a positive sub-second TTL counts as one second.
pub fn whole_secs(ttl: Duration) -> i64 {
    if ttl > Duration::ZERO && ttl < Duration::from_secs(1) {
        return 1;
    }
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

/// Whole milliseconds of `ttl`; a positive sub-millisecond TTL counts as one.
pub fn whole_millis(ttl: Duration) -> i64 {
    if ttl > Duration::ZERO && ttl < Duration::from_millis(1) {
        return 1;
    }
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Milliseconds since the unix epoch; times before it are negative.
pub fn unix_millis(at: SystemTime) -> i64 {
    match at.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => i64::try_from(e.duration().as_millis()).map_or(i64::MIN, |ms| -ms),
    }
}
