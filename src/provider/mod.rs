//! SQLite-backed implementation of every command trait.
//!
//! Each command rewrites its keys through the tenant prefix, runs exactly
//! one store transaction and strips the prefix from any key it returns.

mod hashes;
mod keys;
mod lists;
mod sets;
mod strings;
mod zsets;

use std::sync::Arc;

use crate::error::{KvError, Result};
use crate::options::Options;
use crate::prefix::KeyPrefix;
use crate::store::{Store, Tx};

#[derive(Clone)]
pub struct Provider {
    store: Arc<Store>,
    prefix: KeyPrefix,
}

impl Provider {
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_options(store, &Options::default())
    }

    /// Several providers may share one store; each sees only the keys under
    /// its own prefix.
    pub fn with_options(store: Arc<Store>, opts: &Options) -> Self {
        Self {
            store,
            prefix: KeyPrefix::new(&opts.prefix),
        }
    }

    /// A provider over a fresh in-memory store.
    pub fn open_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(Store::open_memory()?)))
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_str()
    }

    fn key(&self, key: &str) -> String {
        self.prefix.apply(key)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("prefix", &self.prefix.as_str())
            .finish()
    }
}

/// Deletes the key when its collection has become empty.
fn drop_if_empty(tx: &Tx<'_>, key_id: i64, len: i64) -> Result<()> {
    if len == 0 {
        tx.keys().delete_id(key_id)?;
    }
    Ok(())
}

fn parse_int(value: &[u8]) -> Result<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(KvError::NotInteger)
}

fn parse_float(value: &[u8]) -> Result<f64> {
    let v: f64 = std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or(KvError::NotFloat)?;
    if v.is_nan() {
        return Err(KvError::NotFloat);
    }
    Ok(v)
}

/// Resolves a possibly negative list index against `len`.
fn resolve_index(index: i64, len: i64) -> Option<i64> {
    let i = if index < 0 { len + index } else { index };
    if i < 0 || i >= len {
        None
    } else {
        Some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_int(b"-42").unwrap(), -42);
        assert!(matches!(parse_int(b"4.2"), Err(KvError::NotInteger)));
        assert!(matches!(parse_int(&[0xff]), Err(KvError::NotInteger)));
        assert_eq!(parse_float(b"2.5").unwrap(), 2.5);
        assert_eq!(parse_float(b"7").unwrap(), 7.0);
        assert!(matches!(parse_float(b"nan"), Err(KvError::NotFloat)));
        assert!(matches!(parse_float(b"x"), Err(KvError::NotFloat)));
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 3), Some(0));
        assert_eq!(resolve_index(-1, 3), Some(2));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(-4, 3), None);
    }

    #[test]
    fn test_debug_shows_prefix() {
        let store = Arc::new(Store::open_memory().unwrap());
        let p = Provider::with_options(store, &Options::new().prefix("t:"));
        assert_eq!(p.prefix(), "t:");
        assert!(format!("{:?}", p).contains("t:"));
    }
}
