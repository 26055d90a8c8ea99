//! Embedded transactional store.
//!
//! A thin layer over one SQLite connection. Every key lives in the `keys`
//! table with a type tag and optional expiration; values live in one table
//! per type. Reads and writes happen inside [`Tx`], opened through
//! [`Store::view`] (deferred) or [`Store::update`] (immediate), which commit
//! when the closure returns `Ok` and roll back otherwise.

mod hashes;
mod keys;
mod lists;
mod sets;
mod strings;
mod zsets;

pub use hashes::HashStore;
pub use keys::{KeyRow, KeyStore};
pub use lists::ListStore;
pub use sets::SetStore;
pub use strings::{StringEntry, StringStore};
pub use zsets::ZSetStore;

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Row, Rows, Transaction, TransactionBehavior};

use crate::context::Context;
use crate::error::Result;
use crate::glob::GlobPattern;
use crate::options::StoreOptions;
use crate::scan::Scanner;

pub struct Store {
    conn: Mutex<Connection>,
    opts: StoreOptions,
    last_purge: AtomicI64,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, opts: &StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened store");
        Self::init(conn, opts)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_memory() -> Result<Self> {
        Self::open_memory_with(&StoreOptions::default())
    }

    pub fn open_memory_with(opts: &StoreOptions) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, opts)
    }

    fn init(conn: Connection, opts: &StoreOptions) -> Result<Self> {
        conn.busy_timeout(opts.busy_timeout)?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -{};",
            opts.cache_size_kb
        ))?;
        conn.execute_batch(include_str!("schema.sql"))?;

        Ok(Self {
            conn: Mutex::new(conn),
            opts: opts.clone(),
            last_purge: AtomicI64::new(now_ms()),
        })
    }

    /// Runs `f` in a read transaction.
    pub fn view<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.run(ctx, TransactionBehavior::Deferred, false, f)
    }

    /// Runs `f` in a write transaction. The write lock is taken up front so
    /// read-decide-write sequences cannot interleave with other writers.
    pub fn update<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.run(ctx, TransactionBehavior::Immediate, true, f)
    }

    /// Physically deletes every expired key now. Returns how many were removed.
    pub fn purge_expired(&self, ctx: &Context) -> Result<usize> {
        self.run(ctx, TransactionBehavior::Immediate, false, |tx| {
            tx.keys().purge_expired()
        })
    }

    fn run<T, F>(&self, ctx: &Context, behavior: TransactionBehavior, write: bool, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        ctx.check()?;

        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = Tx {
            tx: conn.transaction_with_behavior(behavior)?,
            now: now_ms(),
        };

        if write && self.purge_due(tx.now) {
            let purged = tx.keys().purge_expired()?;
            if purged > 0 {
                tracing::debug!(purged, "purged expired keys");
            }
        }

        match f(&tx) {
            Ok(v) => {
                tx.tx.commit()?;
                Ok(v)
            }
            Err(e) => {
                tracing::trace!(error = %e, "rolling back transaction");
                if let Err(rb) = tx.tx.rollback() {
                    tracing::warn!(error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn purge_due(&self, now: i64) -> bool {
        let interval = match self.opts.autovacuum_interval {
            Some(d) => d.as_millis() as i64,
            None => return false,
        };
        let last = self.last_purge.load(Ordering::Relaxed);
        now - last >= interval
            && self
                .last_purge
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }
}

/// Current time in milliseconds since epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// An open transaction. `now` is read once when it starts, so every
/// expiration check inside it agrees.
pub struct Tx<'c> {
    tx: Transaction<'c>,
    now: i64,
}

impl Tx<'_> {
    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn keys(&self) -> KeyStore<'_> {
        KeyStore::new(&self.tx, self.now)
    }

    pub fn strings(&self) -> StringStore<'_> {
        StringStore::new(&self.tx, self.now)
    }

    pub fn hashes(&self) -> HashStore<'_> {
        HashStore::new(&self.tx)
    }

    pub fn lists(&self) -> ListStore<'_> {
        ListStore::new(&self.tx)
    }

    pub fn sets(&self) -> SetStore<'_> {
        SetStore::new(&self.tx)
    }

    pub fn zsets(&self) -> ZSetStore<'_> {
        ZSetStore::new(&self.tx)
    }
}

/// Forward scan over query rows whose first column is matched against a
/// glob pattern.
pub struct RowScanner<'s, T> {
    rows: Rows<'s>,
    pattern: GlobPattern,
    decode: fn(&Row<'_>) -> rusqlite::Result<T>,
}

impl<'s, T> RowScanner<'s, T> {
    fn new(rows: Rows<'s>, pattern: &GlobPattern, decode: fn(&Row<'_>) -> rusqlite::Result<T>) -> Self {
        Self {
            rows,
            pattern: pattern.clone(),
            decode,
        }
    }
}

impl<T> Scanner for RowScanner<'_, T> {
    type Item = T;

    fn skip(&mut self) -> Result<bool> {
        while let Some(row) = self.rows.next()? {
            if self.pattern.is_match_all() || self.pattern.matches(match_target(row)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next_item(&mut self) -> Result<Option<T>> {
        while let Some(row) = self.rows.next()? {
            if self.pattern.is_match_all() || self.pattern.matches(match_target(row)?) {
                return Ok(Some((self.decode)(row)?));
            }
        }
        Ok(None)
    }
}

fn match_target<'r>(row: &'r Row<'_>) -> rusqlite::Result<&'r [u8]> {
    Ok(match row.get_ref(0)? {
        ValueRef::Text(b) | ValueRef::Blob(b) => b,
        _ => &[],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KvError;
    use crate::types::KeyType;
    use std::time::Duration;

    #[test]
    fn test_open_memory() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        let n = store.view(&ctx, |tx| tx.keys().count("")).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_update_commits() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| tx.strings().put("k", b"v", None))
            .unwrap();
        let v = store.view(&ctx, |tx| tx.strings().get("k")).unwrap();
        assert_eq!(v, Some(b"v".to_vec()));
    }

    #[test]
    fn test_error_rolls_back() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        let r: Result<()> = store.update(&ctx, |tx| {
            tx.strings().put("k", b"v", None)?;
            Err(KvError::WrongType)
        });
        assert!(matches!(r, Err(KvError::WrongType)));
        let v = store.view(&ctx, |tx| tx.strings().get("k")).unwrap();
        assert_eq!(v, None);
    }

    #[test]
    fn test_cancelled_context_never_opens_tx() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        ctx.cancel();
        let r = store.update(&ctx, |tx| tx.strings().put("k", b"v", None));
        assert!(matches!(r, Err(KvError::Cancelled)));
    }

    #[test]
    fn test_purge_expired() {
        let store = Store::open_memory().unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| {
                tx.strings().put("gone", b"v", Some(tx.now() - 1))?;
                tx.strings().put("kept", b"v", None)
            })
            .unwrap();
        assert_eq!(store.purge_expired(&ctx).unwrap(), 1);
        assert_eq!(store.purge_expired(&ctx).unwrap(), 0);
    }

    #[test]
    fn test_autovacuum_runs_on_write() {
        let opts = StoreOptions::default().autovacuum_interval(Some(Duration::ZERO));
        let store = Store::open_memory_with(&opts).unwrap();
        let ctx = Context::background();
        store
            .update(&ctx, |tx| tx.strings().put("gone", b"v", Some(tx.now() - 1)))
            .unwrap();
        store
            .update(&ctx, |tx| tx.keys().get_or_create("other", KeyType::Set))
            .unwrap();
        // expired row was removed physically, not just hidden
        assert_eq!(store.purge_expired(&ctx).unwrap(), 0);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let ctx = Context::background();
        {
            let store = Store::open(&path).unwrap();
            store
                .update(&ctx, |tx| tx.strings().put("persistent", b"value", None))
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        let v = store.view(&ctx, |tx| tx.strings().get("persistent")).unwrap();
        assert_eq!(v, Some(b"value".to_vec()));
    }
}
