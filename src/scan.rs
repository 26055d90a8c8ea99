//! Offset-cursor emulation of the SCAN family.
//!
//! The store only offers forward iteration, so a cursor is simply the number
//! of matching items already handed out. Each call re-opens the iteration,
//! skips `cursor` items and collects the next window. A call costs
//! O(cursor + count), and the cursor is only meaningful for the collection
//! and pattern that produced it. Items added or removed between calls may be
//! missed or repeated.

use crate::context::Context;
use crate::error::Result;

/// Number of items returned when the caller does not ask for a count.
pub const DEFAULT_COUNT: i64 = 10;

/// Cancellation is polled once per this many advances.
const CHECK_EVERY: u64 = 100;

/// Forward-only iteration over the items of one collection that match a
/// pattern, in the store's natural order.
pub trait Scanner {
    type Item;

    /// Moves past one item without decoding it. Returns false at the end.
    fn skip(&mut self) -> Result<bool>;

    /// Decodes and returns the next item.
    fn next_item(&mut self) -> Result<Option<Self::Item>>;
}

/// A window of scanned items plus the cursor for the next call.
#[derive(Debug, Clone, PartialEq)]
pub struct Window<T> {
    pub items: Vec<T>,
    pub cursor: u64,
}

/// Returns the `count` items that follow `cursor`.
///
/// `count <= 0` falls back to [`DEFAULT_COUNT`]. The returned cursor is 0
/// once no item remains after the window.
pub fn window<S>(ctx: &Context, scanner: &mut S, cursor: u64, count: i64) -> Result<Window<S::Item>>
where
    S: Scanner + ?Sized,
{
    let count = if count <= 0 { DEFAULT_COUNT as u64 } else { count as u64 };

    let mut skipped = 0u64;
    while skipped < cursor {
        if skipped % CHECK_EVERY == 0 {
            ctx.check()?;
        }
        if !scanner.skip()? {
            tracing::trace!(cursor, skipped, "scan cursor past end of collection");
            return Ok(Window {
                items: Vec::new(),
                cursor: 0,
            });
        }
        skipped += 1;
    }

    let mut items = Vec::new();
    while (items.len() as u64) < count {
        if items.len() as u64 % CHECK_EVERY == 0 {
            ctx.check()?;
        }
        match scanner.next_item()? {
            Some(item) => items.push(item),
            None => return Ok(Window { items, cursor: 0 }),
        }
    }

    let next = if scanner.skip()? {
        cursor + items.len() as u64
    } else {
        0
    };
    tracing::trace!(cursor, next, returned = items.len(), "scan window");
    Ok(Window { items, cursor: next })
}

/// Drains the scanner, polling cancellation like [`window`].
pub fn collect<S>(ctx: &Context, scanner: &mut S) -> Result<Vec<S::Item>>
where
    S: Scanner + ?Sized,
{
    let mut items = Vec::new();
    loop {
        if items.len() as u64 % CHECK_EVERY == 0 {
            ctx.check()?;
        }
        match scanner.next_item()? {
            Some(item) => items.push(item),
            None => return Ok(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KvError;

    struct VecScanner {
        items: std::vec::IntoIter<u32>,
        decoded: usize,
    }

    impl VecScanner {
        fn new(n: u32) -> Self {
            Self {
                items: (0..n).collect::<Vec<_>>().into_iter(),
                decoded: 0,
            }
        }
    }

    impl Scanner for VecScanner {
        type Item = u32;

        fn skip(&mut self) -> Result<bool> {
            Ok(self.items.next().is_some())
        }

        fn next_item(&mut self) -> Result<Option<u32>> {
            let item = self.items.next();
            if item.is_some() {
                self.decoded += 1;
            }
            Ok(item)
        }
    }

    fn drain(n: u32, count: i64) -> Vec<u32> {
        let ctx = Context::background();
        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let w = window(&ctx, &mut VecScanner::new(n), cursor, count).unwrap();
            seen.extend(w.items);
            if w.cursor == 0 {
                break;
            }
            cursor = w.cursor;
        }
        seen
    }

    #[test]
    fn test_full_coverage() {
        assert_eq!(drain(25, 10), (0..25).collect::<Vec<_>>());
        assert_eq!(drain(20, 10), (0..20).collect::<Vec<_>>());
        assert_eq!(drain(3, 1), vec![0, 1, 2]);
        assert!(drain(0, 5).is_empty());
    }

    #[test]
    fn test_cursor_values() {
        let ctx = Context::background();
        let w = window(&ctx, &mut VecScanner::new(25), 0, 10).unwrap();
        assert_eq!(w.cursor, 10);
        let w = window(&ctx, &mut VecScanner::new(25), 10, 10).unwrap();
        assert_eq!(w.cursor, 20);
        let w = window(&ctx, &mut VecScanner::new(25), 20, 10).unwrap();
        assert_eq!(w.items, vec![20, 21, 22, 23, 24]);
        assert_eq!(w.cursor, 0);
    }

    #[test]
    fn test_exact_fit_ends_iteration() {
        let ctx = Context::background();
        let w = window(&ctx, &mut VecScanner::new(10), 0, 10).unwrap();
        assert_eq!(w.items.len(), 10);
        assert_eq!(w.cursor, 0);
    }

    #[test]
    fn test_default_count() {
        let ctx = Context::background();
        let w = window(&ctx, &mut VecScanner::new(50), 0, 0).unwrap();
        assert_eq!(w.items.len(), DEFAULT_COUNT as usize);
        let w = window(&ctx, &mut VecScanner::new(50), 0, -3).unwrap();
        assert_eq!(w.items.len(), DEFAULT_COUNT as usize);
    }

    #[test]
    fn test_skipped_items_are_not_decoded() {
        let ctx = Context::background();
        let mut s = VecScanner::new(30);
        let w = window(&ctx, &mut s, 20, 5).unwrap();
        assert_eq!(w.items, vec![20, 21, 22, 23, 24]);
        assert_eq!(s.decoded, 5);
    }

    #[test]
    fn test_cursor_beyond_end() {
        let ctx = Context::background();
        let w = window(&ctx, &mut VecScanner::new(5), 100, 10).unwrap();
        assert!(w.items.is_empty());
        assert_eq!(w.cursor, 0);
    }

    #[test]
    fn test_collect() {
        let ctx = Context::background();
        assert_eq!(collect(&ctx, &mut VecScanner::new(3)).unwrap(), vec![0, 1, 2]);
        ctx.cancel();
        assert!(collect(&ctx, &mut VecScanner::new(3)).is_err());
    }

    #[test]
    fn test_cancelled_scan_returns_error() {
        let ctx = Context::background();
        ctx.cancel();
        let err = window(&ctx, &mut VecScanner::new(500), 250, 10).unwrap_err();
        assert!(matches!(err, KvError::Cancelled));
    }
}
