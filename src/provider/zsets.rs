use super::{drop_if_empty, Provider};
use crate::commands::{SortedSetCommands, ZAddArgs};
use crate::context::Context;
use crate::error::{KvError, Result};
use crate::glob::GlobPattern;
use crate::result::nil_if_none;
use crate::scan;
use crate::store::Tx;
use crate::types::{KeyType, Value, ZAddMode, ZMember, ZRankScore, ZScanPage};
use crate::zset::{self, rank_window, ScoreRange, SetOp, ZRangeArgs, ZRangeBy, ZStore};

fn names(members: Vec<ZMember>) -> Vec<Vec<u8>> {
    members.into_iter().map(|m| m.member).collect()
}

/// Reads every input key and combines them. Missing keys count as empty.
fn aggregate(tx: &Tx<'_>, keys: &[String], op: SetOp, opts: &ZStore) -> Result<Vec<ZMember>> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        let members = match tx.keys().typed(key, KeyType::ZSet)? {
            Some(id) => tx.zsets().all(id)?,
            None => Vec::new(),
        };
        sets.push(members);
    }
    Ok(zset::combine(op, &sets, opts))
}

/// Replaces `dest` with `members`; an empty result deletes it.
fn store_members(tx: &Tx<'_>, dest: &str, members: &[ZMember]) -> Result<i64> {
    if members.is_empty() {
        tx.keys().delete(dest)?;
        return Ok(0);
    }
    let id = tx.keys().create(dest, KeyType::ZSet, None)?;
    let zsets = tx.zsets();
    for m in members {
        zsets.put(id, &m.member, m.score)?;
    }
    Ok(members.len() as i64)
}

impl Provider {
    fn zcombine(&self, ctx: &Context, op: SetOp, opts: &ZStore) -> Result<Vec<ZMember>> {
        opts.validate()?;
        let keys: Vec<String> = opts.keys.iter().map(|k| self.key(k)).collect();
        self.store.view(ctx, |tx| aggregate(tx, &keys, op, opts))
    }

    fn zcombine_store(&self, ctx: &Context, destination: &str, op: SetOp, opts: &ZStore) -> Result<i64> {
        opts.validate()?;
        let keys: Vec<String> = opts.keys.iter().map(|k| self.key(k)).collect();
        let dest = self.key(destination);
        self.store.update(ctx, |tx| {
            let members = aggregate(tx, &keys, op, opts)?;
            store_members(tx, &dest, &members)
        })
    }

    /// Rank of `member` counted from the lowest score, or from the highest
    /// when `rev`.
    fn rank_of(&self, ctx: &Context, key: &str, member: Value, rev: bool) -> Result<ZRankScore> {
        let key = self.key(key);
        let member = member.into_bytes();
        let found = self.store.view(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::ZSet)? {
                Some(id) => id,
                None => return Ok(None),
            };
            let zsets = tx.zsets();
            let score = match zsets.score(id, &member)? {
                Some(score) => score,
                None => return Ok(None),
            };
            let mut rank = zsets.rank(id, score, &member)?;
            if rev {
                rank = zsets.len(id)? - 1 - rank;
            }
            Ok(Some(ZRankScore { rank, score }))
        })?;
        nil_if_none(found)
    }
}

impl SortedSetCommands for Provider {
    fn zadd(&self, ctx: &Context, key: &str, members: &[ZMember]) -> Result<i64> {
        self.zadd_args(ctx, key, ZAddArgs::default(), members)
    }

    fn zadd_args(&self, ctx: &Context, key: &str, args: ZAddArgs, members: &[ZMember]) -> Result<i64> {
        if members.iter().any(|m| m.score.is_nan()) {
            return Err(KvError::NotFloat);
        }
        if members.is_empty() {
            return Ok(0);
        }
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = match args.mode {
                ZAddMode::Xx => match tx.keys().typed(&key, KeyType::ZSet)? {
                    Some(id) => id,
                    None => return Ok(0),
                },
                _ => tx.keys().get_or_create(&key, KeyType::ZSet)?,
            };

            let zsets = tx.zsets();
            let (mut added, mut changed) = (0, 0);
            for m in members {
                match zsets.score(id, &m.member)? {
                    None => {
                        if args.mode == ZAddMode::Xx {
                            continue;
                        }
                        zsets.put(id, &m.member, m.score)?;
                        added += 1;
                    }
                    Some(old) => {
                        let update = match args.mode {
                            ZAddMode::Nx => false,
                            ZAddMode::Gt => m.score > old,
                            ZAddMode::Lt => m.score < old,
                            ZAddMode::Always | ZAddMode::Xx => true,
                        };
                        if update && m.score != old {
                            zsets.put(id, &m.member, m.score)?;
                            changed += 1;
                        }
                    }
                }
            }
            tx.keys().touch(id)?;
            Ok(if args.ch { added + changed } else { added })
        })
    }

    fn zcard(&self, ctx: &Context, key: &str) -> Result<i64> {
        let key = self.key(key);
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::ZSet)? {
            Some(id) => tx.zsets().len(id),
            None => Ok(0),
        })
    }

    fn zcount(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<i64> {
        let key = self.key(key);
        let (min, max) = range.bounds();
        self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::ZSet)? {
            Some(id) => tx.zsets().count_by_score(id, min, max),
            None => Ok(0),
        })
    }

    fn zincr_by(&self, ctx: &Context, key: &str, increment: f64, member: Value) -> Result<f64> {
        if increment.is_nan() {
            return Err(KvError::NotFloat);
        }
        let key = self.key(key);
        let member = member.into_bytes();
        self.store.update(ctx, |tx| {
            let id = tx.keys().get_or_create(&key, KeyType::ZSet)?;
            let zsets = tx.zsets();
            let score = zsets.score(id, &member)?.unwrap_or(0.0) + increment;
            if score.is_nan() {
                return Err(KvError::invalid("resulting score is not a number (NaN)"));
            }
            zsets.put(id, &member, score)?;
            tx.keys().touch(id)?;
            Ok(score)
        })
    }

    fn zinter(&self, ctx: &Context, store: &ZStore) -> Result<Vec<Vec<u8>>> {
        Ok(names(self.zcombine(ctx, SetOp::Inter, store)?))
    }

    fn zinter_with_scores(&self, ctx: &Context, store: &ZStore) -> Result<Vec<ZMember>> {
        self.zcombine(ctx, SetOp::Inter, store)
    }

    fn zinter_store(&self, ctx: &Context, destination: &str, store: &ZStore) -> Result<i64> {
        self.zcombine_store(ctx, destination, SetOp::Inter, store)
    }

    fn zunion(&self, ctx: &Context, store: &ZStore) -> Result<Vec<Vec<u8>>> {
        Ok(names(self.zcombine(ctx, SetOp::Union, store)?))
    }

    fn zunion_with_scores(&self, ctx: &Context, store: &ZStore) -> Result<Vec<ZMember>> {
        self.zcombine(ctx, SetOp::Union, store)
    }

    fn zunion_store(&self, ctx: &Context, destination: &str, store: &ZStore) -> Result<i64> {
        self.zcombine_store(ctx, destination, SetOp::Union, store)
    }

    fn zdiff(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<Vec<u8>>> {
        Ok(names(self.zdiff_with_scores(ctx, keys)?))
    }

    fn zdiff_with_scores(&self, ctx: &Context, keys: &[&str]) -> Result<Vec<ZMember>> {
        self.zcombine(ctx, SetOp::Diff, &ZStore::new(keys.iter().copied()))
    }

    fn zdiff_store(&self, ctx: &Context, destination: &str, keys: &[&str]) -> Result<i64> {
        self.zcombine_store(ctx, destination, SetOp::Diff, &ZStore::new(keys.iter().copied()))
    }

    fn zrange(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.zrange_args(ctx, key, &ZRangeArgs::by_rank(start, stop))
    }

    fn zrange_with_scores(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<ZMember>> {
        self.zrange_args_with_scores(ctx, key, &ZRangeArgs::by_rank(start, stop))
    }

    fn zrange_args(&self, ctx: &Context, key: &str, args: &ZRangeArgs) -> Result<Vec<Vec<u8>>> {
        Ok(names(self.zrange_args_with_scores(ctx, key, args)?))
    }

    fn zrange_args_with_scores(&self, ctx: &Context, key: &str, args: &ZRangeArgs) -> Result<Vec<ZMember>> {
        args.validate()?;
        let key = self.key(key);
        self.store.view(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::ZSet)? {
                Some(id) => id,
                None => return Ok(Vec::new()),
            };
            let zsets = tx.zsets();
            match args.by {
                ZRangeBy::Rank { start, stop } => match rank_window(start, stop, zsets.len(id)?) {
                    Some((offset, count)) => zsets.range_by_rank(id, offset, count, args.rev),
                    None => Ok(Vec::new()),
                },
                ZRangeBy::Score(range) => {
                    let (min, max) = range.bounds();
                    let (offset, count) = args.limit.unwrap_or((0, -1));
                    zsets.range_by_score(id, min, max, args.rev, offset, count)
                }
            }
        })
    }

    fn zrange_by_score(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<Vec<u8>>> {
        self.zrange_args(ctx, key, &ZRangeArgs::by_score(*range))
    }

    fn zrange_by_score_with_scores(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<ZMember>> {
        self.zrange_args_with_scores(ctx, key, &ZRangeArgs::by_score(*range))
    }

    fn zrank(&self, ctx: &Context, key: &str, member: Value) -> Result<i64> {
        Ok(self.rank_of(ctx, key, member, false)?.rank)
    }

    fn zrank_with_score(&self, ctx: &Context, key: &str, member: Value) -> Result<ZRankScore> {
        self.rank_of(ctx, key, member, false)
    }

    fn zrem(&self, ctx: &Context, key: &str, members: &[Value]) -> Result<i64> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::ZSet)? {
                Some(id) => id,
                None => return Ok(0),
            };
            let zsets = tx.zsets();
            let mut removed = 0;
            for member in members {
                if zsets.remove(id, &member.to_bytes())? {
                    removed += 1;
                }
            }
            drop_if_empty(tx, id, zsets.len(id)?)?;
            Ok(removed)
        })
    }

    fn zrem_range_by_rank(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<i64> {
        let key = self.key(key);
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::ZSet)? {
                Some(id) => id,
                None => return Ok(0),
            };
            let zsets = tx.zsets();
            let removed = match rank_window(start, stop, zsets.len(id)?) {
                Some((offset, count)) => zsets.remove_by_rank(id, offset, count)?,
                None => 0,
            };
            drop_if_empty(tx, id, zsets.len(id)?)?;
            Ok(removed as i64)
        })
    }

    fn zrem_range_by_score(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<i64> {
        let key = self.key(key);
        let (min, max) = range.bounds();
        self.store.update(ctx, |tx| {
            let id = match tx.keys().typed(&key, KeyType::ZSet)? {
                Some(id) => id,
                None => return Ok(0),
            };
            let zsets = tx.zsets();
            let removed = zsets.remove_by_score(id, min, max)?;
            drop_if_empty(tx, id, zsets.len(id)?)?;
            Ok(removed as i64)
        })
    }

    fn zrev_range(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        self.zrange_args(ctx, key, &ZRangeArgs::by_rank(start, stop).rev())
    }

    fn zrev_range_with_scores(&self, ctx: &Context, key: &str, start: i64, stop: i64) -> Result<Vec<ZMember>> {
        self.zrange_args_with_scores(ctx, key, &ZRangeArgs::by_rank(start, stop).rev())
    }

    fn zrev_range_by_score(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<Vec<u8>>> {
        self.zrange_args(ctx, key, &ZRangeArgs::by_score(*range).rev())
    }

    fn zrev_range_by_score_with_scores(&self, ctx: &Context, key: &str, range: &ScoreRange) -> Result<Vec<ZMember>> {
        self.zrange_args_with_scores(ctx, key, &ZRangeArgs::by_score(*range).rev())
    }

    fn zrev_rank(&self, ctx: &Context, key: &str, member: Value) -> Result<i64> {
        Ok(self.rank_of(ctx, key, member, true)?.rank)
    }

    fn zrev_rank_with_score(&self, ctx: &Context, key: &str, member: Value) -> Result<ZRankScore> {
        self.rank_of(ctx, key, member, true)
    }

    fn zscan(&self, ctx: &Context, key: &str, cursor: u64, pattern: &str, count: i64) -> Result<ZScanPage> {
        let key = self.key(key);
        let pattern = GlobPattern::new(pattern);
        let window = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::ZSet)? {
            Some(id) => tx
                .zsets()
                .scan(id, &pattern, |s| scan::window(ctx, s, cursor, count))
                .map(Some),
            None => Ok(None),
        })?;
        Ok(match window {
            Some(w) => ZScanPage {
                cursor: w.cursor,
                members: w.items,
            },
            None => ZScanPage::default(),
        })
    }

    fn zscore(&self, ctx: &Context, key: &str, member: Value) -> Result<f64> {
        let key = self.key(key);
        let member = member.into_bytes();
        let score = self.store.view(ctx, |tx| match tx.keys().typed(&key, KeyType::ZSet)? {
            Some(id) => tx.zsets().score(id, &member),
            None => Ok(None),
        })?;
        nil_if_none(score)
    }
}
