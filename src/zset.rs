//! Sorted-set range and aggregation engine.
//!
//! Score bounds follow the Redis syntax (`-inf`, `+inf`, `(1.5` for an
//! exclusive bound). Rank ranges use Redis indexing, where negative values
//! count from the end. Aggregation (ZINTER/ZUNION/ZDIFF) runs in memory
//! over the members read from each key.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use crate::error::{KvError, Result};
use crate::types::ZMember;

/// One end of a score range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    NegInf,
    PosInf,
    Inclusive(f64),
    Exclusive(f64),
}

impl ScoreBound {
    /// Parses `-inf`, `+inf`, `inf` (any case), `N` or `(N`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "-inf" => return Ok(ScoreBound::NegInf),
            "+inf" | "inf" => return Ok(ScoreBound::PosInf),
            _ => {}
        }

        let (exclusive, num) = match s.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let v = parse_score(num)?;
        Ok(if exclusive {
            ScoreBound::Exclusive(v)
        } else {
            ScoreBound::Inclusive(v)
        })
    }

    fn as_lower(self) -> Bound<f64> {
        match self {
            ScoreBound::NegInf => Bound::Unbounded,
            ScoreBound::PosInf => Bound::Included(f64::INFINITY),
            ScoreBound::Inclusive(v) => Bound::Included(v),
            ScoreBound::Exclusive(v) => Bound::Excluded(v),
        }
    }

    fn as_upper(self) -> Bound<f64> {
        match self {
            ScoreBound::NegInf => Bound::Included(f64::NEG_INFINITY),
            ScoreBound::PosInf => Bound::Unbounded,
            ScoreBound::Inclusive(v) => Bound::Included(v),
            ScoreBound::Exclusive(v) => Bound::Excluded(v),
        }
    }
}

impl FromStr for ScoreBound {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self> {
        ScoreBound::parse(s)
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::NegInf => f.write_str("-inf"),
            ScoreBound::PosInf => f.write_str("+inf"),
            ScoreBound::Inclusive(v) => write!(f, "{}", v),
            ScoreBound::Exclusive(v) => write!(f, "({}", v),
        }
    }
}

/// Parses a plain score. NaN is rejected.
pub fn parse_score(s: &str) -> Result<f64> {
    let v: f64 = match s.trim().to_ascii_lowercase().as_str() {
        "-inf" => f64::NEG_INFINITY,
        "+inf" | "inf" => f64::INFINITY,
        other => other.parse().map_err(|_| KvError::NotFloat)?,
    };
    if v.is_nan() {
        return Err(KvError::NotFloat);
    }
    Ok(v)
}

/// Inclusive-by-default score interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: ScoreBound,
    pub max: ScoreBound,
}

impl ScoreRange {
    pub fn new(min: ScoreBound, max: ScoreBound) -> Self {
        Self { min, max }
    }

    /// Every score.
    pub fn all() -> Self {
        Self::new(ScoreBound::NegInf, ScoreBound::PosInf)
    }

    pub fn parse(min: &str, max: &str) -> Result<Self> {
        Ok(Self::new(ScoreBound::parse(min)?, ScoreBound::parse(max)?))
    }

    /// Store-level bounds for this range.
    pub fn bounds(&self) -> (Bound<f64>, Bound<f64>) {
        (self.min.as_lower(), self.max.as_upper())
    }
}

/// What a ZRANGE selects by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZRangeBy {
    Rank { start: i64, stop: i64 },
    Score(ScoreRange),
}

/// Arguments of the generic ZRANGE form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZRangeArgs {
    pub by: ZRangeBy,
    /// Walk from the highest score down.
    pub rev: bool,
    /// `(offset, count)` window over a score range; a negative count means
    /// "all remaining".
    pub limit: Option<(i64, i64)>,
}

impl ZRangeArgs {
    pub fn by_rank(start: i64, stop: i64) -> Self {
        Self {
            by: ZRangeBy::Rank { start, stop },
            rev: false,
            limit: None,
        }
    }

    pub fn by_score(range: ScoreRange) -> Self {
        Self {
            by: ZRangeBy::Score(range),
            rev: false,
            limit: None,
        }
    }

    pub fn rev(mut self) -> Self {
        self.rev = true;
        self
    }

    pub fn limit(mut self, offset: i64, count: i64) -> Self {
        self.limit = Some((offset, count));
        self
    }

    /// Argument checks that need no store access.
    pub fn validate(&self) -> Result<()> {
        match (self.by, self.limit) {
            (ZRangeBy::Rank { .. }, Some(_)) => Err(KvError::invalid(
                "LIMIT is only supported in combination with a score range",
            )),
            (_, Some((offset, _))) if offset < 0 => Err(KvError::invalid("negative LIMIT offset")),
            _ => Ok(()),
        }
    }
}

/// Resolves a Redis `start..=stop` index range against a collection of
/// `len` items into an `(offset, count)` window, or `None` when it selects
/// nothing. Lists use the same indexing.
pub fn rank_window(start: i64, stop: i64, len: i64) -> Option<(i64, i64)> {
    if len <= 0 {
        return None;
    }
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start, stop - start + 1))
}

/// How scores of the same member in different keys are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "" | "SUM" => Ok(Aggregate::Sum),
            "MIN" => Ok(Aggregate::Min),
            "MAX" => Ok(Aggregate::Max),
            other => Err(KvError::invalid(format!("unknown aggregate {}", other))),
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Aggregate::Sum => {
                let s = a + b;
                // inf + -inf
                if s.is_nan() {
                    0.0
                } else {
                    s
                }
            }
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

/// Input of ZINTER/ZUNION and their STORE forms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZStore {
    pub keys: Vec<String>,
    /// One multiplier per key; empty means all 1.
    pub weights: Vec<f64>,
    pub aggregate: Aggregate,
}

impl ZStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.keys.is_empty() {
            return Err(KvError::invalid("at least 1 input key is needed"));
        }
        if !self.weights.is_empty() && self.weights.len() != self.keys.len() {
            return Err(KvError::invalid("weights count must match key count"));
        }
        if self.weights.iter().any(|w| w.is_nan()) {
            return Err(KvError::NotFloat);
        }
        Ok(())
    }

    fn weight(&self, i: usize) -> f64 {
        self.weights.get(i).copied().unwrap_or(1.0)
    }
}

/// Set operation applied across keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Inter,
    Union,
    Diff,
}

/// Combines the members of several sorted sets. `sets[i]` holds the members
/// of the i-th key (empty for a missing key). The result is ordered by
/// (score, member).
pub fn combine(op: SetOp, sets: &[Vec<ZMember>], opts: &ZStore) -> Vec<ZMember> {
    let mut out = match op {
        SetOp::Diff => diff(sets),
        SetOp::Inter | SetOp::Union => {
            let mut acc: HashMap<&[u8], (f64, usize)> = HashMap::new();
            for (i, set) in sets.iter().enumerate() {
                let w = opts.weight(i);
                for m in set {
                    let score = weighted(m.score, w);
                    acc.entry(m.member.as_slice())
                        .and_modify(|(s, seen)| {
                            *s = opts.aggregate.apply(*s, score);
                            *seen += 1;
                        })
                        .or_insert((score, 1));
                }
            }
            let need = if op == SetOp::Inter { sets.len() } else { 1 };
            acc.into_iter()
                .filter(|(_, (_, seen))| *seen >= need)
                .map(|(member, (score, _))| ZMember::new(score, member))
                .collect()
        }
    };
    sort_members(&mut out);
    out
}

fn diff(sets: &[Vec<ZMember>]) -> Vec<ZMember> {
    let (first, rest) = match sets.split_first() {
        Some(split) => split,
        None => return Vec::new(),
    };
    let excluded: HashSet<&[u8]> = rest.iter().flatten().map(|m| m.member.as_slice()).collect();
    first
        .iter()
        .filter(|m| !excluded.contains(m.member.as_slice()))
        .cloned()
        .collect()
}

fn weighted(score: f64, weight: f64) -> f64 {
    let v = score * weight;
    // 0 * inf
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

/// Sorts by score, then member bytes.
pub fn sort_members(members: &mut [ZMember]) {
    members.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.member.cmp(&b.member))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zs(items: &[(&str, f64)]) -> Vec<ZMember> {
        items.iter().map(|(m, s)| ZMember::new(*s, m.as_bytes())).collect()
    }

    #[test]
    fn test_parse_bounds() {
        assert_eq!(ScoreBound::parse("-inf").unwrap(), ScoreBound::NegInf);
        assert_eq!(ScoreBound::parse("+INF").unwrap(), ScoreBound::PosInf);
        assert_eq!(ScoreBound::parse("inf").unwrap(), ScoreBound::PosInf);
        assert_eq!(ScoreBound::parse("1.5").unwrap(), ScoreBound::Inclusive(1.5));
        assert_eq!(ScoreBound::parse("(3").unwrap(), ScoreBound::Exclusive(3.0));
        assert!(matches!(ScoreBound::parse("abc"), Err(KvError::NotFloat)));
        assert!(matches!(ScoreBound::parse("(nan"), Err(KvError::NotFloat)));
        assert_eq!("(2".parse::<ScoreBound>().unwrap().to_string(), "(2");
    }

    #[test]
    fn test_range_bounds() {
        let r = ScoreRange::parse("(1", "+inf").unwrap();
        assert_eq!(r.bounds(), (Bound::Excluded(1.0), Bound::Unbounded));
        let r = ScoreRange::parse("+inf", "-inf").unwrap();
        assert_eq!(
            r.bounds(),
            (Bound::Included(f64::INFINITY), Bound::Included(f64::NEG_INFINITY))
        );
    }

    #[test]
    fn test_rank_window() {
        assert_eq!(rank_window(0, -1, 5), Some((0, 5)));
        assert_eq!(rank_window(1, 2, 5), Some((1, 2)));
        assert_eq!(rank_window(-2, -1, 5), Some((3, 2)));
        assert_eq!(rank_window(-100, 100, 5), Some((0, 5)));
        assert_eq!(rank_window(3, 1, 5), None);
        assert_eq!(rank_window(5, 10, 5), None);
        assert_eq!(rank_window(0, -6, 5), None);
        assert_eq!(rank_window(0, -1, 0), None);
    }

    #[test]
    fn test_limit_needs_score_range() {
        assert!(ZRangeArgs::by_rank(0, 1).limit(0, 1).validate().is_err());
        assert!(ZRangeArgs::by_score(ScoreRange::all()).limit(0, 1).validate().is_ok());
        assert!(ZRangeArgs::by_score(ScoreRange::all()).limit(-1, 1).validate().is_err());
    }

    #[test]
    fn test_inter_aggregates() {
        let sets = vec![zs(&[("a", 1.0), ("b", 2.0)]), zs(&[("b", 3.0), ("c", 4.0)])];
        let keys = ["k1", "k2"];

        let sum = combine(SetOp::Inter, &sets, &ZStore::new(keys));
        assert_eq!(sum, zs(&[("b", 5.0)]));

        let max = combine(SetOp::Inter, &sets, &ZStore::new(keys).aggregate(Aggregate::Max));
        assert_eq!(max, zs(&[("b", 3.0)]));

        let min = combine(SetOp::Inter, &sets, &ZStore::new(keys).aggregate(Aggregate::Min));
        assert_eq!(min, zs(&[("b", 2.0)]));
    }

    #[test]
    fn test_union_with_weights() {
        let sets = vec![zs(&[("a", 1.0), ("b", 2.0)]), zs(&[("b", 3.0), ("c", 4.0)])];
        let opts = ZStore::new(["k1", "k2"]).weights(vec![2.0, 1.0]);
        let out = combine(SetOp::Union, &sets, &opts);
        assert_eq!(out, zs(&[("a", 2.0), ("c", 4.0), ("b", 7.0)]));
    }

    #[test]
    fn test_sum_of_opposite_infinities_is_zero() {
        let sets = vec![zs(&[("x", f64::INFINITY)]), zs(&[("x", f64::NEG_INFINITY)])];
        let out = combine(SetOp::Union, &sets, &ZStore::new(["a", "b"]));
        assert_eq!(out, zs(&[("x", 0.0)]));
    }

    #[test]
    fn test_diff_keeps_first_scores() {
        let sets = vec![
            zs(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]),
            zs(&[("b", 9.0)]),
            zs(&[("c", 9.0)]),
        ];
        let out = combine(SetOp::Diff, &sets, &ZStore::default());
        assert_eq!(out, zs(&[("a", 1.0)]));
        assert!(combine(SetOp::Diff, &[], &ZStore::default()).is_empty());
    }

    #[test]
    fn test_diff_large_sets() {
        let all: Vec<ZMember> = (0..5000).map(|i| ZMember::new(i as f64, format!("m{}", i))).collect();
        let evens: Vec<ZMember> = all.iter().step_by(2).cloned().collect();
        let out = combine(SetOp::Diff, &[all, evens, Vec::new()], &ZStore::default());
        assert_eq!(out.len(), 2500);
        assert!(out.iter().all(|m| m.score as i64 % 2 == 1));
    }

    #[test]
    fn test_zstore_validation() {
        assert!(ZStore::default().validate().is_err());
        assert!(ZStore::new(["a", "b"]).weights(vec![1.0]).validate().is_err());
        assert!(ZStore::new(["a", "b"]).weights(vec![1.0, 2.0]).validate().is_ok());
        assert_eq!(Aggregate::parse("max").unwrap(), Aggregate::Max);
        assert!(Aggregate::parse("avg").is_err());
    }
}
