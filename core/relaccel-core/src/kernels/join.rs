//! Equi-join producing row-index pairs.
//!
//! Inner joins build a hash table over the right keys and probe with the
//! left; outer joins walk every (left, right) pair. Both emit pairs in the
//! same order: left-major with right rows ascending, then (for Right/Full)
//! the unmatched right rows ascending.

use ahash::AHashMap;
use rayon::prelude::*;
use smallvec::SmallVec;

use super::KeyRef;
use crate::frame::ColumnData;
use crate::types::JoinType;

/// Marker for the absent side of an outer-join row.
pub const ABSENT_ROW: i64 = -1;

/// Probe sides at least this long are split across the rayon pool.
const PARALLEL_THRESHOLD: usize = 1000;

type Matches = SmallVec<[usize; 4]>;

/// Joined row pairs, one entry per output row.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct JoinPairs {
    pub(crate) left: Vec<i64>,
    pub(crate) right: Vec<i64>,
}

impl JoinPairs {
    fn push(&mut self, left: i64, right: i64) {
        self.left.push(left);
        self.right.push(right);
    }

    pub(crate) fn len(&self) -> usize {
        self.left.len()
    }

    pub(crate) fn into_columns(self) -> Vec<ColumnData> {
        vec![ColumnData::Int64(self.left), ColumnData::Int64(self.right)]
    }
}

pub(crate) fn join(left: &ColumnData, right: &ColumnData, join_type: JoinType) -> JoinPairs {
    let per_left = match join_type {
        JoinType::Inner => hash_probe(left, right),
        _ => nested_loop(left, right),
    };

    let mut pairs = JoinPairs::default();
    let mut right_matched = vec![false; right.len()];
    for (l, matches) in per_left.iter().enumerate() {
        if matches.is_empty() {
            if join_type.keeps_left() {
                pairs.push(l as i64, ABSENT_ROW);
            }
            continue;
        }
        for &r in matches {
            right_matched[r] = true;
            pairs.push(l as i64, r as i64);
        }
    }

    if join_type.keeps_right() {
        for (r, _) in right_matched.iter().enumerate().filter(|(_, m)| !**m) {
            pairs.push(ABSENT_ROW, r as i64);
        }
    }
    pairs
}

fn hash_probe(left: &ColumnData, right: &ColumnData) -> Vec<Matches> {
    let mut table: AHashMap<KeyRef<'_>, Matches> = AHashMap::with_capacity(right.len());
    for r in 0..right.len() {
        if let Some(key) = KeyRef::of(right, r, false) {
            table.entry(key).or_default().push(r);
        }
    }

    let probe = |l: usize| -> Matches {
        KeyRef::of(left, l, false)
            .and_then(|key| table.get(&key).cloned())
            .unwrap_or_default()
    };

    if left.len() >= PARALLEL_THRESHOLD {
        (0..left.len()).into_par_iter().map(probe).collect()
    } else {
        (0..left.len()).map(probe).collect()
    }
}

fn nested_loop(left: &ColumnData, right: &ColumnData) -> Vec<Matches> {
    let right_keys: Vec<Option<KeyRef<'_>>> =
        (0..right.len()).map(|r| KeyRef::of(right, r, false)).collect();

    let scan = |l: usize| -> Matches {
        let Some(key) = KeyRef::of(left, l, false) else {
            return Matches::new();
        };
        right_keys
            .iter()
            .enumerate()
            .filter(|(_, rk)| **rk == Some(key))
            .map(|(r, _)| r)
            .collect()
    };

    if left.len() >= PARALLEL_THRESHOLD {
        (0..left.len()).into_par_iter().map(scan).collect()
    } else {
        (0..left.len()).map(scan).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sides() -> (ColumnData, ColumnData) {
        (
            ColumnData::Int32(vec![1, 2, 3, 2]),
            ColumnData::Int32(vec![2, 4, 1, 2]),
        )
    }

    #[test]
    fn inner_join_pairs_in_left_major_order() {
        let (l, r) = sides();
        let pairs = join(&l, &r, JoinType::Inner);
        assert_eq!(pairs.left, vec![0, 1, 1, 3, 3]);
        assert_eq!(pairs.right, vec![2, 0, 3, 0, 3]);
    }

    #[test]
    fn left_join_marks_unmatched_left() {
        let (l, r) = sides();
        let pairs = join(&l, &r, JoinType::Left);
        assert_eq!(pairs.len(), 6);
        assert_eq!((pairs.left[3], pairs.right[3]), (2, ABSENT_ROW));
    }

    #[test]
    fn right_and_full_append_unmatched_right() {
        let (l, r) = sides();
        let right = join(&l, &r, JoinType::Right);
        assert_eq!(right.len(), 6);
        assert_eq!((right.left[5], right.right[5]), (ABSENT_ROW, 1));

        let full = join(&l, &r, JoinType::Full);
        assert_eq!(full.len(), 7);
        assert_eq!(full.left.iter().filter(|&&x| x == ABSENT_ROW).count(), 1);
        assert_eq!(full.right.iter().filter(|&&x| x == ABSENT_ROW).count(), 1);
    }

    #[test]
    fn hash_and_nested_loop_agree() {
        let l = ColumnData::Int64((0..1500).map(|i| i % 37).collect());
        let r = ColumnData::Int64((0..300).map(|i| i % 41).collect());
        assert_eq!(hash_probe(&l, &r), nested_loop(&l, &r));
    }

    #[test]
    fn nan_keys_never_match() {
        let l = ColumnData::Float64(vec![f64::NAN, 1.0]);
        let r = ColumnData::Float64(vec![f64::NAN, 1.0]);
        let pairs = join(&l, &r, JoinType::Full);
        assert_eq!(pairs.left, vec![0, 1, ABSENT_ROW]);
        assert_eq!(pairs.right, vec![ABSENT_ROW, 1, 0]);
    }

    #[test]
    fn string_keys() {
        let l = ColumnData::Utf8(vec!["a".into(), "b".into()]);
        let r = ColumnData::Utf8(vec!["b".into(), "c".into()]);
        let pairs = join(&l, &r, JoinType::Inner);
        assert_eq!((pairs.left, pairs.right), (vec![1], vec![0]));
    }
}
