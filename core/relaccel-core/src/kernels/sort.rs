//! Stable sort permutation.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::frame::ColumnData;

const PARALLEL_THRESHOLD: usize = 1000;

/// Row order that sorts `column`. Equal keys keep input order in both
/// directions; floats use IEEE total order.
pub(crate) fn sort_indices(column: &ColumnData, ascending: bool) -> Vec<usize> {
    match column {
        ColumnData::Int32(v) => permutation(v, ascending, Ord::cmp),
        ColumnData::Int64(v) => permutation(v, ascending, Ord::cmp),
        ColumnData::Float32(v) => permutation(v, ascending, f32::total_cmp),
        ColumnData::Float64(v) => permutation(v, ascending, f64::total_cmp),
        ColumnData::Utf8(v) => permutation(v, ascending, Ord::cmp),
    }
}

fn permutation<T: Sync>(
    values: &[T],
    ascending: bool,
    cmp: impl Fn(&T, &T) -> Ordering + Sync,
) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    let order = |a: &usize, b: &usize| {
        let o = cmp(&values[*a], &values[*b]);
        if ascending { o } else { o.reverse() }
    };
    if indices.len() >= PARALLEL_THRESHOLD {
        indices.par_sort_by(order);
    } else {
        indices.sort_by(order);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_and_descending() {
        let col = ColumnData::Int64(vec![3, 1, 2]);
        assert_eq!(sort_indices(&col, true), vec![1, 2, 0]);
        assert_eq!(sort_indices(&col, false), vec![0, 2, 1]);
    }

    #[test]
    fn ties_keep_input_order() {
        let col = ColumnData::Int32(vec![2, 1, 2, 1]);
        assert_eq!(sort_indices(&col, true), vec![1, 3, 0, 2]);
        assert_eq!(sort_indices(&col, false), vec![0, 2, 1, 3]);
    }

    #[test]
    fn nan_sorts_last_ascending() {
        let col = ColumnData::Float32(vec![f32::NAN, -1.0, 0.5]);
        assert_eq!(sort_indices(&col, true), vec![1, 2, 0]);
    }

    #[test]
    fn large_inputs_use_the_parallel_path() {
        let values: Vec<i64> = (0..5000).map(|i| (i * 7919) % 1000).collect();
        let indices = sort_indices(&ColumnData::Int64(values.clone()), true);
        assert!(indices.windows(2).all(|w| {
            let (a, b) = (values[w[0]], values[w[1]]);
            a < b || (a == b && w[0] < w[1])
        }));
    }
}
