// Property tests for transfers and operator invariants.

use proptest::prelude::*;

use relaccel_core::{
    AccelConfig, AggregateType, ColumnData, ColumnType, CompareOp, DeviceContext, HostFrame,
    JoinRequest, JoinType, ScalarValue,
};

fn context() -> DeviceContext {
    let ctx = DeviceContext::new(AccelConfig::default());
    ctx.initialize().unwrap();
    ctx
}

proptest! {
    /// Any prefix of a buffer survives a device round trip byte for byte.
    #[test]
    fn copy_round_trip(bytes in prop::collection::vec(any::<u8>(), 0..512), cut in 0usize..512) {
        let ctx = context();
        let n = cut.min(bytes.len());
        let mut buffer = ctx.allocate(0, bytes.len()).unwrap();
        ctx.copy_to_device(&bytes, &mut buffer, n).unwrap();
        let mut host = vec![0u8; bytes.len()];
        ctx.copy_to_host(&buffer, &mut host, n).unwrap();
        prop_assert_eq!(&host[..n], &bytes[..n]);
    }

    /// Sorting keeps every row and orders the key column.
    #[test]
    fn sort_preserves_cardinality(values in prop::collection::vec(any::<i64>(), 0..300), ascending: bool) {
        let ctx = context();
        let frame = HostFrame::new(vec![ColumnData::Int64(values.clone())]).unwrap();
        let input = ctx.upload_frame(0, &frame).unwrap();
        let mut output = ctx.allocate(0, input.byte_size()).unwrap();
        ctx.sort(&input, &mut output, ColumnType::Int64, 0, ascending).unwrap();
        prop_assert_eq!(output.row_count().unwrap(), values.len());

        let sorted = ctx.download_frame(&output).unwrap();
        let ColumnData::Int64(sorted) = sorted.column(0).unwrap() else {
            panic!("sort changed the column type");
        };
        let mut expected = values;
        expected.sort();
        if !ascending {
            expected.reverse();
        }
        prop_assert_eq!(sorted, &expected);
    }

    /// Filtering the same input twice selects the same rows.
    #[test]
    fn filter_is_deterministic(values in prop::collection::vec(-50i32..50, 0..200), pivot in -50i32..50) {
        let ctx = context();
        let input = ctx
            .upload_frame(0, &HostFrame::new(vec![ColumnData::Int32(values.clone())]).unwrap())
            .unwrap();
        let run = || {
            let mut output = ctx.allocate(0, input.byte_size()).unwrap();
            ctx.filter(&input, &mut output, CompareOp::Lt, ColumnType::Int32, ScalarValue::Int32(pivot), None)
                .unwrap();
            ctx.download_frame(&output).unwrap()
        };
        let first = run();
        prop_assert_eq!(first.row_count(), values.iter().filter(|&&v| v < pivot).count());
        prop_assert_eq!(first, run());
    }

    /// Swapping the sides of an inner join keeps the match count.
    #[test]
    fn inner_join_count_commutes(
        a in prop::collection::vec(0i32..20, 0..60),
        b in prop::collection::vec(0i32..20, 0..60),
    ) {
        let ctx = context();
        let left = ctx.upload_frame(0, &HostFrame::new(vec![ColumnData::Int32(a)]).unwrap()).unwrap();
        let right = ctx.upload_frame(0, &HostFrame::new(vec![ColumnData::Int32(b)]).unwrap()).unwrap();
        let request = JoinRequest {
            join_type: JoinType::Inner,
            left_column: 0,
            right_column: 0,
            column_type: ColumnType::Int32,
        };
        let mut ab = ctx.allocate(0, 60 * 60 * 16).unwrap();
        let mut ba = ctx.allocate(0, 60 * 60 * 16).unwrap();
        ctx.join(&left, &right, &mut ab, &request).unwrap();
        ctx.join(&right, &left, &mut ba, &request).unwrap();
        prop_assert_eq!(ab.row_count().unwrap(), ba.row_count().unwrap());
    }

    /// COUNT equals the row count for every type tag.
    #[test]
    fn count_matches_rows(rows in 0usize..100, tag in 0i32..5) {
        let ctx = context();
        let input = ctx
            .upload_frame(0, &HostFrame::new(vec![ColumnData::Float32(vec![1.0; rows])]).unwrap())
            .unwrap();
        let mut output = ctx.allocate(0, 8).unwrap();
        let tag = ColumnType::try_from(tag).unwrap();
        ctx.aggregate(&input, &mut output, AggregateType::Count, tag, 0).unwrap();
        let frame = ctx.download_frame(&output).unwrap();
        prop_assert_eq!(frame.column(0).unwrap(), &ColumnData::Int64(vec![rows as i64]));
    }
}
