use crate::{MemStorage, Storage, StorageExt, StorageLength};
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

const MAX_STORAGE_SIZE: usize = 64 * 1024;

fn storage_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=MAX_STORAGE_SIZE)
}

/// Storage contents plus a window `(start, len)` lying inside it.
fn storage_and_window() -> impl Strategy<Value = (Vec<u8>, u64, u64)> {
    storage_bytes().prop_flat_map(|data| {
        let size = data.len() as u64;
        (Just(data), 0..=size).prop_flat_map(move |(data, start)| {
            (Just(data), Just(start), 0..=size - start)
        })
    })
}

fn check_window_reads_match_parent(
    data: Vec<u8>,
    start: u64,
    len: u64,
    pick: (u64, u64),
) -> TestCaseResult {
    let mut parent = MemStorage::from_vec(data.clone());
    let mut window = (&mut parent).slice_range(start, len).map_err(|e| {
        TestCaseError::fail(format!("slice_range({start}, {len}) failed: {e}"))
    })?;
    prop_assert_eq!(window.length().ok(), Some(StorageLength::Bounded(len)));

    let offset = pick.0 % (len + 1);
    let read_len = (pick.1 % (len - offset + 1)) as usize;
    let mut buf = vec![0u8; read_len];
    prop_assert!(window.read_at(offset, &mut buf).is_ok());

    let abs = (start + offset) as usize;
    prop_assert_eq!(&buf[..], &data[abs..abs + read_len]);

    // One byte past the window end is always rejected, even when the parent has room.
    let mut one = [0u8; 1];
    prop_assert!(window.read_at(len, &mut one).is_err());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn window_reads_match_parent_at_translated_offsets(
        (data, start, len) in storage_and_window(),
        pick in (any::<u64>(), any::<u64>()),
    ) {
        check_window_reads_match_parent(data, start, len, pick)?;
    }

    #[test]
    fn nested_windows_match_a_single_flat_window(
        (data, outer_start, outer_len) in storage_and_window(),
        inner in (any::<u64>(), any::<u64>()),
    ) {
        let inner_start = inner.0 % (outer_len + 1);
        let inner_len = inner.1 % (outer_len - inner_start + 1);

        let mut nested_parent = MemStorage::from_vec(data.clone());
        let mut nested = (&mut nested_parent)
            .slice_range(outer_start, outer_len)
            .and_then(|w| w.slice_range(inner_start, inner_len))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut flat_parent = MemStorage::from_vec(data);
        let mut flat = (&mut flat_parent)
            .slice_range(outer_start + inner_start, inner_len)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(nested.start(), flat.start());
        prop_assert_eq!(nested.len(), flat.len());

        let mut a = vec![0u8; inner_len as usize];
        let mut b = vec![0u8; inner_len as usize];
        prop_assert!(nested.read_at(0, &mut a).is_ok());
        prop_assert!(flat.read_at(0, &mut b).is_ok());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn copy_between_differing_lengths_copies_the_shorter_extent(
        input in prop::collection::vec(any::<u8>(), 0..4096),
        output_len in 0usize..4096,
        fill in any::<u8>(),
    ) {
        let mut src = MemStorage::from_vec(input.clone());
        let mut dst = MemStorage::from_vec(vec![fill; output_len]);

        let copied = crate::copy(&mut src, &mut dst, None)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let expected = input.len().min(output_len);
        prop_assert_eq!(copied, expected as u64);

        let out = dst.as_slice();
        prop_assert_eq!(&out[..expected], &input[..expected]);
        prop_assert!(out[expected..].iter().all(|b| *b == fill));
    }
}
