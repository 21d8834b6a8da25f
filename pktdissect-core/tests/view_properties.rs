//! Property-based tests for byte views.
//!
//! - Nested subsets read the same bytes as the equivalent single subset
//! - Every read either returns exactly the requested bytes or faults, and the
//!   fault kind depends only on captured vs reported length
//! - A composite reads like the concatenation of its members

use pktdissect_core::error::FaultKind;
use pktdissect_core::tvb::{Endian, View};
use proptest::prelude::*;

// Bytes plus a reported length at or beyond the captured length.
fn snapped_strategy() -> impl Strategy<Value = (Vec<u8>, usize)> {
    prop::collection::vec(any::<u8>(), 0..256)
        .prop_flat_map(|bytes| {
            let len = bytes.len();
            (Just(bytes), len..len + 64)
        })
}

// Non-empty chunks for composite members.
fn chunks_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 1..8)
}

proptest! {
    #[test]
    fn prop_nested_subset_matches_flat_subset(
        bytes in prop::collection::vec(any::<u8>(), 0..256),
        a in 0usize..256,
        b in 0usize..256,
        c in 0usize..256,
        d in 0usize..256,
    ) {
        let view = View::new(bytes.clone());
        let a = a % (bytes.len() + 1);
        let b = b % (bytes.len() - a + 1);
        let c = c % (b + 1);
        let d = d % (b - c + 1);

        let nested = view.subset(a, b).unwrap().subset(c, d).unwrap();
        let flat = view.subset(a + c, d).unwrap();
        prop_assert_eq!(nested.captured_len(), d);
        prop_assert_eq!(nested.to_bytes(), flat.to_bytes());
        prop_assert_eq!(&nested.to_bytes()[..], &bytes[a + c..a + c + d]);
    }

    #[test]
    fn prop_reads_are_exact_or_fault(
        (bytes, reported) in snapped_strategy(),
        offset in 0usize..400,
        length in 0usize..400,
    ) {
        let view = View::with_reported_length(bytes.clone(), reported);
        match view.get_bytes(offset, length) {
            Ok(read) => {
                prop_assert!(offset + length <= bytes.len());
                prop_assert_eq!(&read[..], &bytes[offset..offset + length]);
            }
            Err(fault) => {
                prop_assert!(offset + length > bytes.len());
                let expected = if offset + length <= reported {
                    FaultKind::Truncated
                } else {
                    FaultKind::Malformed
                };
                prop_assert_eq!(fault.kind, expected);
            }
        }
    }

    #[test]
    fn prop_subset_validates_against_reported_length(
        (bytes, reported) in snapped_strategy(),
        offset in 0usize..400,
        length in 0usize..400,
    ) {
        let view = View::with_reported_length(bytes.clone(), reported);
        match view.subset(offset, length) {
            Ok(sub) => {
                prop_assert!(offset + length <= reported);
                prop_assert_eq!(sub.reported_len(), length);
                prop_assert!(sub.captured_len() <= length);
                prop_assert_eq!(sub.captured_len(), length.min(bytes.len().saturating_sub(offset)));
            }
            Err(fault) => {
                prop_assert!(offset + length > reported);
                prop_assert_eq!(fault.kind, FaultKind::Malformed);
            }
        }
    }

    #[test]
    fn prop_composite_reads_like_concatenation(chunks in chunks_strategy(), offset in 0usize..256) {
        let joined: Vec<u8> = chunks.concat();
        let flat = View::new(joined.clone());
        let composite = View::composite(chunks.iter().cloned().map(View::new)).unwrap();

        prop_assert_eq!(composite.captured_len(), joined.len());
        prop_assert_eq!(composite.to_bytes(), flat.to_bytes());
        prop_assert_eq!(
            composite.get_u32(offset, Endian::Little).ok(),
            flat.get_u32(offset, Endian::Little).ok()
        );
        prop_assert_eq!(
            composite.get_u16(offset, Endian::Big).ok(),
            flat.get_u16(offset, Endian::Big).ok()
        );
        let tail = offset.min(joined.len());
        prop_assert_eq!(
            composite.subset(tail, ..).unwrap().to_bytes(),
            flat.subset(tail, ..).unwrap().to_bytes()
        );
    }
}

#[test]
fn test_composite_rejects_empty_members() {
    let empty = View::new(Vec::new());
    assert!(View::composite([View::new(vec![1]), empty]).is_err());
    assert!(View::composite(Vec::<View>::new()).is_err());
}
