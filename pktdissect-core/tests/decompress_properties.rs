//! Property-based tests for the LZ77 and LZNT1 codecs.
//!
//! - compress then decompress reproduces the input
//! - arbitrary input never panics and never exceeds the output limit

use pktdissect_core::decompress::{Algorithm, DEFAULT_MAX_OUTPUT};
use pktdissect_core::error::DecompressError;
use proptest::prelude::*;

const ALGORITHMS: [Algorithm; 2] = [Algorithm::Lz77, Algorithm::Lznt1];

// Mostly-repetitive data so the encoders emit matches, not just literals.
fn repetitive_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        (prop::collection::vec(any::<u8>(), 1..8), 1usize..64),
        0..32,
    )
    .prop_map(|runs| {
        runs.into_iter()
            .flat_map(|(pattern, repeat)| pattern.repeat(repeat))
            .collect()
    })
}

fn round_trip(algorithm: Algorithm, input: &[u8]) -> Vec<u8> {
    let packed = algorithm.compress(input);
    let out = algorithm
        .decompress(&packed, DEFAULT_MAX_OUTPUT)
        .unwrap_or_else(|e| panic!("{algorithm}: {e}"));
    out.data.to_vec()
}

proptest! {
    #[test]
    fn prop_round_trip_random(input in prop::collection::vec(any::<u8>(), 0..2048)) {
        for algorithm in ALGORITHMS {
            prop_assert_eq!(round_trip(algorithm, &input), input.clone());
        }
    }

    #[test]
    fn prop_round_trip_repetitive(input in repetitive_strategy()) {
        for algorithm in ALGORITHMS {
            prop_assert_eq!(round_trip(algorithm, &input), input.clone());
        }
    }

    #[test]
    fn prop_arbitrary_input_is_total(
        input in prop::collection::vec(any::<u8>(), 0..512),
        limit in 1usize..8192,
    ) {
        for algorithm in ALGORITHMS {
            match algorithm.decompress(&input, limit) {
                Ok(out) => {
                    prop_assert!(out.data.len() <= limit);
                    prop_assert!(out.consumed <= input.len());
                }
                Err(DecompressError::OutputLimit { limit: reported }) => {
                    prop_assert_eq!(reported, limit);
                }
                Err(_) => {}
            }
        }
    }
}

#[test]
fn test_edge_lengths_round_trip() {
    let long: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8 ^ (i / 4096) as u8).collect();
    for algorithm in ALGORITHMS {
        assert!(round_trip(algorithm, &[]).is_empty(), "{algorithm}");
        assert_eq!(round_trip(algorithm, &[0x42]), vec![0x42], "{algorithm}");
        assert_eq!(round_trip(algorithm, &long), long, "{algorithm}");
    }
}

#[test]
fn test_limit_is_enforced_on_expansion() {
    let zeros = vec![0u8; 200_000];
    for algorithm in ALGORITHMS {
        let packed = algorithm.compress(&zeros);
        assert!(packed.len() < zeros.len() / 20, "{algorithm}");
        assert_eq!(
            algorithm.decompress(&packed, 100_000).unwrap_err(),
            DecompressError::OutputLimit { limit: 100_000 }
        );
        assert_eq!(algorithm.decompress(&packed, 200_000).unwrap().data.len(), 200_000);
    }
}
