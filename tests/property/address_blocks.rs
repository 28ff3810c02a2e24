// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Address Carving

use layered_stack::domain::CidrBlock;
use proptest::prelude::*;
use std::net::Ipv4Addr;

fn parent_block() -> impl Strategy<Value = CidrBlock> {
    (any::<u8>(), 8u8..=24).prop_map(|(second, prefix)| {
        let bits = u32::from(Ipv4Addr::new(10, second, 0, 0));
        let mask = u32::MAX << (32 - u32::from(prefix));
        CidrBlock::from_parts(Ipv4Addr::from(bits & mask), prefix).expect("aligned block")
    })
}

proptest! {
    /// Carved subnets never overlap and stay inside the parent
    #[test]
    fn prop_carved_subnets_are_disjoint(
        parent in parent_block(),
        offsets in prop::collection::vec(1u8..=8, 1..8),
    ) {
        let masks: Vec<u8> = offsets
            .iter()
            .map(|o| (parent.prefix_length() + o).min(32))
            .collect();

        if let Ok(subnets) = parent.carve(&masks) {
            prop_assert_eq!(subnets.len(), masks.len());
            for (i, a) in subnets.iter().enumerate() {
                prop_assert!(parent.contains(a));
                prop_assert_eq!(a.prefix_length(), masks[i]);
                for b in subnets.iter().skip(i + 1) {
                    prop_assert!(!a.overlaps(b), "{} overlaps {}", a, b);
                }
            }
        }
    }

    /// Overlap is symmetric and every block overlaps itself
    #[test]
    fn prop_overlap_is_symmetric(a in parent_block(), b in parent_block()) {
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        prop_assert!(a.overlaps(&a));
        if a.contains(&b) {
            prop_assert!(a.overlaps(&b));
        }
    }
}
