//! Property-based tests for the BFI interval-set algebra.

use nb_eval::bfi::IntervalSet;
use proptest::prelude::*;

const DOMAIN: (i64, i64) = (0, 200);

fn interval_set() -> impl Strategy<Value = IntervalSet> {
    prop::collection::vec((0i64..150, 1i64..50), 0..8)
        .prop_map(|pairs| IntervalSet::from_sorted(pairs.into_iter().map(|(s, l)| (s, s + l)).collect()))
}

proptest! {
    #[test]
    fn intersect_distributes_over_union(a in interval_set(), b in interval_set(), c in interval_set()) {
        let lhs = a.union(&b).intersect(&c);
        let rhs = a.intersect(&c).union(&b.intersect(&c));
        prop_assert_eq!(lhs.as_slice(), rhs.as_slice());
    }

    #[test]
    fn complement_is_its_own_inverse(a in interval_set()) {
        let double = a.complement(DOMAIN).complement(DOMAIN);
        prop_assert_eq!(double.as_slice(), a.as_slice());
    }

    #[test]
    fn a_and_not_a_never_overlap(a in interval_set()) {
        let not_a = a.complement(DOMAIN);
        prop_assert!(a.intersect(&not_a).is_empty());
    }

    #[test]
    fn union_is_commutative(a in interval_set(), b in interval_set()) {
        prop_assert_eq!(a.union(&b).as_slice(), b.union(&a).as_slice());
    }

    #[test]
    fn contains_agrees_with_membership_in_any_source_interval(a in interval_set(), t in 0i64..200) {
        let in_set = a.contains(t);
        let in_any = a.as_slice().iter().any(|&(s, e)| t >= s && t < e);
        prop_assert_eq!(in_set, in_any);
    }
}
