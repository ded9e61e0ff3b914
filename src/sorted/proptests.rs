use super::*;

use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Clone, Debug)]
enum Op {
    Add(u16),
    Remove(u16),
    Range(usize, usize, bool),
    Retain(usize),
    RemoveRange(usize, usize),
    Contains(u16),
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let value = 0u16..512;
    let op = prop_oneof![
        40 => value.clone().prop_map(Op::Add),
        20 => value.clone().prop_map(Op::Remove),
        20 => (0usize..300, 0usize..40, any::<bool>()).prop_map(|(s, l, sorted)| Op::Range(s, l, sorted)),
        3 => (0usize..400).prop_map(Op::Retain),
        5 => (0usize..300, 0usize..60).prop_map(|(s, l)| Op::RemoveRange(s, l)),
        12 => value.prop_map(Op::Contains),
    ];
    prop::collection::vec(op, 0..=600)
}

fn run(ops: Vec<Op>, verify: bool) -> Result<(), TestCaseError> {
    let mut c = LazySortedCollection::new(SortOrder::natural());
    c.set_verify(verify);
    let mut m: BTreeSet<u16> = BTreeSet::new();

    for op in ops {
        match op {
            Op::Add(v) => {
                if m.insert(v) {
                    c.add(v);
                }
            }
            Op::Remove(v) => {
                m.remove(&v);
                c.remove(&v);
            }
            Op::Range(start, len, sorted) => {
                let mut got = c.range(start, len, sorted);
                if !sorted {
                    got.sort();
                }
                let expected: Vec<u16> = m.iter().copied().skip(start).take(len).collect();
                prop_assert_eq!(got, expected);
            }
            Op::Retain(n) => {
                c.retain(n);
                m = m.iter().copied().take(n).collect();
            }
            Op::RemoveRange(start, len) => {
                c.remove_range_now(start, len);
                let doomed: Vec<u16> = m.iter().copied().skip(start).take(len).collect();
                for v in doomed {
                    m.remove(&v);
                }
            }
            Op::Contains(v) => {
                prop_assert_eq!(c.contains(&v), m.contains(&v));
            }
        }
        prop_assert_eq!(c.len(), m.len());
    }

    c.check_invariants();
    let expected: Vec<u16> = m.into_iter().collect();
    prop_assert_eq!(c.items(true), expected);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_sorted_set(ops in ops_strategy()) {
        run(ops, true)?;
    }

    #[test]
    fn prop_matches_sorted_set_with_promotion(ops in ops_strategy()) {
        run(ops, false)?;
    }
}
