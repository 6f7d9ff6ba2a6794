//! Property tests for round-based bulk memoization.
//!
//! Random sequences of rounds are replayed against a trivial reference: the
//! set of `(key, arg)` pairs requested in the previous round.

use std::{
    cell::Cell,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use prism_memo::{BulkMemoizer, MemoError, ValueMemoizer};
use proptest::prelude::*;

/// One round: distinct keys with a small argument each.
fn round_strategy() -> impl Strategy<Value = BTreeMap<u8, u8>> {
    prop::collection::btree_map(0u8..16, 0u8..3, 0..12)
}

proptest! {
    /// PROPERTY: after every round the cache holds exactly the keys requested
    /// in that round, and the function only ran for keys whose argument differs
    /// from the previous round (or that were absent from it).
    #[test]
    fn prop_mark_and_sweep(rounds in prop::collection::vec(round_strategy(), 1..20)) {
        let calls = Rc::new(Cell::new(0u64));
        let counter = Rc::clone(&calls);
        let mut memo = BulkMemoizer::new(move |key: &u8, arg: &u8| {
            counter.set(counter.get() + 1);
            u16::from(*key) * 10 + u16::from(*arg)
        });

        let mut previous: BTreeMap<u8, u8> = BTreeMap::new();

        for round in rounds {
            let before = calls.get();
            let results = memo
                .run_round(|r| -> Result<Vec<u16>, MemoError> {
                    round.iter().map(|(k, a)| r.call(*k, *a)).collect()
                })
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let expected_calls =
                round.iter().filter(|(k, a)| previous.get(*k) != Some(*a)).count() as u64;
            prop_assert_eq!(calls.get() - before, expected_calls);

            let expected_results: Vec<u16> =
                round.iter().map(|(k, a)| u16::from(*k) * 10 + u16::from(*a)).collect();
            prop_assert_eq!(results, expected_results);

            let cached: BTreeSet<u8> = memo.keys().copied().collect();
            let requested: BTreeSet<u8> = round.keys().copied().collect();
            prop_assert_eq!(cached, requested);

            previous = round;
        }
    }

    /// PROPERTY: the value memoizer never evicts, one entry per distinct tuple.
    #[test]
    fn prop_value_memoizer_entry_per_distinct_tuple(
        args in prop::collection::vec((0u8..8, prop::bool::ANY), 0..64)
    ) {
        let mut memo = ValueMemoizer::new(|(n, flag): &(u8, bool)| (*n, *flag));
        for a in &args {
            prop_assert_eq!(memo.call(a).map_err(|e| TestCaseError::fail(e.to_string()))?, *a);
        }

        let distinct: BTreeSet<_> = args.iter().collect();
        prop_assert_eq!(memo.len(), distinct.len());
    }
}
