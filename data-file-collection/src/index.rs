// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The external long-list index (§4.6, §5) is owned outside this crate in a
//! full deployment; the collection only ever touches it through this trait,
//! and in particular only ever mutates it via the put-if-equal primitive the
//! merge algorithm needs. [`InMemoryIndex`] is a reference implementation
//! used by this crate's own tests.

use merkle_node::DataLocation;
use parking_lot::RwLock;
use std::collections::HashMap;

pub trait ExternalIndex: Send + Sync {
    fn get(&self, key: u64) -> Option<DataLocation>;

    fn put(&self, key: u64, location: DataLocation);

    /// Updates `key` to `new` iff its current value equals `expected`.
    /// Returns whether the swap took place.
    fn compare_and_swap(&self, key: u64, expected: Option<DataLocation>, new: Option<DataLocation>) -> bool;
}

#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<u64, DataLocation>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExternalIndex for InMemoryIndex {
    fn get(&self, key: u64) -> Option<DataLocation> {
        self.entries.read().get(&key).copied()
    }

    fn put(&self, key: u64, location: DataLocation) {
        self.entries.write().insert(key, location);
    }

    fn compare_and_swap(&self, key: u64, expected: Option<DataLocation>, new: Option<DataLocation>) -> bool {
        let mut entries = self.entries.write();
        if entries.get(&key).copied() != expected {
            return false;
        }
        match new {
            Some(location) => {
                entries.insert(key, location);
            }
            None => {
                entries.remove(&key);
            }
        }
        true
    }
}


#[cfg(any(test, feature = "fuzzing"))]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Clone, Debug)]
    enum Op {
        Cas { key: u64, expected_matches: bool, new: Option<u64> },
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        (0u64..4, any::<bool>(), proptest::option::of(0u64..8))
            .prop_map(|(key, expected_matches, new)| Op::Cas { key, expected_matches, new })
    }

    fn loc_of(tag: u64) -> DataLocation {
        DataLocation::new(tag as u32, tag)
    }

    proptest! {
        // §8 invariant 6: compare_and_swap only ever mutates the index when
        // the caller's `expected` matches the current value, and a model
        // HashMap driven by the same rule always agrees with the index.
        #[test]
        fn compare_and_swap_matches_a_reference_model(ops in proptest::collection::vec(arb_op(), 1..40)) {
            let index = InMemoryIndex::new();
            let mut model: HashMap<u64, u64> = HashMap::new();

            for op in ops {
                let Op::Cas { key, expected_matches, new } = op;
                // Derive an `expected` that either truly matches the model's
                // current value (exercising the success path) or is
                // deliberately wrong (exercising the rejection path).
                let current = model.get(&key).copied();
                let expected = if expected_matches {
                    current
                } else {
                    current.map(|v| v.wrapping_add(1)).or(Some(0))
                };
                let really_matches = expected == current;

                let accepted = index.compare_and_swap(key, expected.map(loc_of), new.map(loc_of));
                prop_assert_eq!(accepted, really_matches);

                if really_matches {
                    match new {
                        Some(v) => { model.insert(key, v); }
                        None => { model.remove(&key); }
                    }
                }
                prop_assert_eq!(index.get(key), model.get(&key).copied().map(loc_of));
            }
        }
    }
}
