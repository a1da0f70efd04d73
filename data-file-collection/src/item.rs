// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Anything the collection can persist. `key` is the long-valued identity
/// used by the external index and by the merge's ordering/tie-break rules;
/// it need not be stored redundantly inside the serialized bytes but usually
/// is, since most callers also want it back out of `readDataItem`.
pub trait DataItem: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn key(&self) -> u64;
}
