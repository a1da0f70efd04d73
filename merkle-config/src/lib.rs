// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! A single immutable configuration record, built once at startup and
//! passed by reference into every component. See DESIGN NOTES: "Global
//! mutable settings singletons" in the core spec — this is the neutral
//! replacement for that pattern.

use serde::{Deserialize, Serialize};

/// Tunables for every component of the merkle core. Construct one with
/// [`MerkleConfig::default`] or deserialize one from the embedding
/// application's own configuration layer (out of scope for this crate).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleConfig {
    /// Worker thread count for the hash engine (C3).
    pub hash_engine_threads: usize,
    /// Bound on the reconnect protocol's outbound message queue (C5).
    pub reconnect_queue_depth: usize,
    /// Bound on the reconnect protocol's teacher breadth-first handle queue (C5).
    pub reconnect_handle_queue_depth: usize,
    /// Maximum number of data items a single merge output file may hold
    /// before it is finalized and a fresh output opens (C6).
    pub merge_max_items_per_file: usize,
    /// Maximum byte size of a single merge output file (C6).
    pub merge_max_bytes_per_file: u64,
    /// Number of times `readUsingIndex` retries a transient resolution
    /// failure before giving up (C6).
    pub read_using_index_retries: usize,
    /// File name prefix for data files and the metadata sidecar (C6).
    pub store_name: String,
}

impl Default for MerkleConfig {
    fn default() -> Self {
        Self {
            hash_engine_threads: num_cpus_fallback(),
            reconnect_queue_depth: 256,
            reconnect_handle_queue_depth: 1024,
            merge_max_items_per_file: 1_000_000,
            merge_max_bytes_per_file: 1 << 30,
            read_using_index_retries: 5,
            store_name: "merkle".to_string(),
        }
    }
}

/// Conservative thread count guess without pulling in the `num_cpus` crate
/// for a single call site; callers embedding this in a real service are
/// expected to override `hash_engine_threads` from their own config loader.
fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let config = MerkleConfig::default();
        assert!(config.hash_engine_threads >= 1);
        assert!(config.reconnect_queue_depth > 0);
        assert_eq!(config.read_using_index_retries, 5);
    }

    #[test]
    fn config_round_trips_through_serde_json() {
        let config = MerkleConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let decoded: MerkleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
