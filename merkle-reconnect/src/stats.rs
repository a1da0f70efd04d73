// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Reported by the learner on a successful sync (§4.5.4).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconnectStats {
    pub bytes_transferred: u64,
    pub objects_transferred: u64,
    pub leaf_count: u64,
    pub internal_count: u64,
    pub redundant_count: u64,
    pub sync_duration: Duration,
    pub init_duration: Duration,
}
