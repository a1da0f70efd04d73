// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Opaque handle returned by the data file collection (C6) for a leaf
/// payload stored externally rather than inline. `(file_index, byte_offset)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DataLocation {
    pub file_index: u32,
    pub byte_offset: u64,
}

impl DataLocation {
    pub fn new(file_index: u32, byte_offset: u64) -> Self {
        Self { file_index, byte_offset }
    }
}

pub(crate) struct LeafData {
    pub(crate) payload: Vec<u8>,
    pub(crate) external: RwLock<bool>,
    pub(crate) external_location: RwLock<Option<DataLocation>>,
}

impl LeafData {
    pub(crate) fn new(payload: Vec<u8>, external: bool) -> Self {
        Self {
            payload,
            external: RwLock::new(external),
            external_location: RwLock::new(None),
        }
    }
}
