// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::node::Node;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// How `copy()` propagates to an internal node's descendants, per §3
/// "Copy strategies".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CopyStrategy {
    /// Recursively copies all descendants. O(n).
    Cascading,
    /// Copies only the subtree root; descendants are shared by reference
    /// and lazily re-created on mutation via path replacement. O(log n)
    /// per mutation. The default, and the one that makes snapshots cheap.
    SmartPathReplacing,
    /// Copies only this node's own metadata; descendants are left for an
    /// ancestor's copy pass to re-attach.
    SelfOnly,
}

pub(crate) struct InternalData {
    pub(crate) children: RwLock<Vec<Option<Node>>>,
    pub(crate) min_children: usize,
    pub(crate) max_children: usize,
    pub(crate) copy_strategy: CopyStrategy,
}

impl InternalData {
    pub(crate) fn new(min_children: usize, max_children: usize, copy_strategy: CopyStrategy) -> Self {
        Self {
            children: RwLock::new(vec![None; max_children]),
            min_children,
            max_children,
            copy_strategy,
        }
    }
}
