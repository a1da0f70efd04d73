// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::digest::{hash_internal, hash_leaf, NULL_HASH};
use crate::hash_value::HashValue;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum HashError {
    #[error("node at slot {0} has a child but that child has not yet been hashed")]
    DescendantUnhashed(usize),
    #[error("expected hash {expected} but computed {actual}")]
    Mismatch { expected: HashValue, actual: HashValue },
    #[error("hash engine worker pool is shut down")]
    EngineShutDown,
}

/// What occupies a given child slot of an internal node, from the hash
/// engine's point of view.
#[derive(Clone, Copy, Debug)]
pub enum ChildHashSlot {
    /// No child was ever adopted into this slot.
    Empty,
    /// A child is adopted but its own hash has not been computed yet.
    Unhashed,
    /// A child is adopted and its hash is known.
    Hashed(HashValue),
}

/// The minimal read-only view the hash engine needs of a node to compute or
/// validate its hash. Object-safe: used both for the synchronous `hash_node`
/// entry point and as a supertrait of [`TreeWalkable`].
pub trait Hashable: Send + Sync {
    fn class_id(&self) -> u64;
    fn version(&self) -> i32;
    fn is_leaf(&self) -> bool;
    /// `Some` for leaves only.
    fn leaf_payload(&self) -> Option<Vec<u8>>;
    /// Highest occupied-or-not slot index plus one; `0` for leaves.
    fn declared_slots(&self) -> usize;
    fn child_slot(&self, index: usize) -> ChildHashSlot;
}

/// Computes the hash of a single node, synchronously. Fails if any adopted
/// child's hash has not yet been computed (the engine's contract forbids
/// hashing an internal node out of bottom-up order).
pub fn hash_node(node: &dyn Hashable) -> Result<HashValue, HashError> {
    if node.is_leaf() {
        let payload = node.leaf_payload().unwrap_or_default();
        return Ok(hash_leaf(node.class_id(), node.version(), &payload));
    }
    let mut child_hashes = Vec::with_capacity(node.declared_slots());
    for i in 0..node.declared_slots() {
        let h = match node.child_slot(i) {
            ChildHashSlot::Empty => *NULL_HASH,
            ChildHashSlot::Unhashed => return Err(HashError::DescendantUnhashed(i)),
            ChildHashSlot::Hashed(h) => h,
        };
        child_hashes.push(h);
    }
    Ok(hash_internal(node.class_id(), node.version(), &child_hashes))
}

/// Extends [`Hashable`] with the ability to walk to children and commit a
/// computed hash, so the engine can recursively hash (or validate) an entire
/// tree rather than a single node. Not object-safe by design — it is only
/// ever used generically, never as `dyn TreeWalkable`.
pub trait TreeWalkable: Hashable + Clone + Send + Sync + 'static {
    fn stored_hash(&self) -> Option<HashValue>;
    fn set_hash(&self, hash: HashValue);
    fn child_node(&self, index: usize) -> Option<Self>
    where
        Self: Sized;
}

/// Recursively (bottom-up) hashes every descendant of `node` that is
/// missing a hash, then `node` itself, writing each computed hash back via
/// `set_hash`. Used by the hash engine's asynchronous `hashTree`.
pub fn hash_tree_recursive<N: TreeWalkable>(node: &N) -> Result<HashValue, HashError> {
    if let Some(h) = node.stored_hash() {
        return Ok(h);
    }
    if !node.is_leaf() {
        for i in 0..node.declared_slots() {
            if let Some(child) = node.child_node(i) {
                hash_tree_recursive(&child)?;
            }
        }
    }
    let h = hash_node(node)?;
    node.set_hash(h);
    Ok(h)
}
