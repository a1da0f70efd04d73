// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cryptographic hashing and validation for the merkle core (component C3).
//!
//! This crate owns the digest, the `HashValue` type nodes and protocol
//! messages are addressed by, the worker-pool-backed [`HashEngine`], and the
//! [`Validator`] state machine the synchronization protocol polls while
//! validating incoming subtrees.

mod digest;
mod engine;
mod hash_value;
mod hashable;
mod validator;

pub use digest::{digest, hash_internal, hash_leaf, NULL_HASH};
pub use engine::{HashEngine, HashFuture};
pub use hash_value::{EmptyHashValueError, HashValue, HASH_LENGTH};
pub use hashable::{hash_node, hash_tree_recursive, ChildHashSlot, HashError, Hashable, TreeWalkable};
pub use validator::Validator;
