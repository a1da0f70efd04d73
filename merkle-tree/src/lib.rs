// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Traversal, routing, and copy-on-write path replacement (§4.4): the
//! operations that let application code read and mutate a tree without
//! ever storing a back-reference from child to parent.

mod errors;
mod init;
mod locate;
mod replace;
mod traversal;

pub use errors::TreeError;
pub use init::InitializationIter;
pub use locate::node_at;
pub use replace::replace_path;
pub use traversal::{BreadthFirstIter, DepthFirstIter, Traversal};
