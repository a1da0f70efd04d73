// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_route::RouteError;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum NodeError {
    #[error("cannot change the route of a node with {refcount} live references")]
    MerkleRouteError { refcount: i64 },
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("node is immutable (already copied, or released)")]
    MutabilityError,
    #[error("child index {index} is outside the declared range [{min}, {max}]")]
    IllegalChildIndexError { index: usize, min: usize, max: usize },
    #[error("release() called on a node whose reference count is already {0}")]
    ReferenceCountError(i64),
    #[error("operation attempted on a released node")]
    UseAfterRelease,
    #[error("node is not an internal node")]
    NotInternal,
    #[error("node is not a leaf node")]
    NotLeaf,
}
