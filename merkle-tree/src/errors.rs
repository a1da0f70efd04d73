// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_node::NodeError;
use merkle_route::RouteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("stop distance exceeds the route's depth")]
    StopDistanceExceedsDepth,
    #[error("route does not resolve to an existing node above the stop distance")]
    RouteNotFound,
}
