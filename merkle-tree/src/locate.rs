// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_node::Node;
use merkle_route::Route;

/// Follows `route` from `root`, one child index at a time. Per §4.4's
/// edge-case policy, an index past the end of a parent (or a route that
/// continues below a leaf) resolves to `None` rather than an error.
pub fn node_at(root: &Node, route: &Route) -> Option<Node> {
    let mut current = root.clone();
    for step in route.iter() {
        match current.get_child(step as usize) {
            Ok(Some(child)) => current = child,
            _ => return None,
        }
    }
    Some(current)
}
