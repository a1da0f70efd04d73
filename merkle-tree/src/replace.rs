// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::errors::TreeError;
use merkle_node::{CopyStrategy, Node};
use merkle_route::Route;

/// Copy-on-writes the chain from `root` down to `stop_distance` levels
/// above the node named by `route`, returning the freshly created nodes in
/// root-to-target order. Every sibling hanging off that chain is preserved
/// by sharing the original reference (refcount increment), not by copying —
/// this is what makes a single mutation cost O(depth) rather than O(size).
///
/// The caller plugs new content into `path.last()` (e.g. via `set_child`),
/// then the original `root` can be dropped (released) independently of the
/// returned snapshot.
pub fn replace_path(root: &Node, route: &Route, stop_distance: usize) -> Result<Vec<Node>, TreeError> {
    let depth = route.depth();
    let steps_to_copy = depth
        .checked_sub(stop_distance)
        .ok_or(TreeError::StopDistanceExceedsDepth)?;

    let mut path = Vec::with_capacity(steps_to_copy + 1);
    let mut current = copy_preserving_siblings(root)?;
    path.push(current.clone());

    for &step in &route.steps()[..steps_to_copy] {
        let index = step as usize;
        let original_child = current.get_child(index).map_err(TreeError::Node)?.ok_or(TreeError::RouteNotFound)?;
        let fresh_child = copy_preserving_siblings(&original_child)?;
        current.set_child(index, Some(fresh_child.clone())).map_err(TreeError::Node)?;
        path.push(fresh_child.clone());
        current = fresh_child;
    }
    Ok(path)
}

/// Copies a single node the way path replacement needs: every other node
/// reachable through it stays reference-identical. Internal nodes whose own
/// class uses [`CopyStrategy::Cascading`] or [`CopyStrategy::SmartPathReplacing`]
/// already behave this way via `copy()`. A [`CopyStrategy::SelfOnly`] class
/// leaves its copy's children empty by design, so this — the ancestor's copy
/// pass the strategy's doc comment refers to — re-attaches the original
/// children by reference before handing the copy back.
fn copy_preserving_siblings(node: &Node) -> Result<Node, TreeError> {
    let copied = node.copy().map_err(TreeError::Node)?;
    if !node.is_leaf() && node.copy_strategy().map_err(TreeError::Node)? == CopyStrategy::SelfOnly {
        let count = node.child_count().map_err(TreeError::Node)?;
        for i in 0..count {
            if let Some(original_child) = node.get_child(i).map_err(TreeError::Node)? {
                copied.set_child(i, Some(original_child)).map_err(TreeError::Node)?;
            }
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deep_tree(depth: usize) -> Node {
        fn build(route: Route, remaining: usize) -> Node {
            if remaining == 0 {
                return Node::new_leaf(2, 0, route, b"leaf".to_vec(), false);
            }
            let node = Node::new_internal(1, 0, route.clone(), 0, 2, CopyStrategy::SmartPathReplacing);
            let left = build(route.child(0).unwrap(), remaining - 1);
            let right = Node::new_leaf(2, 0, route.child(1).unwrap(), b"sibling".to_vec(), false);
            node.set_child(0, Some(left)).unwrap();
            node.set_child(1, Some(right)).unwrap();
            node
        }
        build(Route::root(), depth)
    }

    #[test]
    fn replace_path_allocates_depth_plus_one_fresh_nodes() {
        let depth = 4;
        let root = deep_tree(depth);
        let route = {
            let mut r = Route::root();
            for _ in 0..depth {
                r = r.child(0).unwrap();
            }
            r
        };
        let path = replace_path(&root, &route, 0).unwrap();
        assert_eq!(path.len(), depth + 1);
        // the new root is unattached (refcount 0); every node below it in
        // the chain is freshly reserved by its freshly copied parent.
        assert_eq!(path[0].refcount(), 0);
        for node in &path[1..] {
            assert_eq!(node.refcount(), 1);
        }
    }

    #[test]
    fn siblings_are_shared_by_reference() {
        let root = deep_tree(2);
        let route = Route::root().child(0).unwrap().child(0).unwrap();
        let original_sibling = root.get_child(1).unwrap().unwrap();
        assert_eq!(original_sibling.refcount(), 1);

        let path = replace_path(&root, &route, 0).unwrap();
        let new_root = &path[0];
        let shared_sibling = new_root.get_child(1).unwrap().unwrap();
        assert_eq!(shared_sibling.leaf_payload().unwrap(), original_sibling.leaf_payload().unwrap());
        assert_eq!(shared_sibling.refcount(), original_sibling.refcount());
    }

    #[test]
    fn stop_distance_leaves_target_unreplaced() {
        let root = deep_tree(3);
        let route = Route::root().child(0).unwrap().child(0).unwrap().child(0).unwrap();
        let path = replace_path(&root, &route, 1).unwrap();
        // stop one level above the target: path has `depth` entries, not `depth + 1`
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn stop_distance_exceeding_depth_is_rejected() {
        let root = deep_tree(1);
        let err = replace_path(&root, &Route::root(), 5).unwrap_err();
        assert!(matches!(err, TreeError::StopDistanceExceedsDepth));
    }

    #[test]
    fn self_only_strategy_gets_siblings_reattached_by_the_ancestor() {
        let root = Node::new_internal(1, 0, Route::root(), 0, 2, CopyStrategy::SelfOnly);
        let target = Node::new_leaf(2, 0, Route::root().child(0).unwrap(), b"target".to_vec(), false);
        let sibling = Node::new_leaf(2, 0, Route::root().child(1).unwrap(), b"sibling".to_vec(), false);
        root.set_child(0, Some(target)).unwrap();
        root.set_child(1, Some(sibling.clone())).unwrap();

        let path = replace_path(&root, &Route::root().child(0).unwrap(), 1).unwrap();
        let new_root = &path[0];
        let reattached = new_root.get_child(1).unwrap().unwrap();
        assert_eq!(reattached.leaf_payload().unwrap(), sibling.leaf_payload().unwrap());
    }
}

#[cfg(any(test, feature = "fuzzing"))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A full binary tree of the given depth; child 0 always descends
    /// further, child 1 is always a leaf tagged with its own route so
    /// siblings can be told apart by payload.
    fn binary_tree(route: Route, depth: usize) -> Node {
        if depth == 0 {
            return Node::new_leaf(2, 0, route, route.encode(), false);
        }
        let node = Node::new_internal(1, 0, route.clone(), 0, 2, CopyStrategy::SmartPathReplacing);
        let left = binary_tree(route.child(0).unwrap(), depth - 1);
        let right = Node::new_leaf(2, 0, route.child(1).unwrap(), route.child(1).unwrap().encode(), false);
        node.set_child(0, Some(left)).unwrap();
        node.set_child(1, Some(right)).unwrap();
        node
    }

    // `binary_tree` only ever descends through child 0; child 1 is always a
    // terminal leaf. A valid route into it is therefore all-zero steps with
    // an optional final 0-or-1 step.
    fn arb_target_steps() -> impl Strategy<Value = Vec<u8>> {
        (1usize..5, 0u8..2).prop_map(|(depth, last)| {
            let mut steps = vec![0u8; depth - 1];
            steps.push(last);
            steps
        })
    }

    proptest! {
        // §8 invariant 2: every node on the path to the replaced route is a
        // fresh instance; every node off that path is reference-identical
        // (same payload, refcount bumped by the new path sharing it) to the
        // original.
        #[test]
        fn replace_path_only_touches_the_named_path(steps in arb_target_steps()) {
            let depth = steps.len();
            let route = Route::from_steps(steps).unwrap();
            let root = binary_tree(Route::root(), depth);

            // collect the off-path sibling at each level before mutating.
            let mut siblings = Vec::new();
            let mut cursor = root.clone();
            for &step in route.steps() {
                let sibling_index = 1 - step as usize;
                if let Some(sibling) = cursor.get_child(sibling_index).unwrap() {
                    siblings.push((sibling.route(), sibling.leaf_payload().ok(), sibling.refcount()));
                }
                if let Some(next) = cursor.get_child(step as usize).unwrap() {
                    cursor = next;
                }
            }

            let path = replace_path(&root, &route, 0).unwrap();

            // every node on the path is a fresh, still-mutable instance;
            // the corresponding original is now frozen by copy().
            prop_assert!(!path[0].is_immutable());
            prop_assert!(root.is_immutable());

            // every sibling off the path is reference-identical: same
            // route, same payload, refcount bumped by exactly one (the new
            // path's parent now also holds a reservation on it).
            let mut new_cursor = path[0].clone();
            for (i, &step) in route.steps().iter().enumerate() {
                let sibling_index = 1 - step as usize;
                let new_sibling = new_cursor.get_child(sibling_index).unwrap().unwrap();
                let (orig_route, orig_payload, orig_refcount) = &siblings[i];
                prop_assert_eq!(&new_sibling.route(), orig_route);
                prop_assert_eq!(new_sibling.leaf_payload().ok(), orig_payload.clone());
                prop_assert_eq!(new_sibling.refcount(), orig_refcount + 1);
                if let Some(next) = new_cursor.get_child(step as usize).unwrap() {
                    new_cursor = next;
                }
            }
        }
    }
}
