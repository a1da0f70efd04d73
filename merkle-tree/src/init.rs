// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_node::Node;

/// Visits every internal node that needs post-load initialization, in an
/// order where all of a node's descendants are visited before the node
/// itself (so a parent's `initialize()` may rely on derived metadata its
/// children have already materialized). Leaves never appear in the output;
/// a `skip` predicate, when it returns `true` for a node, excludes that
/// node and its whole subtree (for node classes that handle their own
/// serialization and initialization internally).
pub struct InitializationIter<'a> {
    stack: Vec<(Node, bool)>,
    skip: Option<Box<dyn Fn(&Node) -> bool + 'a>>,
}

impl<'a> InitializationIter<'a> {
    pub fn new(root: Node) -> Self {
        Self {
            stack: vec![(root, false)],
            skip: None,
        }
    }

    pub fn with_skip(root: Node, skip: impl Fn(&Node) -> bool + 'a) -> Self {
        Self {
            stack: vec![(root, false)],
            skip: Some(Box::new(skip)),
        }
    }
}

impl<'a> Iterator for InitializationIter<'a> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        loop {
            let (node, expanded) = self.stack.pop()?;
            if let Some(skip) = &self.skip {
                if skip(&node) {
                    continue;
                }
            }
            if !expanded {
                self.stack.push((node.clone(), true));
                if !node.is_leaf() {
                    let count = node.child_count().unwrap_or(0);
                    for i in (0..count).rev() {
                        if let Ok(Some(child)) = node.get_child(i) {
                            self.stack.push((child, false));
                        }
                    }
                }
                continue;
            }
            if node.is_leaf() {
                continue;
            }
            return Some(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merkle_node::CopyStrategy;
    use merkle_route::Route;

    fn build_three_leaf_tree() -> Node {
        let root = Node::new_internal(1, 0, Route::root(), 0, 2, CopyStrategy::SmartPathReplacing);
        let l1 = Node::new_leaf(2, 0, Route::root().child(0).unwrap(), b"alpha".to_vec(), false);
        let inner = Node::new_internal(1, 0, Route::root().child(1).unwrap(), 0, 2, CopyStrategy::SmartPathReplacing);
        let l2 = Node::new_leaf(2, 0, inner.route().child(0).unwrap(), b"beta".to_vec(), false);
        let l3 = Node::new_leaf(2, 0, inner.route().child(1).unwrap(), b"gamma".to_vec(), false);
        inner.set_child(0, Some(l2)).unwrap();
        inner.set_child(1, Some(l3)).unwrap();
        root.set_child(0, Some(l1)).unwrap();
        root.set_child(1, Some(inner)).unwrap();
        root
    }

    #[test]
    fn visits_descendants_before_their_parent() {
        let root = build_three_leaf_tree();
        let inner_route = root.get_child(1).unwrap().unwrap().route();
        let visited: Vec<Node> = InitializationIter::new(root.clone()).collect();
        assert_eq!(visited.len(), 2); // inner, then root; leaves excluded
        assert_eq!(visited[0].route(), inner_route);
        assert_eq!(visited[1].route(), root.route());
    }

    #[test]
    fn skip_prunes_a_self_serializing_subtree() {
        let root = build_three_leaf_tree();
        let inner_route = root.get_child(1).unwrap().unwrap().route();
        let visited: Vec<Node> = InitializationIter::with_skip(root.clone(), move |n| n.route() == inner_route).collect();
        assert_eq!(visited.len(), 1);
        assert_eq!(visited[0].route(), root.route());
    }
}
