// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_node::Node;
use std::collections::VecDeque;

type Predicate<'a> = Box<dyn Fn(&Node) -> bool + 'a>;

/// Pre-order, left-to-right depth-first iteration. Built with [`Traversal`].
pub struct DepthFirstIter<'a> {
    stack: Vec<Node>,
    filter: Option<Predicate<'a>>,
    descendant_filter: Option<Predicate<'a>>,
}

/// Breadth-first iteration in queue order. Built with [`Traversal`].
pub struct BreadthFirstIter<'a> {
    queue: VecDeque<Node>,
    filter: Option<Predicate<'a>>,
    descendant_filter: Option<Predicate<'a>>,
}

/// Builds a depth-first or breadth-first traversal over a tree rooted at a
/// given node, with an optional inclusion filter and an optional, separate
/// descent filter.
///
/// A node for which `filter` returns `false` is excluded from the output. If
/// no `descendant_filter` is supplied, that same `false` also prunes the
/// node's descendants from the walk; supplying a `descendant_filter`
/// decouples the two decisions.
pub struct Traversal<'a> {
    root: Node,
    filter: Option<Predicate<'a>>,
    descendant_filter: Option<Predicate<'a>>,
}

impl<'a> Traversal<'a> {
    pub fn new(root: Node) -> Self {
        Self {
            root,
            filter: None,
            descendant_filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&Node) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_descendant_filter(mut self, filter: impl Fn(&Node) -> bool + 'a) -> Self {
        self.descendant_filter = Some(Box::new(filter));
        self
    }

    pub fn depth_first(self) -> DepthFirstIter<'a> {
        DepthFirstIter {
            stack: vec![self.root],
            filter: self.filter,
            descendant_filter: self.descendant_filter,
        }
    }

    pub fn breadth_first(self) -> BreadthFirstIter<'a> {
        let mut queue = VecDeque::new();
        queue.push_back(self.root);
        BreadthFirstIter {
            queue,
            filter: self.filter,
            descendant_filter: self.descendant_filter,
        }
    }
}

fn should_descend(node: &Node, included: bool, descendant_filter: &Option<Predicate<'_>>) -> bool {
    match descendant_filter {
        Some(f) => f(node),
        None => included,
    }
}

fn children_of(node: &Node) -> Vec<Node> {
    if node.is_leaf() {
        return Vec::new();
    }
    let count = node.child_count().unwrap_or(0);
    (0..count).filter_map(|i| node.get_child(i).ok().flatten()).collect()
}

impl<'a> Iterator for DepthFirstIter<'a> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        loop {
            let node = self.stack.pop()?;
            let included = self.filter.as_ref().map_or(true, |f| f(&node));
            if should_descend(&node, included, &self.descendant_filter) {
                for child in children_of(&node).into_iter().rev() {
                    self.stack.push(child);
                }
            }
            if included {
                return Some(node);
            }
        }
    }
}

impl<'a> Iterator for BreadthFirstIter<'a> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        loop {
            let node = self.queue.pop_front()?;
            let included = self.filter.as_ref().map_or(true, |f| f(&node));
            if should_descend(&node, included, &self.descendant_filter) {
                for child in children_of(&node) {
                    self.queue.push_back(child);
                }
            }
            if included {
                return Some(node);
            }
        }
    }
}
