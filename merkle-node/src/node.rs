// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The `Node` handle of §3/§4: a cheaply-cloned, reference-counted cell
//! holding either a leaf's payload or an internal node's children, plus
//! the bookkeeping (route, cached hash, refcount, mutability flag) that
//! the copy-on-write tree operations in this crate and in `merkle-tree`
//! build on.

use crate::errors::NodeError;
use crate::internal::{CopyStrategy, InternalData};
use crate::leaf::{DataLocation, LeafData};
use merkle_crypto::{ChildHashSlot, HashValue, Hashable, TreeWalkable};
use merkle_route::Route;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

enum NodeKind {
    Leaf(LeafData),
    Internal(InternalData),
}

struct NodeHeader {
    class_id: u64,
    version: i32,
    route: RwLock<Route>,
    hash: RwLock<Option<HashValue>>,
    // 0 while this handle is the sole (implicit) owner; reserve()/release()
    // move it up and down; -1 means permanently released, per §3.
    refcount: AtomicI64,
    immutable: AtomicBool,
}

struct NodeCell {
    header: NodeHeader,
    kind: NodeKind,
}

/// A node in the merkle tree. Clone is an `Arc` bump, not a deep copy —
/// see [`Node::copy`] for that.
#[derive(Clone)]
pub struct Node(Arc<NodeCell>);

impl Node {
    pub fn new_leaf(class_id: u64, version: i32, route: Route, payload: Vec<u8>, external: bool) -> Self {
        Node(Arc::new(NodeCell {
            header: NodeHeader {
                class_id,
                version,
                route: RwLock::new(route),
                hash: RwLock::new(None),
                refcount: AtomicI64::new(0),
                immutable: AtomicBool::new(false),
            },
            kind: NodeKind::Leaf(LeafData::new(payload, external)),
        }))
    }

    pub fn new_internal(
        class_id: u64,
        version: i32,
        route: Route,
        min_children: usize,
        max_children: usize,
        copy_strategy: CopyStrategy,
    ) -> Self {
        Node(Arc::new(NodeCell {
            header: NodeHeader {
                class_id,
                version,
                route: RwLock::new(route),
                hash: RwLock::new(None),
                refcount: AtomicI64::new(0),
                immutable: AtomicBool::new(false),
            },
            kind: NodeKind::Internal(InternalData::new(min_children, max_children, copy_strategy)),
        }))
    }

    pub fn class_id(&self) -> u64 {
        self.0.header.class_id
    }

    pub fn version(&self) -> i32 {
        self.0.header.version
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.0.kind, NodeKind::Leaf(_))
    }

    pub fn route(&self) -> Route {
        self.0.header.route.read().clone()
    }

    pub fn refcount(&self) -> i64 {
        self.0.header.refcount.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.refcount() == -1
    }

    pub fn is_immutable(&self) -> bool {
        self.0.header.immutable.load(Ordering::SeqCst)
    }

    pub fn hash(&self) -> Option<HashValue> {
        *self.0.header.hash.read()
    }

    pub fn set_hash(&self, hash: HashValue) {
        *self.0.header.hash.write() = Some(hash);
    }

    /// Changes this node's route. Only legal while the node is solely
    /// owned (`refcount == 0`): a shared node's position is fixed until
    /// whoever shares it releases their reservation.
    pub fn set_route(&self, route: Route) -> Result<(), NodeError> {
        if *self.0.header.route.read() == route {
            return Ok(());
        }
        let refcount = self.refcount();
        if refcount != 0 {
            return Err(NodeError::MerkleRouteError { refcount });
        }
        *self.0.header.route.write() = route;
        Ok(())
    }

    /// Increments the reference count. Fails once the node has been
    /// permanently released.
    pub fn reserve(&self) -> Result<i64, NodeError> {
        loop {
            let current = self.0.header.refcount.load(Ordering::SeqCst);
            if current == -1 {
                return Err(NodeError::UseAfterRelease);
            }
            let next = current + 1;
            if self
                .0
                .header
                .refcount
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Ok(next);
            }
        }
    }

    /// Decrements the reference count. The transition from `0` goes to
    /// `-1` (permanently released) and cascades into children per the
    /// node's kind: internal children are released too, recursively.
    pub fn release(&self) -> Result<(), NodeError> {
        loop {
            let current = self.0.header.refcount.load(Ordering::SeqCst);
            if current == -1 {
                return Err(NodeError::ReferenceCountError(-1));
            }
            if current == 0 {
                if self
                    .0
                    .header
                    .refcount
                    .compare_exchange(0, -1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.0.header.immutable.store(true, Ordering::SeqCst);
                    if let NodeKind::Internal(internal) = &self.0.kind {
                        let children: Vec<Option<Node>> = internal.children.read().clone();
                        for child in children.into_iter().flatten() {
                            child.release()?;
                        }
                    }
                    return Ok(());
                }
            } else {
                let next = current - 1;
                if self
                    .0
                    .header
                    .refcount
                    .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    if next == 0 {
                        // The reference we just dropped was the last one:
                        // this node is now exactly as unreferenced as a
                        // freshly-built root, so loop back and let the
                        // `current == 0` arm finalize and cascade it too.
                        continue;
                    }
                    return Ok(());
                }
            }
        }
    }

    fn internal(&self) -> Result<&InternalData, NodeError> {
        match &self.0.kind {
            NodeKind::Internal(internal) => Ok(internal),
            NodeKind::Leaf(_) => Err(NodeError::NotInternal),
        }
    }

    fn leaf(&self) -> Result<&LeafData, NodeError> {
        match &self.0.kind {
            NodeKind::Leaf(leaf) => Ok(leaf),
            NodeKind::Internal(_) => Err(NodeError::NotLeaf),
        }
    }

    pub fn child_count(&self) -> Result<usize, NodeError> {
        Ok(self.internal()?.max_children)
    }

    pub fn min_children(&self) -> Result<usize, NodeError> {
        Ok(self.internal()?.min_children)
    }

    pub fn copy_strategy(&self) -> Result<CopyStrategy, NodeError> {
        Ok(self.internal()?.copy_strategy)
    }

    /// Hook run once all of a node's descendants are in place (after bulk
    /// load or reconnect), for classes that materialize derived metadata
    /// from their children. The base node model has none; this is a no-op
    /// extension point.
    pub fn initialize(&self) {}

    pub fn get_child(&self, index: usize) -> Result<Option<Node>, NodeError> {
        let internal = self.internal()?;
        self.check_index(internal, index)?;
        Ok(internal.children.read()[index].clone())
    }

    /// Replaces the child at `index`. Reserves the incoming child and
    /// releases the outgoing one; invalidates this node's cached hash.
    pub fn set_child(&self, index: usize, new_child: Option<Node>) -> Result<(), NodeError> {
        let internal = self.internal()?;
        self.check_index(internal, index)?;
        if self.is_immutable() {
            return Err(NodeError::MutabilityError);
        }
        if let Some(child) = &new_child {
            let child_route = self.route().child(index)?;
            child.set_route(child_route)?;
            child.reserve()?;
        }
        let old = {
            let mut children = internal.children.write();
            std::mem::replace(&mut children[index], new_child)
        };
        *self.0.header.hash.write() = None;
        if let Some(old_child) = old {
            old_child.release()?;
        }
        Ok(())
    }

    fn check_index(&self, internal: &InternalData, index: usize) -> Result<(), NodeError> {
        if index >= internal.max_children {
            return Err(NodeError::IllegalChildIndexError {
                index,
                min: 0,
                max: internal.max_children,
            });
        }
        Ok(())
    }

    pub fn leaf_payload(&self) -> Result<Vec<u8>, NodeError> {
        Ok(self.leaf()?.payload.clone())
    }

    pub fn is_external(&self) -> Result<bool, NodeError> {
        Ok(*self.leaf()?.external.read())
    }

    pub fn external_location(&self) -> Result<Option<DataLocation>, NodeError> {
        Ok(*self.leaf()?.external_location.read())
    }

    /// Records that the payload has also been flushed to C6 storage at
    /// `location`. Does not evict the in-memory payload: the tree always
    /// answers reads from memory, C6 is an eviction/durability concern
    /// layered on top by the caller.
    pub fn mark_external(&self, location: DataLocation) -> Result<(), NodeError> {
        let leaf = self.leaf()?;
        *leaf.external.write() = true;
        *leaf.external_location.write() = Some(location);
        Ok(())
    }

    /// Produces an independent (or partially shared, per the node's
    /// [`CopyStrategy`]) snapshot and freezes `self` so it can no longer
    /// be mutated — the copy-on-write trigger of §3.
    pub fn copy(&self) -> Result<Node, NodeError> {
        if self.is_released() {
            return Err(NodeError::UseAfterRelease);
        }
        self.0.header.immutable.store(true, Ordering::SeqCst);
        let header = &self.0.header;
        match &self.0.kind {
            NodeKind::Leaf(leaf) => Ok(Node(Arc::new(NodeCell {
                header: NodeHeader {
                    class_id: header.class_id,
                    version: header.version,
                    route: RwLock::new(header.route.read().clone()),
                    hash: RwLock::new(*header.hash.read()),
                    refcount: AtomicI64::new(0),
                    immutable: AtomicBool::new(false),
                },
                kind: NodeKind::Leaf(LeafData::new(leaf.payload.clone(), *leaf.external.read())),
            }))),
            NodeKind::Internal(internal) => {
                let copied_children = match internal.copy_strategy {
                    CopyStrategy::Cascading => {
                        let children = internal.children.read();
                        let mut out = Vec::with_capacity(children.len());
                        for child in children.iter() {
                            out.push(match child {
                                Some(c) => Some(c.copy()?),
                                None => None,
                            });
                        }
                        out
                    }
                    CopyStrategy::SmartPathReplacing => {
                        let children = internal.children.read();
                        let mut out = Vec::with_capacity(children.len());
                        for child in children.iter() {
                            match child {
                                Some(c) => {
                                    c.reserve()?;
                                    out.push(Some(c.clone()));
                                }
                                None => out.push(None),
                            }
                        }
                        out
                    }
                    CopyStrategy::SelfOnly => vec![None; internal.max_children],
                };
                let retains_content =
                    !matches!(internal.copy_strategy, CopyStrategy::SelfOnly);
                Ok(Node(Arc::new(NodeCell {
                    header: NodeHeader {
                        class_id: header.class_id,
                        version: header.version,
                        route: RwLock::new(header.route.read().clone()),
                        hash: RwLock::new(if retains_content {
                            *header.hash.read()
                        } else {
                            None
                        }),
                        refcount: AtomicI64::new(0),
                        immutable: AtomicBool::new(false),
                    },
                    kind: NodeKind::Internal(InternalData {
                        children: RwLock::new(copied_children),
                        min_children: internal.min_children,
                        max_children: internal.max_children,
                        copy_strategy: internal.copy_strategy,
                    }),
                }))
            }
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("class_id", &self.class_id())
            .field("version", &self.version())
            .field("route", &self.route())
            .field("refcount", &self.refcount())
            .field("is_leaf", &self.is_leaf())
            .finish()
    }
}

impl Hashable for Node {
    fn class_id(&self) -> u64 {
        self.class_id()
    }

    fn version(&self) -> i32 {
        self.version()
    }

    fn is_leaf(&self) -> bool {
        self.is_leaf()
    }

    fn leaf_payload(&self) -> Option<Vec<u8>> {
        self.leaf_payload().ok()
    }

    fn declared_slots(&self) -> usize {
        self.child_count().unwrap_or(0)
    }

    fn child_slot(&self, index: usize) -> ChildHashSlot {
        match self.get_child(index) {
            Ok(Some(child)) => match child.hash() {
                Some(hash) => ChildHashSlot::Hashed(hash),
                None => ChildHashSlot::Unhashed,
            },
            Ok(None) => ChildHashSlot::Empty,
            Err(_) => ChildHashSlot::Empty,
        }
    }
}

impl TreeWalkable for Node {
    fn stored_hash(&self) -> Option<HashValue> {
        self.hash()
    }

    fn set_hash(&self, hash: HashValue) {
        Node::set_hash(self, hash)
    }

    fn child_node(&self, index: usize) -> Option<Node> {
        self.get_child(index).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route::root()
    }

    #[test]
    fn leaf_holds_its_payload() {
        let node = Node::new_leaf(7, 0, route(), b"hello".to_vec(), false);
        assert!(node.is_leaf());
        assert_eq!(node.leaf_payload().unwrap(), b"hello".to_vec());
        assert!(!node.is_external().unwrap());
    }

    #[test]
    fn internal_set_and_get_child() {
        let parent = Node::new_internal(1, 0, route(), 0, 2, CopyStrategy::SmartPathReplacing);
        let leaf = Node::new_leaf(2, 0, route().child(0).unwrap(), b"x".to_vec(), false);
        parent.set_child(0, Some(leaf.clone())).unwrap();
        assert_eq!(leaf.refcount(), 1);
        let fetched = parent.get_child(0).unwrap().unwrap();
        assert_eq!(fetched.leaf_payload().unwrap(), b"x".to_vec());
    }

    #[test]
    fn set_child_out_of_range_is_rejected() {
        let parent = Node::new_internal(1, 0, route(), 0, 2, CopyStrategy::SmartPathReplacing);
        let err = parent.set_child(5, None).unwrap_err();
        assert!(matches!(err, NodeError::IllegalChildIndexError { .. }));
    }

    #[test]
    fn release_at_zero_cascades_into_children() {
        let parent = Node::new_internal(1, 0, route(), 0, 1, CopyStrategy::SmartPathReplacing);
        let leaf = Node::new_leaf(2, 0, route().child(0).unwrap(), b"x".to_vec(), false);
        parent.set_child(0, Some(leaf.clone())).unwrap();
        leaf.reserve().unwrap(); // a second owner beyond parent's structural edge
        assert_eq!(leaf.refcount(), 2);
        leaf.release().unwrap(); // that second owner gives up its reservation
        assert_eq!(leaf.refcount(), 1);
        parent.release().unwrap(); // parent's implicit release, cascades all the way down
        assert!(parent.is_released());
        assert!(leaf.is_released());
    }

    #[test]
    fn releasing_a_deep_tree_cascades_through_every_level() {
        let root = Node::new_internal(1, 0, route(), 0, 1, CopyStrategy::SmartPathReplacing);
        let middle = Node::new_internal(1, 0, route().child(0).unwrap(), 0, 1, CopyStrategy::SmartPathReplacing);
        let leaf = Node::new_leaf(2, 0, middle.route().child(0).unwrap(), b"x".to_vec(), false);
        middle.set_child(0, Some(leaf.clone())).unwrap();
        root.set_child(0, Some(middle.clone())).unwrap();

        root.release().unwrap();
        assert!(root.is_released());
        assert!(middle.is_released());
        assert!(leaf.is_released());
    }

    #[test]
    fn releasing_a_shared_subtree_only_drops_one_reference() {
        let a = Node::new_internal(1, 0, route(), 0, 1, CopyStrategy::SmartPathReplacing);
        let shared = Node::new_leaf(2, 0, route().child(0).unwrap(), b"x".to_vec(), false);
        a.set_child(0, Some(shared.clone())).unwrap();
        shared.reserve().unwrap(); // a second copy's SmartPathReplacing edge also points at `shared`

        assert_eq!(shared.refcount(), 2);
        a.release().unwrap();
        assert!(a.is_released());
        assert!(!shared.is_released());
        assert_eq!(shared.refcount(), 1);
    }

    #[test]
    fn double_release_is_an_error() {
        let leaf = Node::new_leaf(2, 0, route(), b"x".to_vec(), false);
        leaf.release().unwrap();
        assert_eq!(leaf.release().unwrap_err(), NodeError::ReferenceCountError(-1));
    }

    #[test]
    fn smart_path_replacing_shares_children_by_reference() {
        let parent = Node::new_internal(1, 0, route(), 0, 1, CopyStrategy::SmartPathReplacing);
        let leaf = Node::new_leaf(2, 0, route().child(0).unwrap(), b"x".to_vec(), false);
        parent.set_child(0, Some(leaf.clone())).unwrap();

        let copy = parent.copy().unwrap();
        assert!(parent.is_immutable());
        let shared_child = copy.get_child(0).unwrap().unwrap();
        assert_eq!(shared_child.refcount(), leaf.refcount());
        assert_eq!(shared_child.leaf_payload().unwrap(), leaf.leaf_payload().unwrap());
    }

    #[test]
    fn cascading_copy_produces_independent_children() {
        let parent = Node::new_internal(1, 0, route(), 0, 1, CopyStrategy::Cascading);
        let leaf = Node::new_leaf(2, 0, route().child(0).unwrap(), b"x".to_vec(), false);
        parent.set_child(0, Some(leaf.clone())).unwrap();

        let copy = parent.copy().unwrap();
        let copied_child = copy.get_child(0).unwrap().unwrap();
        assert_eq!(copied_child.refcount(), 0);
        assert_eq!(leaf.refcount(), 1);
        assert_eq!(copied_child.leaf_payload().unwrap(), leaf.leaf_payload().unwrap());
    }

    #[test]
    fn self_only_copy_leaves_children_empty() {
        let parent = Node::new_internal(1, 0, route(), 0, 1, CopyStrategy::SelfOnly);
        let leaf = Node::new_leaf(2, 0, route().child(0).unwrap(), b"x".to_vec(), false);
        parent.set_child(0, Some(leaf)).unwrap();

        let copy = parent.copy().unwrap();
        assert!(copy.get_child(0).unwrap().is_none());
        assert!(copy.hash().is_none());
    }

    #[test]
    fn set_route_fails_while_shared() {
        let leaf = Node::new_leaf(2, 0, route(), b"x".to_vec(), false);
        leaf.reserve().unwrap();
        let err = leaf.set_route(route().child(0).unwrap()).unwrap_err();
        assert!(matches!(err, NodeError::MerkleRouteError { refcount: 1 }));
    }

    #[test]
    fn mutating_an_immutable_node_is_rejected() {
        let parent = Node::new_internal(1, 0, route(), 0, 1, CopyStrategy::SmartPathReplacing);
        parent.copy().unwrap();
        let err = parent.set_child(0, None).unwrap_err();
        assert!(matches!(err, NodeError::MutabilityError));
    }
}

#[cfg(any(test, feature = "fuzzing"))]
mod proptests {
    use super::*;
    use merkle_crypto::hash_node;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    /// Builds a bounded tree from a flat token stream: a token `% 3 == 0`
    /// (or the depth budget running out) yields a leaf; otherwise an
    /// internal node with one or two children.
    fn build(tokens: &mut VecDeque<u8>, route: Route, depth_budget: usize) -> Node {
        let token = tokens.pop_front().unwrap_or(0);
        if depth_budget == 0 || token % 3 == 0 {
            return Node::new_leaf(2, 0, route, vec![token], false);
        }
        let child_count = (token % 2 + 1) as usize;
        let node = Node::new_internal(1, 0, route.clone(), 0, child_count, CopyStrategy::SmartPathReplacing);
        for i in 0..child_count {
            let child = build(tokens, route.child(i).unwrap(), depth_budget - 1);
            node.set_child(i, Some(child)).unwrap();
        }
        node
    }

    fn hash_tree(node: &Node) -> HashValue {
        if !node.is_leaf() {
            let count = node.child_count().unwrap();
            for i in 0..count {
                if let Some(child) = node.get_child(i).unwrap() {
                    hash_tree(&child);
                }
            }
        }
        let h = hash_node(node).unwrap();
        node.set_hash(h);
        h
    }

    fn arb_tokens() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 1..24)
    }

    proptest! {
        // §8 invariant 1: hash(copy(T)) == hash(T).
        #[test]
        fn copy_preserves_hash(tokens in arb_tokens()) {
            let mut queue: VecDeque<u8> = tokens.into();
            let tree = build(&mut queue, Route::root(), 4);
            let original_hash = hash_tree(&tree);

            let copy = tree.copy().unwrap();
            prop_assert_eq!(copy.hash(), Some(original_hash));
        }

        // §8 invariant 5: once a tree's root is released, every reachable
        // node's refcount ends at -1.
        #[test]
        fn release_drives_every_reachable_node_to_minus_one(tokens in arb_tokens()) {
            let mut queue: VecDeque<u8> = tokens.into();
            let tree = build(&mut queue, Route::root(), 4);

            fn collect(node: &Node, out: &mut Vec<Node>) {
                out.push(node.clone());
                if !node.is_leaf() {
                    let count = node.child_count().unwrap();
                    for i in 0..count {
                        if let Some(child) = node.get_child(i).unwrap() {
                            collect(&child, out);
                        }
                    }
                }
            }
            let mut nodes = Vec::new();
            collect(&tree, &mut nodes);

            tree.release().unwrap();
            for node in &nodes {
                prop_assert_eq!(node.refcount(), -1);
            }
        }
    }
}
