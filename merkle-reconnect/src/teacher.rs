// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::channel::{MessageReceiver, MessageSender};
use crate::errors::SynchronizationError;
use crate::message::{Message, NodeData};
use merkle_crypto::NULL_HASH;
use merkle_node::Node;
use std::collections::{HashSet, VecDeque};

/// Objects sent by a completed teacher run; a subset of the learner's
/// richer [`crate::ReconnectStats`] since the teacher never observes
/// redundancy on the learner's side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeacherStats {
    pub objects_sent: u64,
}

/// Runs the teacher side of §4.5.2 against `root` (`None` models an empty
/// tree, exchanged as the null hash).
pub fn run_teacher<S: MessageSender, R: MessageReceiver>(
    root: Option<&Node>,
    sender: &S,
    receiver: &R,
) -> Result<TeacherStats, SynchronizationError> {
    let root_hash = match root {
        Some(node) => node.hash().ok_or(SynchronizationError::TreeNotHashed)?,
        None => *NULL_HASH,
    };
    sender.send(Message::RootHash(root_hash))?;

    match receiver.recv()? {
        Message::Ack(true) => return Ok(TeacherStats::default()),
        Message::Ack(false) => {}
        _ => return Err(SynchronizationError::UnexpectedMessage),
    }

    let mut stats = TeacherStats::default();
    let Some(root) = root else {
        // A null root with a negative ack is a protocol violation: the
        // learner cannot disagree with "no tree".
        return Err(SynchronizationError::UnexpectedMessage);
    };

    let mut queue: VecDeque<Node> = VecDeque::new();
    let mut scheduled: HashSet<merkle_crypto::HashValue> = HashSet::new();
    queue.push_back(root.clone());
    if let Some(h) = root.hash() {
        scheduled.insert(h);
    }

    while let Some(node) = queue.pop_front() {
        send_node_data(&node, sender)?;
        stats.objects_sent += 1;

        if node.is_leaf() {
            continue;
        }
        let count = node.child_count().map_err(SynchronizationError::Node)?;
        for i in 0..count {
            let Some(child) = node.get_child(i).map_err(SynchronizationError::Node)? else {
                continue;
            };
            let Some(child_hash) = child.hash() else {
                continue;
            };
            match receiver.recv()? {
                Message::Ack(true) => {}
                Message::Ack(false) => {
                    if scheduled.insert(child_hash) {
                        queue.push_back(child);
                    }
                }
                _ => return Err(SynchronizationError::UnexpectedMessage),
            }
        }
    }

    Ok(stats)
}

fn send_node_data<S: MessageSender>(node: &Node, sender: &S) -> Result<(), SynchronizationError> {
    let data = if node.is_leaf() {
        NodeData::Leaf {
            class_id: node.class_id(),
            version: node.version(),
            payload: node.leaf_payload().map_err(SynchronizationError::Node)?,
        }
    } else {
        let count = node.child_count().map_err(SynchronizationError::Node)?;
        let mut child_hashes = Vec::with_capacity(count);
        for i in 0..count {
            let hash = node
                .get_child(i)
                .map_err(SynchronizationError::Node)?
                .and_then(|c| c.hash());
            child_hashes.push(hash);
        }
        NodeData::Internal {
            class_id: node.class_id(),
            version: node.version(),
            child_hashes,
            metadata: Vec::new(),
        }
    };
    sender.send(Message::NodeData(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::decode_message;
    use merkle_node::CopyStrategy;
    use merkle_route::Route;

    fn hash_tree(root: &Node) {
        fn hash_rec(node: &Node) -> merkle_crypto::HashValue {
            if !node.is_leaf() {
                let count = node.child_count().unwrap();
                for i in 0..count {
                    if let Some(child) = node.get_child(i).unwrap() {
                        hash_rec(&child);
                    }
                }
            }
            let h = merkle_crypto::hash_node(node).unwrap();
            node.set_hash(h);
            h
        }
        hash_rec(root);
    }

    fn three_leaf_tree() -> Node {
        let root = Node::new_internal(1, 0, Route::root(), 0, 2, CopyStrategy::SmartPathReplacing);
        let l1 = Node::new_leaf(2, 0, Route::root().child(0).unwrap(), b"alpha".to_vec(), false);
        let inner = Node::new_internal(1, 0, Route::root().child(1).unwrap(), 0, 2, CopyStrategy::SmartPathReplacing);
        let l2 = Node::new_leaf(2, 0, inner.route().child(0).unwrap(), b"beta".to_vec(), false);
        let l3 = Node::new_leaf(2, 0, inner.route().child(1).unwrap(), b"gamma".to_vec(), false);
        inner.set_child(0, Some(l2)).unwrap();
        inner.set_child(1, Some(l3)).unwrap();
        root.set_child(0, Some(l1)).unwrap();
        root.set_child(1, Some(inner)).unwrap();
        hash_tree(&root);
        root
    }

    #[test]
    fn identical_trees_exchange_only_root_hash_and_ack() {
        let root = three_leaf_tree();
        let (out_tx, out_rx) = crossbeam_channel::unbounded();
        let (in_tx, in_rx) = crossbeam_channel::unbounded();
        in_tx.send(Message::Ack(true)).unwrap();

        let stats = run_teacher(Some(&root), &out_tx, &in_rx).unwrap();
        assert_eq!(stats.objects_sent, 0);
        match crossbeam_channel::Receiver::recv(&out_rx).unwrap() {
            Message::RootHash(h) => assert_eq!(h, root.hash().unwrap()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(out_rx.try_recv().is_err());
    }

    #[test]
    fn empty_teacher_root_exchanges_null_hash() {
        let (out_tx, out_rx) = crossbeam_channel::unbounded();
        let (in_tx, in_rx) = crossbeam_channel::unbounded();
        in_tx.send(Message::Ack(true)).unwrap();
        run_teacher(None, &out_tx, &in_rx).unwrap();
        match crossbeam_channel::Receiver::recv(&out_rx).unwrap() {
            Message::RootHash(h) => assert_eq!(h, *NULL_HASH),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wire_framing_is_self_describing() {
        let msg = Message::Ack(false);
        let bytes = crate::message::encode_message(&msg).unwrap();
        assert!(matches!(decode_message(&bytes).unwrap(), Message::Ack(false)));
    }
}
