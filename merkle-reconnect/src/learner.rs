// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::channel::{MessageReceiver, MessageSender};
use crate::errors::SynchronizationError;
use crate::message::{Message, NodeData};
use crate::stats::ReconnectStats;
use merkle_crypto::{HashEngine, HashFuture, HashValue, Validator, NULL_HASH};
use merkle_node::{CopyStrategy, Node};
use merkle_route::Route;
use merkle_tree::InitializationIter;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

enum Sink {
    Root,
    Child { parent: Node, index: usize },
}

struct Pending {
    expected_hash: HashValue,
    original_local: Option<Node>,
    sink: Sink,
}

fn route_for(sink: &Sink) -> Route {
    match sink {
        Sink::Root => Route::root(),
        Sink::Child { parent, index } => parent
            .route()
            .child(*index)
            .expect("declared child index is always within the route fan-out"),
    }
}

/// Runs the learner side of §4.5.3 against `original_root` (`None` models
/// starting from an empty tree). Returns the new root (`None` if the
/// teacher's tree is itself empty) and the session's statistics.
pub fn run_learner<S: MessageSender, R: MessageReceiver>(
    original_root: Option<&Node>,
    sender: &S,
    receiver: &R,
    engine: &HashEngine,
) -> Result<(Option<Node>, ReconnectStats), SynchronizationError> {
    let started = Instant::now();
    let mut stats = ReconnectStats::default();

    let teacher_hash = match receiver.recv()? {
        Message::RootHash(h) => h,
        _ => return Err(SynchronizationError::UnexpectedMessage),
    };
    let local_hash = match original_root {
        Some(node) => node.hash().ok_or(SynchronizationError::TreeNotHashed)?,
        None => *NULL_HASH,
    };
    let identical = teacher_hash == local_hash;
    sender.send(Message::Ack(identical))?;
    if identical {
        stats.sync_duration = started.elapsed();
        return Ok((original_root.cloned(), stats));
    }

    let validator = Arc::new(Validator::new());
    let mut futures: Vec<HashFuture> = Vec::new();
    let mut new_internal_nodes: Vec<Node> = Vec::new();
    let mut new_root: Option<Node> = None;

    let mut anticipated: VecDeque<Pending> = VecDeque::new();
    anticipated.push_back(Pending {
        expected_hash: teacher_hash,
        original_local: original_root.cloned(),
        sink: Sink::Root,
    });

    while let Some(pending) = anticipated.pop_front() {
        let data = match receiver.recv()? {
            Message::NodeData(data) => data,
            _ => return Err(SynchronizationError::UnexpectedMessage),
        };
        stats.objects_transferred += 1;
        let route = route_for(&pending.sink);

        let new_node = match &data {
            NodeData::Leaf { class_id, version, payload } => {
                stats.leaf_count += 1;
                let node = Node::new_leaf(*class_id, *version, route, payload.clone(), false);
                futures.push(engine.validate_leaf(validator.clone(), pending.expected_hash, *class_id, *version, payload.clone()));
                node
            }
            NodeData::Internal { class_id, version, child_hashes, .. } => {
                stats.internal_count += 1;
                let node = Node::new_internal(*class_id, *version, route, 0, child_hashes.len(), CopyStrategy::SmartPathReplacing);
                let filled: Vec<HashValue> = child_hashes.iter().map(|h| h.unwrap_or(*NULL_HASH)).collect();
                futures.push(engine.validate_internal(validator.clone(), pending.expected_hash, *class_id, *version, filled));
                node
            }
        };

        match &pending.sink {
            Sink::Root => new_root = Some(new_node.clone()),
            Sink::Child { parent, index } => {
                parent.set_child(*index, Some(new_node.clone())).map_err(SynchronizationError::Node)?;
            }
        }

        if let NodeData::Internal { child_hashes, .. } = &data {
            new_internal_nodes.insert(0, new_node.clone());
            for (index, maybe_hash) in child_hashes.iter().enumerate() {
                let Some(hash) = maybe_hash else {
                    // An empty slot still owes exactly one ack.
                    sender.send(Message::Ack(true))?;
                    continue;
                };
                let local_child = pending
                    .original_local
                    .as_ref()
                    .filter(|n| !n.is_leaf())
                    .and_then(|n| n.get_child(index).ok().flatten());
                let local_has_it = local_child.as_ref().and_then(|c| c.hash()) == Some(*hash);
                sender.send(Message::Ack(local_has_it))?;
                if local_has_it {
                    let reused = local_child.expect("hash comparison above implies a local child exists");
                    new_node.set_child(index, Some(reused)).map_err(SynchronizationError::Node)?;
                    stats.redundant_count += 1;
                } else {
                    anticipated.push_back(Pending {
                        expected_hash: *hash,
                        original_local: local_child,
                        sink: Sink::Child { parent: new_node.clone(), index },
                    });
                }
            }
        }
    }

    for future in &futures {
        future.wait()?;
    }
    if !validator.is_valid_so_far() {
        if let Some(root) = new_root.take() {
            let _ = root.release();
        }
        return Err(validator
            .first_failure()
            .map(SynchronizationError::Hash)
            .unwrap_or(SynchronizationError::HashMismatch));
    }

    let init_started = Instant::now();
    for node in new_internal_nodes {
        node.initialize();
    }
    // Drain the tree-level post-load walk too, for node classes that were
    // not freshly built by this session (e.g. a reused local subtree that
    // itself still needs post-load initialization after a prior partial load).
    if let Some(root) = &new_root {
        for node in InitializationIter::new(root.clone()) {
            node.initialize();
        }
    }
    stats.init_duration = init_started.elapsed();
    stats.sync_duration = started.elapsed();

    Ok((new_root, stats))
}
