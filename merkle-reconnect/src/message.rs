// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_crypto::HashValue;
use serde::{Deserialize, Serialize};

/// One child's contribution to an internal `NodeData` message: its hash, or
/// `None` for an empty slot. The learner owes exactly one `Ack` per slot,
/// including empty ones.
pub type ChildHash = Option<HashValue>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NodeData {
    Leaf {
        class_id: u64,
        version: i32,
        payload: Vec<u8>,
    },
    Internal {
        class_id: u64,
        version: i32,
        child_hashes: Vec<ChildHash>,
        metadata: Vec<u8>,
    },
}

impl NodeData {
    pub fn class_id(&self) -> u64 {
        match self {
            NodeData::Leaf { class_id, .. } => *class_id,
            NodeData::Internal { class_id, .. } => *class_id,
        }
    }

    pub fn version(&self) -> i32 {
        match self {
            NodeData::Leaf { version, .. } => *version,
            NodeData::Internal { version, .. } => *version,
        }
    }
}

/// Wire messages of the teacher/learner protocol, framed over a duplex
/// ordered channel: a `ROOT_HASH` from teacher to learner, `ACK`s from
/// learner to teacher, and `NODE_DATA` from teacher to learner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    RootHash(HashValue),
    Ack(bool),
    NodeData(NodeData),
}

/// Encodes a message for a framed byte transport. Self-describing: the
/// decoder does not need to know in advance which variant is coming.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, bcs::Error> {
    bcs::to_bytes(message)
}

pub fn decode_message(bytes: &[u8]) -> Result<Message, bcs::Error> {
    bcs::from_bytes(bytes)
}
