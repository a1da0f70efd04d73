// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_crypto::HashError;
use merkle_node::NodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynchronizationError {
    #[error("validated content does not match the hash the teacher declared for it")]
    HashMismatch,
    #[error("received a message of an unexpected kind at this point in the exchange")]
    UnexpectedMessage,
    #[error("local tree root has not been hashed before starting a sync")]
    TreeNotHashed,
    #[error("the duplex channel closed or failed: {0}")]
    Disconnected(String),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Node(#[from] NodeError),
}
