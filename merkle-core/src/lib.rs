// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Facade crate: re-exports the route, node, hashing, tree-operation,
//! teacher/learner synchronization, and data-file-collection components as
//! one dependency, the way an embedding application consumes this lineage.

pub use data_file_collection::{
    file_name, metadata_file_name, DataFile, DataFileCollection, DataFileError, DataItem,
    ExternalIndex, InMemoryIndex, PauseToken, SnapshotHandle,
};
pub use merkle_config::MerkleConfig;
pub use merkle_crypto::{
    digest, hash_node, hash_tree_recursive, ChildHashSlot, HashEngine, HashError, HashFuture,
    HashValue, Hashable, TreeWalkable, Validator, NULL_HASH,
};
pub use merkle_node::{
    ClassRegistry, CopyStrategy, DataLocation, Node, NodeError, NodeSchema, NodeSchemaKind,
    RegistryError, NULL_CLASS_ID,
};
pub use merkle_reconnect::{
    run_learner, run_teacher, ChildHash, FramedLink, Message, MessageReceiver, MessageSender,
    NodeData, ReconnectStats, SynchronizationError, TeacherStats,
};
pub use merkle_route::{Route, RouteError, MAX_FAN_OUT};
pub use merkle_tree::{node_at, replace_path, BreadthFirstIter, DepthFirstIter, InitializationIter, Traversal, TreeError};
