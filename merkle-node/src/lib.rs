// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Node model (§3/§4): the `Node` handle, its leaf and internal
//! variants, copy strategies, and the process-wide class registry used
//! to validate node types on deserialization.

mod errors;
mod internal;
mod leaf;
mod node;
mod registry;

pub use errors::NodeError;
pub use internal::CopyStrategy;
pub use leaf::DataLocation;
pub use node::Node;
pub use registry::{ClassRegistry, NodeSchema, NodeSchemaKind, RegistryError, NULL_CLASS_ID};
