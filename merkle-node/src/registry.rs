// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The process-wide classifier registry of §6: every node advertises a
//! 64-bit class id, and the deserializer consults this registry to decide
//! whether an incoming `(class_id, version)` pair is a schema it recognizes
//! before constructing a node from wire bytes.

use crate::internal::CopyStrategy;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

/// Reserved class id meaning "no child here" in child-type checks.
pub const NULL_CLASS_ID: u64 = 0;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("class id {0} is reserved (NULL_CLASS_ID)")]
    ReservedClassId(u64),
    #[error("class id {0} is already registered")]
    Collision(u64),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeSchemaKind {
    Leaf,
    Internal {
        min_children: usize,
        max_children: usize,
        copy_strategy: CopyStrategy,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeSchema {
    pub class_id: u64,
    pub min_version: i32,
    pub max_version: i32,
    pub kind: NodeSchemaKind,
}

/// `class_id -> schema`, populated once at startup. Registering a second
/// schema under a class id already present is a hard startup error, per §6.
#[derive(Default)]
pub struct ClassRegistry {
    schemas: RwLock<HashMap<u64, NodeSchema>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, schema: NodeSchema) -> Result<(), RegistryError> {
        if schema.class_id == NULL_CLASS_ID {
            return Err(RegistryError::ReservedClassId(schema.class_id));
        }
        let mut schemas = self.schemas.write();
        if schemas.contains_key(&schema.class_id) {
            return Err(RegistryError::Collision(schema.class_id));
        }
        schemas.insert(schema.class_id, schema);
        Ok(())
    }

    pub fn schema_for(&self, class_id: u64) -> Option<NodeSchema> {
        self.schemas.read().get(&class_id).cloned()
    }

    /// The `childClassValid(i, class_id, version)` check of §4.2: is
    /// `(class_id, version)` a schema this registry knows, and does the
    /// schema accept the given version? `NULL_CLASS_ID` is always valid
    /// (it denotes an absent child).
    pub fn child_class_valid(&self, class_id: u64, version: i32) -> bool {
        if class_id == NULL_CLASS_ID {
            return true;
        }
        match self.schema_for(class_id) {
            Some(schema) => version >= schema.min_version && version <= schema.max_version,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_schema(class_id: u64) -> NodeSchema {
        NodeSchema {
            class_id,
            min_version: 0,
            max_version: 1,
            kind: NodeSchemaKind::Leaf,
        }
    }

    #[test]
    fn null_class_id_is_reserved() {
        let registry = ClassRegistry::new();
        assert_eq!(
            registry.register(leaf_schema(NULL_CLASS_ID)).unwrap_err(),
            RegistryError::ReservedClassId(NULL_CLASS_ID)
        );
    }

    #[test]
    fn colliding_class_ids_rejected() {
        let registry = ClassRegistry::new();
        registry.register(leaf_schema(7)).unwrap();
        assert_eq!(
            registry.register(leaf_schema(7)).unwrap_err(),
            RegistryError::Collision(7)
        );
    }

    #[test]
    fn null_child_class_is_always_valid() {
        let registry = ClassRegistry::new();
        assert!(registry.child_class_valid(NULL_CLASS_ID, 0));
    }

    #[test]
    fn unregistered_class_is_invalid() {
        let registry = ClassRegistry::new();
        assert!(!registry.child_class_valid(42, 0));
    }

    #[test]
    fn version_outside_declared_range_is_invalid() {
        let registry = ClassRegistry::new();
        registry.register(leaf_schema(7)).unwrap();
        assert!(registry.child_class_valid(7, 1));
        assert!(!registry.child_class_valid(7, 2));
    }
}
