// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Routes identify a node by the sequence of child indices you walk from the
//! root to reach it. A [`Route`] is cheap to clone (an `Arc<[u8]>` under the
//! hood) and compares in the order a depth-first, left-to-right traversal
//! would visit nodes: an ancestor sorts before any of its descendants, and
//! siblings sort by index.

use byteorder::{ReadBytesExt, WriteBytesExt};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;

/// Internal nodes may declare at most this many children.
pub const MAX_FAN_OUT: usize = 64;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum RouteError {
    #[error("cannot take the parent of the empty (root) route")]
    RootHasNoParent,
    #[error("child index {0} exceeds the maximum fan-out of {}", MAX_FAN_OUT)]
    IndexOutOfRange(usize),
    #[error("route encoding is truncated or corrupt")]
    MalformedEncoding,
}

/// An immutable path from the tree root to some node, as a sequence of child
/// indices. The empty route is the root.
#[derive(Clone, Eq)]
pub struct Route {
    steps: Arc<[u8]>,
}

impl Route {
    /// The route identifying the tree root.
    pub fn root() -> Self {
        Self {
            steps: Arc::from(Vec::new().into_boxed_slice()),
        }
    }

    pub fn from_steps(steps: impl Into<Vec<u8>>) -> Result<Self, RouteError> {
        let steps = steps.into();
        for &s in &steps {
            if s as usize >= MAX_FAN_OUT {
                return Err(RouteError::IndexOutOfRange(s as usize));
            }
        }
        Ok(Self {
            steps: Arc::from(steps.into_boxed_slice()),
        })
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[u8] {
        &self.steps
    }

    /// Appends `index` and returns the child route.
    pub fn child(&self, index: usize) -> Result<Route, RouteError> {
        if index >= MAX_FAN_OUT {
            return Err(RouteError::IndexOutOfRange(index));
        }
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend_from_slice(&self.steps);
        steps.push(index as u8);
        Ok(Route {
            steps: Arc::from(steps.into_boxed_slice()),
        })
    }

    /// Drops the last step. Fails on the root route.
    pub fn parent(&self) -> Result<Route, RouteError> {
        if self.steps.is_empty() {
            return Err(RouteError::RootHasNoParent);
        }
        Ok(Route {
            steps: Arc::from(self.steps[..self.steps.len() - 1].to_vec().into_boxed_slice()),
        })
    }

    /// The index of this route within its parent, if any.
    pub fn index_in_parent(&self) -> Option<usize> {
        self.steps.last().map(|&s| s as usize)
    }

    /// True if `self` is `ancestor` itself or a descendant of it (prefix test).
    pub fn is_descendant_of(&self, ancestor: &Route) -> bool {
        self.steps.len() >= ancestor.steps.len() && self.steps[..ancestor.steps.len()] == *ancestor.steps
    }

    /// Iterates the (index) steps from root to this route, in order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.steps.iter().copied()
    }

    /// Stable variable-length encoding: a leading step count followed by that
    /// many bytes. Short routes (the common case) therefore pack into a
    /// handful of bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.steps.len() + 2);
        write_varint(self.steps.len() as u64, &mut out);
        out.extend_from_slice(&self.steps);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RouteError> {
        let mut cursor = Cursor::new(bytes);
        let len = read_varint(&mut cursor).ok_or(RouteError::MalformedEncoding)? as usize;
        let mut steps = vec![0u8; len];
        cursor
            .read_exact(&mut steps)
            .map_err(|_| RouteError::MalformedEncoding)?;
        Route::from_steps(steps)
    }
}

fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.write_u8(byte).expect("write to Vec never fails");
        if value == 0 {
            break;
        }
    }
}

fn read_varint<R: Read>(reader: &mut R) -> Option<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = reader.read_u8().ok()?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

/// Total order compatible with depth-first, left-to-right traversal: an
/// ancestor precedes its descendants, and siblings order by index. This is
/// exactly lexicographic order over the step sequence.
impl Ord for Route {
    fn cmp(&self, other: &Self) -> Ordering {
        self.steps.cmp(&other.steps)
    }
}

impl PartialOrd for Route {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.steps, &other.steps) || self.steps == other.steps
    }
}

impl std::hash::Hash for Route {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.steps.hash(state);
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route(")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", step)?;
        }
        write!(f, ")")
    }
}

impl Default for Route {
    fn default() -> Self {
        Route::root()
    }
}

impl Serialize for Route {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Route {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RouteVisitor;
        impl<'de> Visitor<'de> for RouteVisitor {
            type Value = Route;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a varint-length-prefixed route encoding")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Route, E> {
                Route::decode(v).map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_bytes(RouteVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_empty() {
        let r = Route::root();
        assert!(r.is_root());
        assert_eq!(r.depth(), 0);
        assert_eq!(r.index_in_parent(), None);
    }

    #[test]
    fn child_then_parent_round_trips() {
        let root = Route::root();
        let c = root.child(3).unwrap();
        assert_eq!(c.index_in_parent(), Some(3));
        assert_eq!(c.parent().unwrap(), root);
    }

    #[test]
    fn parent_of_root_fails() {
        assert_eq!(Route::root().parent().unwrap_err(), RouteError::RootHasNoParent);
    }

    #[test]
    fn index_out_of_range_rejected() {
        assert_eq!(
            Route::root().child(64).unwrap_err(),
            RouteError::IndexOutOfRange(64)
        );
    }

    #[test]
    fn descendant_prefix_test() {
        let root = Route::root();
        let a = root.child(1).unwrap();
        let ab = a.child(2).unwrap();
        assert!(ab.is_descendant_of(&a));
        assert!(ab.is_descendant_of(&root));
        assert!(!a.is_descendant_of(&ab));
    }

    #[test]
    fn ordering_matches_depth_first_traversal() {
        let root = Route::root();
        let a = root.child(0).unwrap();
        let a0 = a.child(0).unwrap();
        let b = root.child(1).unwrap();
        // root < a < a.0 < b: ancestor before descendant, siblings by index.
        assert!(root < a);
        assert!(a < a0);
        assert!(a0 < b);
    }

    #[test]
    fn encode_decode_round_trip() {
        let route = Route::root().child(5).unwrap().child(63).unwrap().child(0).unwrap();
        let bytes = route.encode();
        let decoded = Route::decode(&bytes).unwrap();
        assert_eq!(route, decoded);
    }

    #[test]
    fn equal_routes_compare_equal_even_without_sharing() {
        let a = Route::root().child(4).unwrap();
        let b = Route::root().child(4).unwrap();
        assert_eq!(a, b);
        assert!(!Arc::ptr_eq(&a.steps, &b.steps));
    }
}

#[cfg(any(test, feature = "fuzzing"))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_steps() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(0u8..(MAX_FAN_OUT as u8), 0..12)
    }

    proptest! {
        // §8 round-trip law: encode then decode a route is the identical
        // sequence of indices.
        #[test]
        fn encode_decode_is_identity(steps in arb_steps()) {
            let route = Route::from_steps(steps.clone()).unwrap();
            let decoded = Route::decode(&route.encode()).unwrap();
            prop_assert_eq!(decoded.steps(), steps.as_slice());
        }

        #[test]
        fn child_of_a_route_is_always_its_descendant(steps in arb_steps(), index in 0u8..(MAX_FAN_OUT as u8)) {
            let route = Route::from_steps(steps).unwrap();
            let child = route.child(index as usize).unwrap();
            prop_assert!(child.is_descendant_of(&route));
            prop_assert_eq!(child.parent().unwrap(), route);
        }
    }
}
