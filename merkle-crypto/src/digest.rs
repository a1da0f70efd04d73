// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::hash_value::HashValue;
use byteorder::{BigEndian, WriteBytesExt};
use once_cell::sync::Lazy;
use sha2::{Digest as _, Sha384};

/// Applies the configured digest (SHA-384) to arbitrary bytes.
pub fn digest(bytes: &[u8]) -> HashValue {
    let mut hasher = Sha384::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    HashValue::new(out.into())
}

/// The digest of the canonical zero-length input, substituted wherever an
/// internal node's child slot is empty.
pub static NULL_HASH: Lazy<HashValue> = Lazy::new(|| digest(&[]));

/// `H(classID ‖ version ‖ payload)`. Leaves are self-hashing: their hash
/// commits to their class, version, and opaque payload bytes.
pub fn hash_leaf(class_id: u64, version: i32, payload: &[u8]) -> HashValue {
    let mut buf = Vec::with_capacity(8 + 4 + payload.len());
    buf.write_u64::<BigEndian>(class_id).expect("vec write");
    buf.write_i32::<BigEndian>(version).expect("vec write");
    buf.extend_from_slice(payload);
    digest(&buf)
}

/// `H(classID ‖ version ‖ childHash₀ ‖ … ‖ childHash_{n-1})`, with the null
/// hash substituted for any empty slot.
pub fn hash_internal(class_id: u64, version: i32, child_hashes: &[HashValue]) -> HashValue {
    let mut buf = Vec::with_capacity(8 + 4 + child_hashes.len() * crate::hash_value::HASH_LENGTH);
    buf.write_u64::<BigEndian>(class_id).expect("vec write");
    buf.write_i32::<BigEndian>(version).expect("vec write");
    for h in child_hashes {
        buf.extend_from_slice(h.as_bytes());
    }
    digest(&buf)
}
