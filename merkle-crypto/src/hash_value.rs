// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use thiserror::Error;

/// SHA-384 is the default configured digest; its output is 48 bytes.
pub const HASH_LENGTH: usize = 48;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum EmptyHashValueError {
    #[error("hash value has the wrong length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("attempted to construct an all-zero hash value of length {0}")]
    AllZero(usize),
}

/// A fixed-length cryptographic digest. Equivalent to the `HashValue` that
/// every node and protocol message in the core is addressed by.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct HashValue([u8; HASH_LENGTH]);

impl HashValue {
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Rejects the all-zero digest: a real digest is never all-zero with
    /// overwhelming probability, and the data file collection reserves the
    /// all-zero value to mean "absent".
    pub fn new_checked(bytes: [u8; HASH_LENGTH]) -> Result<Self, EmptyHashValueError> {
        if bytes.iter().all(|&b| b == 0) {
            return Err(EmptyHashValueError::AllZero(HASH_LENGTH));
        }
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, EmptyHashValueError> {
        if bytes.len() != HASH_LENGTH {
            return Err(EmptyHashValueError::WrongLength {
                expected: HASH_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; HASH_LENGTH];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for HashValue {
    type Error = EmptyHashValueError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(value)
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({}…)", &self.to_hex()[..12])
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
