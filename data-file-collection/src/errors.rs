// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use merkle_node::DataLocation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataFileError {
    #[error("a writer is already open on this collection")]
    WriterAlreadyOpen,
    #[error("no writer is open on this collection")]
    NoWriterOpen,
    #[error("file footer at {0} is corrupt")]
    CorruptFooter(std::path::PathBuf),
    #[error("location {0:?} points at a file no longer in the read set")]
    DeletedFile(DataLocation),
    #[error("merge produced a non-monotonic key at {0}")]
    NonMonotonicKeys(u64),
    #[error("key {0} is not present in the index")]
    KeyNotFound(u64),
    #[error("readUsingIndex exhausted its retries resolving key {0}")]
    RetriesExhausted(u64),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bcs::Error> for DataFileError {
    fn from(e: bcs::Error) -> Self {
        DataFileError::Serialization(e.to_string())
    }
}
