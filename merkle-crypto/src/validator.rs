// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::hashable::HashError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

const NEW: u8 = 0;
const VALIDATING: u8 = 1;
const VALID: u8 = 2;
const INVALID: u8 = 3;

/// `NEW -> VALIDATING -> {VALID | INVALID}`. Once `INVALID`, the validator
/// refuses further work and remembers the first failure. Long-running
/// learner loops poll [`Validator::is_valid_so_far`] to bail out early.
pub struct Validator {
    state: AtomicU8,
    first_failure: Mutex<Option<HashError>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(NEW),
            first_failure: Mutex::new(None),
        }
    }

    /// Transitions `NEW -> VALIDATING`. A no-op if already validating or
    /// past it — a single validator commonly backs many concurrent jobs.
    pub fn start(&self) {
        let _ = self
            .state
            .compare_exchange(NEW, VALIDATING, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Records a success. Does nothing once the validator is already
    /// `INVALID` — the first failure wins.
    pub fn mark_valid(&self) {
        let _ = self
            .state
            .compare_exchange(VALIDATING, VALID, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Records the first failure; subsequent failures are ignored.
    pub fn mark_invalid(&self, err: HashError) {
        let mut guard = self.first_failure.lock();
        if guard.is_none() {
            *guard = Some(err);
        }
        self.state.store(INVALID, Ordering::SeqCst);
    }

    /// `true` unless a failure has been recorded. Safe to poll from a long
    /// loop to stop early once something has gone wrong.
    pub fn is_valid_so_far(&self) -> bool {
        self.state.load(Ordering::SeqCst) != INVALID
    }

    /// `None` if still `NEW`/`VALIDATING`; otherwise the terminal verdict.
    pub fn is_valid(&self) -> Option<bool> {
        match self.state.load(Ordering::SeqCst) {
            VALID => Some(true),
            INVALID => Some(false),
            _ => None,
        }
    }

    pub fn first_failure(&self) -> Option<HashError> {
        self.first_failure.lock().clone()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
