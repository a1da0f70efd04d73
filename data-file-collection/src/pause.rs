// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! A cooperative pause/resume primitive for the merger (§4.6.2, §5): the
//! merger polls [`PauseToken::wait_if_paused`] at safe points, so a snapshot
//! can briefly quiesce compaction without aborting it.

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
pub struct PauseToken {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.paused.lock() = true;
    }

    pub fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Blocks the caller while the token is paused. A no-op when not paused.
    pub fn wait_if_paused(&self) {
        let mut guard = self.paused.lock();
        while *guard {
            self.resumed.wait(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn unpaused_token_never_blocks() {
        let token = PauseToken::new();
        token.wait_if_paused();
    }

    #[test]
    fn resume_wakes_a_waiting_thread() {
        let token = Arc::new(PauseToken::new());
        token.pause();
        let waiter = {
            let token = token.clone();
            std::thread::spawn(move || token.wait_if_paused())
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        token.resume();
        waiter.join().unwrap();
    }
}
