// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::hashable::{hash_node, hash_tree_recursive, HashError, Hashable, TreeWalkable};
use crate::hash_value::HashValue;
use crate::validator::Validator;
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A result that can be waited on, produced by submitting work to the
/// [`HashEngine`]'s worker pool. Cloning the eventual `Result` is cheap
/// (`HashError` is a small, `Clone` enum), so `wait()` may be called more
/// than once.
#[derive(Clone)]
pub struct HashFuture {
    state: Arc<(Mutex<Option<Result<HashValue, HashError>>>, Condvar)>,
}

impl HashFuture {
    fn pending() -> (Self, impl FnOnce(Result<HashValue, HashError>)) {
        let state = Arc::new((Mutex::new(None), Condvar::new()));
        let fulfil_state = state.clone();
        let fulfil = move |result: Result<HashValue, HashError>| {
            let (lock, cvar) = &*fulfil_state;
            *lock.lock() = Some(result);
            cvar.notify_all();
        };
        (Self { state }, fulfil)
    }

    /// Blocks until the engine has completed this job.
    pub fn wait(&self) -> Result<HashValue, HashError> {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock();
        while guard.is_none() {
            cvar.wait(&mut guard);
        }
        guard.clone().unwrap()
    }

    /// Non-blocking completion check, for polling loops.
    pub fn is_ready(&self) -> bool {
        self.state.0.lock().is_some()
    }
}

/// A pool of worker threads that consume hashing and validation tasks, as
/// described by §4.3 / §5 of the core spec. Queuing a job never blocks the
/// caller; `HashFuture::wait` is the only suspension point.
pub struct HashEngine {
    sender: Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl HashEngine {
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (sender, receiver) = bounded::<Job>(1024);
        let mut workers = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let receiver = receiver.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("hash-engine-{worker_id}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                        trace!(worker_id, "hash engine worker exiting");
                    })
                    .expect("failed to spawn hash engine worker"),
            );
        }
        Self {
            sender,
            workers: Mutex::new(workers),
        }
    }

    /// Synchronous single-node hash, per §4.3. Does not touch the worker
    /// pool: cheap enough to run on the caller's thread, and callers that
    /// want the pool should use [`HashEngine::hash_tree`].
    pub fn hash_node(&self, node: &dyn Hashable) -> Result<HashValue, HashError> {
        hash_node(node)
    }

    /// Asynchronously hashes every unhashed descendant of `root`, bottom up,
    /// then `root` itself. Returns a future completing once every hash has
    /// been written back via [`TreeWalkable::set_hash`].
    pub fn hash_tree<N: TreeWalkable>(&self, root: N) -> HashFuture {
        let (future, fulfil) = HashFuture::pending();
        let job: Job = Box::new(move || {
            let result = hash_tree_recursive(&root);
            fulfil(result);
        });
        if self.sender.send(job).is_err() {
            // Engine shut down between construction and submission; report
            // synchronously so callers waiting on the future don't hang.
            let (future2, fulfil2) = HashFuture::pending();
            fulfil2(Err(HashError::EngineShutDown));
            return future2;
        }
        future
    }

    /// Asynchronously validates a leaf's payload against an expected hash.
    pub fn validate_leaf(
        &self,
        validator: Arc<Validator>,
        expected: HashValue,
        class_id: u64,
        version: i32,
        payload: Vec<u8>,
    ) -> HashFuture {
        let (future, fulfil) = HashFuture::pending();
        validator.start();
        let job: Job = Box::new(move || {
            if !validator.is_valid_so_far() {
                fulfil(Err(HashError::EngineShutDown));
                return;
            }
            let actual = crate::digest::hash_leaf(class_id, version, &payload);
            let result = if actual == expected {
                validator.mark_valid();
                Ok(actual)
            } else {
                let err = HashError::Mismatch { expected, actual };
                validator.mark_invalid(err.clone());
                Err(err)
            };
            fulfil(result);
        });
        let _ = self.sender.send(job);
        future
    }

    /// Asynchronously validates an internal node's declared hash against the
    /// supplied child hashes (recomputing rather than trusting the sender).
    pub fn validate_internal(
        &self,
        validator: Arc<Validator>,
        expected: HashValue,
        class_id: u64,
        version: i32,
        child_hashes: Vec<HashValue>,
    ) -> HashFuture {
        let (future, fulfil) = HashFuture::pending();
        validator.start();
        let job: Job = Box::new(move || {
            if !validator.is_valid_so_far() {
                fulfil(Err(HashError::EngineShutDown));
                return;
            }
            let actual = crate::digest::hash_internal(class_id, version, &child_hashes);
            let result = if actual == expected {
                validator.mark_valid();
                Ok(actual)
            } else {
                let err = HashError::Mismatch { expected, actual };
                validator.mark_invalid(err.clone());
                Err(err)
            };
            fulfil(result);
        });
        let _ = self.sender.send(job);
        future
    }
}

impl Drop for HashEngine {
    fn drop(&mut self) {
        // Dropping `sender`'s last clone would also close the channel, but
        // we hold no extra clones, so closing happens naturally once this
        // struct's `sender` field is dropped after this fn returns. Join
        // eagerly so workers don't outlive the engine.
        let workers = std::mem::take(&mut *self.workers.lock());
        drop(std::mem::replace(&mut self.sender, bounded(0).0));
        for worker in workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::NULL_HASH;
    use crate::hashable::ChildHashSlot;
    use parking_lot::RwLock;
    use std::sync::Arc;

    #[derive(Clone)]
    struct TestNode(Arc<TestNodeInner>);

    struct TestNodeInner {
        class_id: u64,
        version: i32,
        payload: Option<Vec<u8>>,
        children: Vec<RwLock<Option<TestNode>>>,
        hash: RwLock<Option<HashValue>>,
    }

    impl TestNode {
        fn leaf(class_id: u64, payload: &[u8]) -> Self {
            Self(Arc::new(TestNodeInner {
                class_id,
                version: 0,
                payload: Some(payload.to_vec()),
                children: vec![],
                hash: RwLock::new(None),
            }))
        }

        fn internal(class_id: u64, children: Vec<Option<TestNode>>) -> Self {
            Self(Arc::new(TestNodeInner {
                class_id,
                version: 0,
                payload: None,
                children: children.into_iter().map(RwLock::new).collect(),
                hash: RwLock::new(None),
            }))
        }
    }

    impl Hashable for TestNode {
        fn class_id(&self) -> u64 {
            self.0.class_id
        }
        fn version(&self) -> i32 {
            self.0.version
        }
        fn is_leaf(&self) -> bool {
            self.0.payload.is_some()
        }
        fn leaf_payload(&self) -> Option<Vec<u8>> {
            self.0.payload.clone()
        }
        fn declared_slots(&self) -> usize {
            self.0.children.len()
        }
        fn child_slot(&self, index: usize) -> ChildHashSlot {
            match &*self.0.children[index].read() {
                None => ChildHashSlot::Empty,
                Some(child) => match child.stored_hash() {
                    Some(h) => ChildHashSlot::Hashed(h),
                    None => ChildHashSlot::Unhashed,
                },
            }
        }
    }

    impl TreeWalkable for TestNode {
        fn stored_hash(&self) -> Option<HashValue> {
            *self.0.hash.read()
        }
        fn set_hash(&self, hash: HashValue) {
            *self.0.hash.write() = Some(hash);
        }
        fn child_node(&self, index: usize) -> Option<Self> {
            self.0.children[index].read().clone()
        }
    }

    #[test]
    fn hash_tree_hashes_bottom_up() {
        let engine = HashEngine::new(2);
        let leaf1 = TestNode::leaf(1, b"alpha");
        let leaf2 = TestNode::leaf(1, b"beta");
        let root = TestNode::internal(2, vec![Some(leaf1.clone()), Some(leaf2.clone()), None]);

        let result = engine.hash_tree(root.clone()).wait().unwrap();

        assert!(leaf1.stored_hash().is_some());
        assert!(leaf2.stored_hash().is_some());
        let expected = crate::digest::hash_internal(
            2,
            0,
            &[leaf1.stored_hash().unwrap(), leaf2.stored_hash().unwrap(), *NULL_HASH],
        );
        assert_eq!(result, expected);
        assert_eq!(root.stored_hash(), Some(expected));
    }

    #[test]
    fn validate_leaf_detects_mismatch() {
        let engine = HashEngine::new(1);
        let validator = Arc::new(Validator::new());
        let good_hash = crate::digest::hash_leaf(1, 0, b"alpha");
        let future = engine.validate_leaf(validator.clone(), good_hash, 1, 0, b"not-alpha".to_vec());
        assert!(future.wait().is_err());
        assert!(!validator.is_valid_so_far());
    }

    #[test]
    fn validate_leaf_accepts_match() {
        let engine = HashEngine::new(1);
        let validator = Arc::new(Validator::new());
        let good_hash = crate::digest::hash_leaf(1, 0, b"alpha");
        let future = engine.validate_leaf(validator.clone(), good_hash, 1, 0, b"alpha".to_vec());
        assert_eq!(future.wait().unwrap(), good_hash);
        assert!(validator.is_valid_so_far());
    }
}
