// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! Teacher/learner tree synchronization (§4.5): a pipelined duplex-channel
//! protocol that brings a learner's tree to match a teacher's without
//! re-transmitting subtrees the learner already has.

mod channel;
mod errors;
mod learner;
mod message;
mod stats;
mod teacher;

pub use channel::{FramedLink, MessageReceiver, MessageSender};
pub use errors::SynchronizationError;
pub use learner::run_learner;
pub use message::{decode_message, encode_message, ChildHash, Message, NodeData};
pub use stats::ReconnectStats;
pub use teacher::{run_teacher, TeacherStats};
