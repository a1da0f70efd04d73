// Copyright (c) The Merkle Core Contributors
// SPDX-License-Identifier: Apache-2.0

//! The duplex ordered message channel §4.5 runs on top of. Both the
//! driver-facing [`MessageSender`]/[`MessageReceiver`] traits and a framed
//! byte-stream implementation with dedicated reader/writer threads live
//! here — the latter is what keeps the wire pipelined independently of the
//! driver's own processing loop, as the synchronization protocol requires.

use crate::errors::SynchronizationError;
use crate::message::{decode_message, encode_message, Message};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::thread::JoinHandle;

pub trait MessageSender: Send {
    fn send(&self, message: Message) -> Result<(), SynchronizationError>;
}

pub trait MessageReceiver: Send {
    fn recv(&self) -> Result<Message, SynchronizationError>;
}

impl MessageSender for crossbeam_channel::Sender<Message> {
    fn send(&self, message: Message) -> Result<(), SynchronizationError> {
        self.send(message)
            .map_err(|e| SynchronizationError::Disconnected(e.to_string()))
    }
}

impl MessageReceiver for crossbeam_channel::Receiver<Message> {
    fn recv(&self) -> Result<Message, SynchronizationError> {
        crossbeam_channel::Receiver::recv(self).map_err(|e| SynchronizationError::Disconnected(e.to_string()))
    }
}

impl MessageSender for std::sync::mpsc::Sender<Message> {
    fn send(&self, message: Message) -> Result<(), SynchronizationError> {
        std::sync::mpsc::Sender::send(self, message)
            .map_err(|e| SynchronizationError::Disconnected(e.to_string()))
    }
}

impl MessageReceiver for std::sync::mpsc::Receiver<Message> {
    fn recv(&self) -> Result<Message, SynchronizationError> {
        std::sync::mpsc::Receiver::recv(self).map_err(|e| SynchronizationError::Disconnected(e.to_string()))
    }
}

/// Bridges a raw byte transport (e.g. a TCP stream) into the pipelined
/// message-channel shape the drivers expect: a writer thread drains an
/// outbound queue onto the wire, and a reader thread decodes inbound frames
/// as fast as bytes arrive, each independent of the driver's own pace.
pub struct FramedLink {
    writer_handle: Option<JoinHandle<()>>,
    reader_handle: Option<JoinHandle<()>>,
}

impl FramedLink {
    /// Spawns the reader and writer threads. Returns the channel endpoints
    /// the driver uses plus the link handle (drop or explicit `join` to
    /// wait for both threads to finish after the sink/source close).
    pub fn spawn<W, Rd>(
        mut sink: W,
        mut source: Rd,
    ) -> (crossbeam_channel::Sender<Message>, crossbeam_channel::Receiver<Message>, FramedLink)
    where
        W: Write + Send + 'static,
        Rd: Read + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = crossbeam_channel::bounded::<Message>(256);
        let (inbound_tx, inbound_rx) = crossbeam_channel::bounded::<Message>(256);

        let writer_handle = std::thread::Builder::new()
            .name("merkle-reconnect-writer".into())
            .spawn(move || {
                while let Ok(message) = outbound_rx.recv() {
                    let Ok(bytes) = encode_message(&message) else {
                        break;
                    };
                    if sink.write_u32::<BigEndian>(bytes.len() as u32).is_err() {
                        break;
                    }
                    if sink.write_all(&bytes).is_err() {
                        break;
                    }
                    if sink.flush().is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn merkle-reconnect writer thread");

        let reader_handle = std::thread::Builder::new()
            .name("merkle-reconnect-reader".into())
            .spawn(move || loop {
                let len = match source.read_u32::<BigEndian>() {
                    Ok(len) => len,
                    Err(_) => break,
                };
                let mut buf = vec![0u8; len as usize];
                if source.read_exact(&mut buf).is_err() {
                    break;
                }
                let Ok(message) = decode_message(&buf) else {
                    break;
                };
                if inbound_tx.send(message).is_err() {
                    break;
                }
            })
            .expect("failed to spawn merkle-reconnect reader thread");

        (
            outbound_tx,
            inbound_rx,
            FramedLink {
                writer_handle: Some(writer_handle),
                reader_handle: Some(reader_handle),
            },
        )
    }

    pub fn join(mut self) {
        if let Some(h) = self.writer_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.reader_handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merkle_crypto::digest;
    use std::collections::VecDeque;
    use std::sync::{Arc, Condvar, Mutex};

    #[derive(Clone, Default)]
    struct LoopbackPipe(Arc<(Mutex<VecDeque<u8>>, Condvar)>);

    impl Write for LoopbackPipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let (lock, cvar) = &*self.0;
            let mut q = lock.lock().unwrap();
            q.extend(buf);
            cvar.notify_all();
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Read for LoopbackPipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let (lock, cvar) = &*self.0;
            let mut q = lock.lock().unwrap();
            while q.is_empty() {
                q = cvar.wait(q).unwrap();
            }
            let n = buf.len().min(q.len());
            for slot in buf.iter_mut().take(n) {
                *slot = q.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    #[test]
    fn frames_round_trip_through_a_byte_transport() {
        let pipe = LoopbackPipe::default();
        let (tx, rx, _link) = FramedLink::spawn(pipe.clone(), pipe);
        tx.send(Message::RootHash(digest(b"x"))).unwrap();
        match crossbeam_channel::Receiver::recv(&rx).unwrap() {
            Message::RootHash(h) => assert_eq!(h, digest(b"x")),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
