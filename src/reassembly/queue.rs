//! Hand-off queue of completed frames

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Consumer side of a stream's completed-frame queue.
///
/// Pushes never block the reassembly engine and pops never block the
/// consumer.
#[derive(Clone)]
pub struct ReadyQueue {
    rx: Receiver<Bytes>,
}

impl ReadyQueue {
    /// Create a queue and the producer handle feeding it
    pub fn channel() -> (Sender<Bytes>, ReadyQueue) {
        let (tx, rx) = unbounded();
        (tx, ReadyQueue { rx })
    }

    /// Pop the oldest completed frame, if any
    pub fn try_pop(&self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a frame
    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<Bytes> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drain every frame currently queued
    pub fn drain(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.rx.try_iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
