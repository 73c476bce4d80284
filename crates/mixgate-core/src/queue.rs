//! In-order message buffer

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::Bytes;

/// Thread-safe FIFO of opaque byte messages.
///
/// A plain list behind a mutex: the queues are crossed by per-packet and
/// per-round events, not a hot inner loop.
pub struct MessageQueue {
    items: Mutex<VecDeque<Bytes>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a message; never fails
    pub fn enqueue(&self, message: Bytes) {
        self.items.lock().unwrap().push_back(message);
    }

    /// Pop the oldest message, or `None` when the queue is empty
    pub fn dequeue(&self) -> Option<Bytes> {
        self.items.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}
