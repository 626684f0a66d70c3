//! Shared in-memory message queue.
//!
//! The fleet adapter's connection thread pushes raw payloads; the control
//! loop drains them without blocking.  Clones share the same queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::app::ports::CommandQueue;

#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, payload: Vec<u8>) {
        self.queue.lock().push_back(payload);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().pop_front()
    }

    /// Discard everything queued, returning how many items were dropped.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let n = queue.len();
        queue.clear();
        n
    }
}

impl CommandQueue for Mailbox {
    fn len(&self) -> usize {
        Mailbox::len(self)
    }

    fn try_next(&mut self) -> Option<Vec<u8>> {
        self.try_pop()
    }
}
