//! Coalescing adapter over the inbound command stream.
//!
//! The fleet may publish commands much faster than the loop ticks.  Each
//! tick only the newest message matters, so [`CommandInbox::poll`] drains
//! the queue and keeps the last item.  A deep queue is reported but not
//! throttled.

use log::warn;

use super::commands::Command;
use super::ports::CommandQueue;

/// Queue depth above which a backlog warning is logged.
pub const MAX_QUEUE_SIZE: usize = 100;

pub struct CommandInbox<Q> {
    queue: Q,
    limit: usize,
}

impl<Q: CommandQueue> CommandInbox<Q> {
    pub fn new(queue: Q) -> Self {
        Self {
            queue,
            limit: MAX_QUEUE_SIZE,
        }
    }

    /// Drain the queue, returning only the most recent raw message.
    pub fn poll(&mut self) -> Option<Vec<u8>> {
        let depth = self.queue.len();
        if depth > self.limit {
            warn!("Command queue backlog: {depth} messages (limit {})", self.limit);
        }

        let mut last = None;
        while let Some(msg) = self.queue.try_next() {
            last = Some(msg);
        }
        last
    }

    /// [`poll`](Self::poll) and decode once.  An undecodable message means
    /// no command this tick.
    pub fn next_command(&mut self) -> Option<Command> {
        let raw = self.poll()?;
        match Command::decode(&raw) {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                warn!(
                    "Dropping malformed command ({e}): {}",
                    String::from_utf8_lossy(&raw)
                );
                None
            }
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }
}
