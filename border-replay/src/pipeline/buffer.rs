//! Fixed-capacity FIFO with stop-aware blocking.
use crate::thread::StopFlag;
use anyhow::Result;
use border_replay_core::ReplayError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::time::Duration;

/// Fixed-capacity FIFO shared by a producer loop and a consumer.
///
/// `put` blocks while the buffer is full and `get` blocks while it is empty.
/// Both wait in slices of `poll_interval` and give up once the given
/// [`StopFlag`] is raised.
pub struct BoundedBuffer<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: usize,
    poll_interval: Duration,
}

impl<T> BoundedBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    pub fn new(capacity: usize, poll_interval: Duration) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            poll_interval,
        }
    }

    /// Appends `item`, blocking while the buffer is full.
    ///
    /// If `stop` is raised while waiting, the item is handed back in `Err`.
    pub fn put(&self, item: T, stop: &StopFlag) -> std::result::Result<(), T> {
        let mut item = item;
        loop {
            match self.sender.send_timeout(item, self.poll_interval) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(it)) => {
                    if stop.is_raised() {
                        return Err(it);
                    }
                    item = it;
                }
                Err(SendTimeoutError::Disconnected(it)) => return Err(it),
            }
        }
    }

    /// Removes the oldest item, blocking while the buffer is empty.
    ///
    /// Items already in the buffer are returned even after `stop` is raised;
    /// once it is empty and `stop` is raised, fails with [`ReplayError::Cancelled`].
    pub fn get(&self, stop: &StopFlag) -> Result<T> {
        loop {
            match self.receiver.recv_timeout(self.poll_interval) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Timeout) => {
                    if stop.is_raised() {
                        return Err(ReplayError::Cancelled.into());
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ReplayError::ShutDown.into()),
            }
        }
    }

    /// Removes the oldest item if there is one.
    pub fn try_get(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Removes all items.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    /// Number of items in the buffer.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if the buffer holds no item.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Maximum number of items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
