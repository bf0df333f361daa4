//! Thread-safe FIFO used at the transport boundary.
//!
//! A thin layer over an unbounded `crossbeam-channel` that adds peeking and
//! an explicit close. Readers blocked in [`SyncQueue::deq`] or
//! [`SyncQueue::peek`] wake up with [`TransportError::Closed`] once the queue
//! is closed and drained.

use crate::error::TransportError;
use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Multi-producer, multi-consumer FIFO with peek and close.
#[derive(Debug)]
pub struct SyncQueue<T> {
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
    // items taken off the channel by a peek, oldest first
    peeked: Mutex<VecDeque<T>>,
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> SyncQueue<T> {
    /// Create an open, empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            peeked: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an item.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] after [`close`](Self::close).
    pub fn enq(&self, item: T) -> Result<(), TransportError> {
        match lock(&self.tx).as_ref() {
            Some(tx) => tx.send(item).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    /// Remove the oldest item, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the queue is closed and empty.
    pub fn deq(&self) -> Result<T, TransportError> {
        if let Some(item) = lock(&self.peeked).pop_front() {
            return Ok(item);
        }
        self.rx.recv().map_err(|_| TransportError::Closed)
    }

    /// Remove the oldest item if one is available.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the queue is closed and empty.
    pub fn try_deq(&self) -> Result<Option<T>, TransportError> {
        if let Some(item) = lock(&self.peeked).pop_front() {
            return Ok(Some(item));
        }
        match self.rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Number of queued items
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len() + lock(&self.peeked).len()
    }

    /// Whether the queue holds no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Self::close) was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }

    /// Stop accepting items. Already queued items can still be read.
    pub fn close(&self) {
        if lock(&self.tx).take().is_some() {
            tracing::trace!("queue closed with {} pending items", self.rx.len());
        }
    }
}

impl<T: Clone> SyncQueue<T> {
    /// Copy of the oldest item, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the queue is closed and empty.
    pub fn peek(&self) -> Result<T, TransportError> {
        if let Some(item) = lock(&self.peeked).front() {
            return Ok(item.clone());
        }
        // the lock is not held while blocked
        let item = self.rx.recv().map_err(|_| TransportError::Closed)?;
        let mut peeked = lock(&self.peeked);
        peeked.push_back(item);
        peeked.front().cloned().ok_or(TransportError::Closed)
    }

    /// Copy of the oldest item if one is available.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the queue is closed and empty.
    pub fn try_peek(&self) -> Result<Option<T>, TransportError> {
        let mut peeked = lock(&self.peeked);
        if peeked.is_empty() {
            match self.rx.try_recv() {
                Ok(item) => peeked.push_back(item),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(TransportError::Closed),
            }
        }
        Ok(peeked.front().cloned())
    }
}
