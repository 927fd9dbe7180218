//! Mutex-protected queue of shared elements.
//!
//! Every port owns two of these: the pending command queue and the event
//! handler registry. Elements are `Arc`s and are matched by identity
//! (`Arc::ptr_eq`), never by value, so the same request submitted twice is
//! two distinct members.
//!
//! All mutation and iteration happen under one mutex. Closures handed to the
//! scanning methods run with that mutex held and must not call back into the
//! same queue.
//!
//! A queue can be closed exactly once. Closing drains every member and makes
//! later appends fail, which is what lets a dying port fail its pending
//! commands without racing against new submissions.

// Rust guideline compliant 2026-02

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Errors returned by [`Queue`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The element is not a member of the queue.
    NotFound,
    /// The queue has been closed and accepts no new elements.
    Closed,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Element not found in queue"),
            Self::Closed => write!(f, "Queue is closed"),
        }
    }
}

impl std::error::Error for QueueError {}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<Arc<T>>,
    closed: bool,
}

/// Insertion-ordered, thread-safe container of `Arc<T>` references.
#[derive(Debug)]
pub struct Queue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panicking scan closure must not take the port down with it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an element at the tail.
    pub fn append(&self, elem: Arc<T>) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.items.push_back(elem);
        Ok(())
    }

    /// Remove a specific element, matched by identity.
    pub fn remove(&self, elem: &Arc<T>) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let pos = inner
            .items
            .iter()
            .position(|e| Arc::ptr_eq(e, elem))
            .ok_or(QueueError::NotFound)?;
        inner.items.remove(pos);
        Ok(())
    }

    /// Whether `elem` is currently a member.
    pub fn contains(&self, elem: &Arc<T>) -> bool {
        self.lock().items.iter().any(|e| Arc::ptr_eq(e, elem))
    }

    /// Scan in insertion order and return the first `Some` produced by `f`.
    pub fn find_map<R>(&self, mut f: impl FnMut(&Arc<T>) -> Option<R>) -> Option<R> {
        self.lock().items.iter().find_map(|e| f(e))
    }

    /// Find the first element matching `pred` and remove it, atomically.
    pub fn take_first(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Arc<T>> {
        let mut inner = self.lock();
        let pos = inner.items.iter().position(|e| pred(&**e))?;
        inner.items.remove(pos)
    }

    /// The element at the head of the queue, if any.
    pub fn front(&self) -> Option<Arc<T>> {
        self.lock().items.front().map(Arc::clone)
    }

    /// Clone out every element matching `pred`, in order.
    pub fn filtered(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<Arc<T>> {
        self.lock()
            .items
            .iter()
            .filter(|e| pred(&***e))
            .map(Arc::clone)
            .collect()
    }

    /// Clone out every element, in order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.filtered(|_| true)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the queue holds no elements.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Whether [`Queue::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the queue and hand back everything it still held.
    ///
    /// Subsequent [`Queue::append`] calls fail with [`QueueError::Closed`].
    /// Closing twice returns an empty vector the second time.
    pub fn close(&self) -> Vec<Arc<T>> {
        let mut inner = self.lock();
        inner.closed = true;
        inner.items.drain(..).collect()
    }
}
