//! Pending mutations waiting for the worker thread.
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A batch of mutations reported by the source model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    /// New elements
    Add(Vec<T>),
    /// Elements that disappeared
    Remove(Vec<T>),
    /// Replacement of the whole contents
    Set(Vec<T>),
    /// Elements whose sort keys may have changed
    Update(Vec<T>),
}

impl<T> Change<T> {
    /// The elements carried by this change.
    pub fn elements(&self) -> &[T] {
        match self {
            Change::Add(e) | Change::Remove(e) | Change::Set(e) | Change::Update(e) => e,
        }
    }

    /// True for changes made redundant by a later [`Change::Set`].
    fn superseded_by_set(&self) -> bool {
        !matches!(self, Change::Update(_))
    }
}

struct Inner<T> {
    queue: VecDeque<Change<T>>,
    workload: usize,
}

/// FIFO of [`Change`]s shared between producers and the worker.
pub struct ChangeQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for ChangeQueue<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                workload: 0,
            }),
        }
    }
}

impl<T> ChangeQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a change.
    ///
    /// A `Set` drops every queued `Add`, `Remove` and `Set`: the full reset makes them
    /// moot. Queued `Update`s survive.
    pub fn enqueue(&self, change: Change<T>) {
        let mut inner = self.lock();
        if matches!(change, Change::Set(_)) {
            let before = inner.queue.len();
            inner.queue.retain(|queued| !queued.superseded_by_set());
            inner.workload = inner.queue.iter().map(|c| c.elements().len()).sum();
            trace!("set collapsed {} queued changes", before - inner.queue.len());
        }
        inner.workload += change.elements().len();
        inner.queue.push_back(change);
    }

    /// Removes the oldest change, if any.
    pub fn dequeue(&self) -> Option<Change<T>> {
        let mut inner = self.lock();
        let change = inner.queue.pop_front()?;
        inner.workload -= change.elements().len();
        Some(change)
    }

    /// True if no change is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Number of pending changes.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Total number of elements carried by the pending changes.
    pub fn workload(&self) -> usize {
        self.lock().workload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let queue = ChangeQueue::new();
        queue.enqueue(Change::Add(vec![1, 2]));
        queue.enqueue(Change::Remove(vec![1]));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.workload(), 3);
        assert_eq!(queue.dequeue(), Some(Change::Add(vec![1, 2])));
        assert_eq!(queue.dequeue(), Some(Change::Remove(vec![1])));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
        assert_eq!(queue.workload(), 0);
    }

    #[test]
    fn set_collapses_everything_but_updates() {
        let queue = ChangeQueue::new();
        queue.enqueue(Change::Add(vec![1, 2, 3]));
        queue.enqueue(Change::Update(vec![2]));
        queue.enqueue(Change::Remove(vec![3]));
        queue.enqueue(Change::Set(vec![7]));
        queue.enqueue(Change::Set(vec![8, 9]));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.workload(), 3);
        assert_eq!(queue.dequeue(), Some(Change::Update(vec![2])));
        assert_eq!(queue.dequeue(), Some(Change::Set(vec![8, 9])));
    }

    #[test]
    fn elements_accessor() {
        assert_eq!(Change::Update(vec!['a']).elements(), &['a']);
        assert!(Change::<u8>::Set(vec![]).elements().is_empty());
    }
}
