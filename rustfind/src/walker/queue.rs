//! Unbounded work queues with completion tracking.
//!
//! `pending` counts items that were pushed but not yet completed. A worker
//! pushes everything an item produces before completing it, so a pending
//! count of zero means the queue and every worker processing it are idle.
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics for a work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items dequeued
    pub dequeued: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }
}

/// Multi-producer multi-consumer queue that never blocks
#[derive(Debug)]
pub struct WorkQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    pending: AtomicUsize,
    stats: QueueStats,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            pending: AtomicUsize::new(0),
            stats: QueueStats::default(),
        }
    }

    pub fn push(&self, item: T) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // The receiver lives as long as the queue, so sending cannot fail
        // unless the queue itself is being torn down.
        if self.sender.send(item).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes the next item without waiting
    pub fn try_pop(&self) -> Option<T> {
        let item = self.receiver.try_recv().ok()?;
        self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    /// Marks one dequeued item as fully processed
    pub fn complete(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Returns a guard that completes one item when dropped
    pub fn completion(&self) -> Completion<'_, T> {
        Completion { queue: self }
    }

    /// Items pushed and not yet completed
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard completing a dequeued item on every exit path
pub struct Completion<'a, T> {
    queue: &'a WorkQueue<T>,
}

impl<T> Drop for Completion<'_, T> {
    fn drop(&mut self) {
        self.queue.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_tracks_completion() {
        let queue = WorkQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pending(), 2);

        let item = queue.try_pop().unwrap();
        assert_eq!(item, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending(), 2);

        {
            let _done = queue.completion();
            queue.push(3);
        }
        assert_eq!(queue.pending(), 2);

        while queue.try_pop().is_some() {
            queue.complete();
        }
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.stats().enqueued(), 3);
        assert_eq!(queue.stats().dequeued(), 3);
    }

    #[test]
    fn test_empty_pop() {
        let queue: WorkQueue<u8> = WorkQueue::default();
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }
}
