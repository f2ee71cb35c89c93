//! Priority queue of pending per-user jobs
//!
//! A binary min-heap stored in a plain `Vec` with explicit sift-up and
//! sift-down. The heap sits behind one mutex so the orchestrator can enqueue
//! while the dispatcher dequeues through a shared reference.
//!
//! Ordering: lower `priority` first. Equal priorities are served in enqueue
//! order, using a sequence number the queue stamps on every job.

use std::sync::{Mutex, MutexGuard};

use crate::models::{Action, ContentArea, User};

/// One unit of scrape work for a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub user: User,
    pub areas: Vec<ContentArea>,
    pub actions: Vec<Action>,
    /// Lower values are dequeued sooner
    pub priority: i64,
}

impl Job {
    pub fn new(user: User, areas: Vec<ContentArea>, actions: Vec<Action>, priority: i64) -> Self {
        Self {
            user,
            areas,
            actions,
            priority,
        }
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    job: Job,
}

impl Entry {
    fn key(&self) -> (i64, u64) {
        (self.job.priority, self.seq)
    }
}

#[derive(Debug, Default)]
struct Heap {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl Heap {
    fn push(&mut self, job: Job) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { seq, job });
        let last = self.entries.len() - 1;
        self.sift_up(last);
    }

    fn pop(&mut self) -> Option<Job> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.entries.swap(0, last);
        let top = self.entries.pop();
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        top.map(|e| e.job)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[idx].key() >= self.entries[parent].key() {
                break;
            }
            self.entries.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < len && self.entries[left].key() < self.entries[smallest].key() {
                smallest = left;
            }
            if right < len && self.entries[right].key() < self.entries[smallest].key() {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.entries.swap(idx, smallest);
            idx = smallest;
        }
    }
}

/// Thread-safe min-heap of [`Job`]s
#[derive(Debug, Default)]
pub struct PriorityJobQueue {
    heap: Mutex<Heap>,
}

impl PriorityJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // Heap operations do not panic mid-sift; a poisoned lock still holds a valid heap.
    fn lock(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a job. No duplicate detection is done.
    pub fn enqueue(&self, job: Job) {
        self.lock().push(job);
    }

    /// Remove and return the job with the lowest priority
    pub fn dequeue(&self) -> Option<Job> {
        self.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
