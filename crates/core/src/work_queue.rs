//! Thread-safe priority queue for scheduling indexing work items (§4.4).
//!
//! Priority order (highest to lowest): Delete > ModifiedContent > NewFile >
//! RescanDirectory. At capacity, only RescanDirectory items are evicted to
//! make room; if none exist, the incoming item is refused.

use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};

use crate::types::{Lane, WorkItem, WorkType};

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub depth: usize,
    pub active_items: usize,
    pub dropped_items: usize,
    pub is_paused: bool,
}

/// Ord by `WorkType::merge_rank` descending so `BinaryHeap` (a max-heap)
/// pops the highest-priority (lowest rank number) item first.
#[derive(Debug, Clone)]
struct Ranked(WorkItem);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.0.work_type.merge_rank() == other.0.work_type.merge_rank()
    }
}
impl Eq for Ranked {}
impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.0.work_type.merge_rank().cmp(&self.0.work_type.merge_rank())
    }
}

struct State {
    queue: BinaryHeap<Ranked>,
    dropped_items: usize,
    active_items: usize,
    paused: bool,
    shutdown: bool,
}

pub const MAX_QUEUE_SIZE: usize = 10_000;

pub struct WorkQueue {
    state: Mutex<State>,
    cv: Condvar,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: BinaryHeap::new(),
                dropped_items: 0,
                active_items: 0,
                paused: false,
                shutdown: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Enqueue an item. Returns `true` if accepted, `false` if dropped.
    pub fn enqueue(&self, item: WorkItem) -> bool {
        let mut state = self.state.lock().unwrap();

        if state.shutdown {
            tracing::warn!(path = %item.path.display(), "enqueue called after shutdown");
            return false;
        }

        if state.queue.len() >= MAX_QUEUE_SIZE {
            if !Self::drop_lowest_priority(&mut state) {
                state.dropped_items += 1;
                tracing::warn!(path = %item.path.display(), "work queue at capacity, dropped item");
                return false;
            }
        }

        state.queue.push(Ranked(item));
        self.cv.notify_one();
        true
    }

    /// Blocking dequeue. Returns `None` when paused or shut down.
    pub fn dequeue(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.shutdown {
                return None;
            }
            if !state.paused {
                if let Some(Ranked(item)) = state.queue.pop() {
                    state.active_items += 1;
                    return Some(item);
                }
            }
            state = self.cv.wait(state).unwrap();
        }
    }

    pub fn mark_item_complete(&self) {
        let mut state = self.state.lock().unwrap();
        if state.active_items > 0 {
            state.active_items -= 1;
        }
    }

    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        state.paused = true;
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.paused = false;
        self.cv.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.cv.notify_all();
    }

    pub fn size(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock().unwrap();
        QueueStats {
            depth: state.queue.len(),
            active_items: state.active_items,
            dropped_items: state.dropped_items,
            is_paused: state.paused,
        }
    }

    /// Drop one RescanDirectory item, if any exists. O(n): drains and
    /// rebuilds, which is acceptable since this only fires under backpressure.
    fn drop_lowest_priority(state: &mut State) -> bool {
        if state.queue.is_empty() {
            return false;
        }
        let items: Vec<Ranked> = state.queue.drain().collect();
        let mut dropped = false;
        let mut drop_one = true;
        for ranked in items {
            if drop_one && ranked.0.work_type == WorkType::RescanDirectory {
                state.dropped_items += 1;
                dropped = true;
                drop_one = false;
                continue;
            }
            state.queue.push(ranked);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn item(work_type: WorkType, path: &str) -> WorkItem {
        WorkItem::new(work_type, PathBuf::from(path), Lane::Live)
    }

    #[test]
    fn dequeues_in_priority_order() {
        let q = WorkQueue::new();
        q.enqueue(item(WorkType::RescanDirectory, "/a"));
        q.enqueue(item(WorkType::NewFile, "/b"));
        q.enqueue(item(WorkType::Delete, "/c"));
        q.enqueue(item(WorkType::ModifiedContent, "/d"));

        assert_eq!(q.dequeue().unwrap().work_type, WorkType::Delete);
        assert_eq!(q.dequeue().unwrap().work_type, WorkType::ModifiedContent);
        assert_eq!(q.dequeue().unwrap().work_type, WorkType::NewFile);
        assert_eq!(q.dequeue().unwrap().work_type, WorkType::RescanDirectory);
    }

    #[test]
    fn backpressure_evicts_rescan_directory_only() {
        let q = WorkQueue::new();
        for i in 0..MAX_QUEUE_SIZE {
            assert!(q.enqueue(item(WorkType::RescanDirectory, &format!("/r{i}"))));
        }
        assert!(q.enqueue(item(WorkType::NewFile, "/new")));
        assert_eq!(q.size(), MAX_QUEUE_SIZE);
        assert!(q.stats().dropped_items >= 1);
        assert_eq!(q.dequeue().unwrap().work_type, WorkType::NewFile);
    }

    #[test]
    fn refuses_when_no_evictable_item_exists() {
        let q = WorkQueue::new();
        for i in 0..MAX_QUEUE_SIZE {
            assert!(q.enqueue(item(WorkType::Delete, &format!("/d{i}"))));
        }
        assert!(!q.enqueue(item(WorkType::NewFile, "/extra")));
        assert_eq!(q.stats().dropped_items, 1);
    }

    #[test]
    fn pause_blocks_and_resume_unblocks() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let q = Arc::new(WorkQueue::new());
        q.pause();
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue());

        thread::sleep(Duration::from_millis(50));
        q.enqueue(item(WorkType::NewFile, "/x"));
        thread::sleep(Duration::from_millis(50));
        q.resume();

        let result = handle.join().unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn shutdown_unblocks_with_none() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(WorkQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue());
        std::thread::sleep(std::time::Duration::from_millis(30));
        q.shutdown();
        assert!(handle.join().unwrap().is_none());
    }
}
