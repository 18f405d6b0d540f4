//! Two-lane (Live / Rebuild) dispatch with weighted fair sharing (§4.6).
//!
//! Live carries user-triggered work and filesystem events; Rebuild carries
//! full-scan output. Dispatch alternates 70:30 in favor of Live, falling
//! back to whichever lane is non-empty to avoid starving either one.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::config::QueueConfig;
use crate::types::{Lane, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    QueueFull,
    MemorySoft,
    MemoryHard,
    WriterLag,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub live_depth: usize,
    pub rebuild_depth: usize,
    pub live_dispatched: u64,
    pub rebuild_dispatched: u64,
    pub queue_full_drops: u64,
    pub memory_soft_drops: u64,
    pub memory_hard_drops: u64,
    pub writer_lag_drops: u64,
    pub coalesced_count: u64,
    pub stale_dropped_count: u64,
}

struct State {
    live: VecDeque<WorkItem>,
    rebuild: VecDeque<WorkItem>,
    live_dispatched: u64,
    rebuild_dispatched: u64,
    queue_full_drops: u64,
    memory_soft_drops: u64,
    memory_hard_drops: u64,
    writer_lag_drops: u64,
    coalesced_count: u64,
    stale_dropped_count: u64,
    paused: bool,
    shutdown: bool,
    /// Running count within the current 100-dispatch window, used to honor
    /// the 70:30 Live:Rebuild ratio.
    window_dispatched: u32,
    window_live_dispatched: u32,
}

pub struct PipelineScheduler {
    config: QueueConfig,
    state: Mutex<State>,
    cv: Condvar,
}

impl PipelineScheduler {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                live: VecDeque::new(),
                rebuild: VecDeque::new(),
                live_dispatched: 0,
                rebuild_dispatched: 0,
                queue_full_drops: 0,
                memory_soft_drops: 0,
                memory_hard_drops: 0,
                writer_lag_drops: 0,
                coalesced_count: 0,
                stale_dropped_count: 0,
                paused: false,
                shutdown: false,
                window_dispatched: 0,
                window_live_dispatched: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Enqueue `item` onto `lane`. Returns `false` (and records `reason`
    /// against the appropriate counter) if the lane is at capacity.
    pub fn enqueue(&self, item: WorkItem, lane: Lane, reason: DropReason) -> bool {
        let mut state = self.state.lock().unwrap();
        let (queue, cap) = match lane {
            Lane::Live => (&mut state.live, self.config.live_lane_cap),
            Lane::Rebuild => (&mut state.rebuild, self.config.rebuild_lane_cap),
        };

        if queue.len() >= cap {
            match reason {
                DropReason::QueueFull => state.queue_full_drops += 1,
                DropReason::MemorySoft => state.memory_soft_drops += 1,
                DropReason::MemoryHard => state.memory_hard_drops += 1,
                DropReason::WriterLag => state.writer_lag_drops += 1,
            }
            return false;
        }

        queue.push_back(item);
        self.cv.notify_one();
        true
    }

    pub fn record_coalesced(&self) {
        self.state.lock().unwrap().coalesced_count += 1;
    }

    pub fn record_stale_dropped(&self) {
        self.state.lock().unwrap().stale_dropped_count += 1;
    }

    pub fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.paused = false;
        self.cv.notify_all();
    }

    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.shutdown = true;
        self.cv.notify_all();
    }

    /// Blocking dequeue honoring the lane weighting. Returns `None` when
    /// shut down.
    pub fn dequeue_blocking(&self) -> Option<WorkItem> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.shutdown {
                return None;
            }
            if !state.paused {
                if let Some(item) = self.try_dispatch(&mut state) {
                    return Some(item);
                }
            }
            state = self.cv.wait(state).unwrap();
        }
    }

    fn try_dispatch(&self, state: &mut State) -> Option<WorkItem> {
        if state.live.is_empty() && state.rebuild.is_empty() {
            return None;
        }

        if state.window_dispatched >= 100 {
            state.window_dispatched = 0;
            state.window_live_dispatched = 0;
        }

        let live_share = self.config.live_dispatch_share;
        let prefer_live = state.window_live_dispatched * 100 < live_share * (state.window_dispatched + 1);

        let want_live = if state.live.is_empty() {
            false
        } else if state.rebuild.is_empty() {
            true
        } else {
            prefer_live
        };

        let item = if want_live { state.live.pop_front() } else { state.rebuild.pop_front() };

        item.map(|item| {
            state.window_dispatched += 1;
            match item.lane {
                Lane::Live => {
                    state.live_dispatched += 1;
                    state.window_live_dispatched += 1;
                }
                Lane::Rebuild => state.rebuild_dispatched += 1,
            }
            item
        })
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().unwrap();
        SchedulerStats {
            live_depth: state.live.len(),
            rebuild_depth: state.rebuild.len(),
            live_dispatched: state.live_dispatched,
            rebuild_dispatched: state.rebuild_dispatched,
            queue_full_drops: state.queue_full_drops,
            memory_soft_drops: state.memory_soft_drops,
            memory_hard_drops: state.memory_hard_drops,
            writer_lag_drops: state.writer_lag_drops,
            coalesced_count: state.coalesced_count,
            stale_dropped_count: state.stale_dropped_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkType;
    use std::path::PathBuf;

    fn item(lane: Lane, path: &str) -> WorkItem {
        WorkItem::new(WorkType::NewFile, PathBuf::from(path), lane)
    }

    #[test]
    fn falls_back_to_nonempty_lane() {
        let sched = PipelineScheduler::new(QueueConfig::default());
        sched.enqueue(item(Lane::Rebuild, "/a"), Lane::Rebuild, DropReason::QueueFull);
        let dispatched = sched.dequeue_blocking().unwrap();
        assert_eq!(dispatched.lane, Lane::Rebuild);
    }

    #[test]
    fn respects_capacity_per_lane() {
        let mut cfg = QueueConfig::default();
        cfg.live_lane_cap = 2;
        let sched = PipelineScheduler::new(cfg);
        assert!(sched.enqueue(item(Lane::Live, "/a"), Lane::Live, DropReason::QueueFull));
        assert!(sched.enqueue(item(Lane::Live, "/b"), Lane::Live, DropReason::QueueFull));
        assert!(!sched.enqueue(item(Lane::Live, "/c"), Lane::Live, DropReason::QueueFull));
        assert_eq!(sched.stats().queue_full_drops, 1);
    }

    #[test]
    fn weighted_dispatch_favors_live_lane() {
        let sched = PipelineScheduler::new(QueueConfig::default());
        for i in 0..100 {
            sched.enqueue(item(Lane::Live, &format!("/l{i}")), Lane::Live, DropReason::QueueFull);
        }
        for i in 0..100 {
            sched.enqueue(item(Lane::Rebuild, &format!("/r{i}")), Lane::Rebuild, DropReason::QueueFull);
        }

        let mut live_count = 0;
        for _ in 0..100 {
            if sched.dequeue_blocking().unwrap().lane == Lane::Live {
                live_count += 1;
            }
        }
        assert!(live_count >= 60 && live_count <= 80, "live_count={live_count}");
    }

    #[test]
    fn shutdown_unblocks_dequeue() {
        use std::sync::Arc;
        use std::thread;

        let sched = Arc::new(PipelineScheduler::new(QueueConfig::default()));
        let s2 = sched.clone();
        let handle = thread::spawn(move || s2.dequeue_blocking());
        std::thread::sleep(std::time::Duration::from_millis(30));
        sched.shutdown();
        assert!(handle.join().unwrap().is_none());
    }
}
