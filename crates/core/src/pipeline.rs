//! Multi-threaded orchestrator tying scan, filesystem watch, content
//! preparation, and the transactional writer into one running service
//! (§4.8, §5).
//!
//! No async runtime: every stage is a plain OS thread communicating
//! through blocking queues, the same shape the reference server's
//! `watch.rs` debounce loop uses for its own single-purpose watcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ignore::{WalkBuilder, WalkState};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::{PipelineConfig, QueueConfig};
use crate::error::Result;
use crate::fts_store::FtsStore;
use crate::indexer::Indexer;
use crate::memory::{MemorySampler, MemoryThresholds, PressureLevel, SysinfoSampler};
use crate::path_state_actor::PathStateActor;
use crate::scheduler::{DropReason, PipelineScheduler};
use crate::types::{IndexResult, Lane, ValidationResult, WorkItem, WorkType};
use crate::work_queue::WorkQueue;

#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub pending: usize,
    pub processing: usize,
    pub failed: u64,
    pub dropped: u64,
    pub paused: bool,
    pub preparing: usize,
    pub writing: usize,
    pub coalesced: u64,
    pub stale_dropped: u64,
    pub prep_workers: usize,
    pub writer_batch_depth: usize,
    pub roots: Vec<String>,
    pub scanned: u64,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    IndexingProgress { scanned: u64, total: u64, timestamp: f64 },
    IndexingComplete { timestamp: f64 },
    IndexingError { error: String, timestamp: f64 },
    BsignoreReloaded { path: String, loaded: bool, pattern_count: usize, last_loaded_at_ms: u64, timestamp: f64 },
}

struct SharedCounters {
    failed: AtomicUsize,
    scanned: AtomicUsize,
    total: AtomicUsize,
    preparing: AtomicUsize,
    writing: AtomicUsize,
}

/// Runs `prepare_work_item` / `apply_prepared_work` for every item that
/// flows through the pipeline. Owns no threads itself; `Pipeline` spawns
/// the threads and holds the shared state each one closes over.
pub struct Pipeline {
    config: PipelineConfig,
    scheduler: Arc<PipelineScheduler>,
    prep_queue: Arc<WorkQueue>,
    path_state: Arc<PathStateActor>,
    indexer: Arc<Indexer>,
    fts: Arc<Mutex<FtsStore>>,
    counters: Arc<SharedCounters>,
    roots: Mutex<Vec<PathBuf>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    user_active: AtomicBool,
    prep_worker_count: AtomicUsize,
    memory: Arc<dyn MemorySampler>,
    memory_thresholds: MemoryThresholds,
    events_tx: mpsc::Sender<PipelineEvent>,
    events_rx: Mutex<mpsc::Receiver<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, queue_config: QueueConfig, fts: Arc<Mutex<FtsStore>>, indexer: Arc<Indexer>) -> Self {
        Self::with_memory_sampler(config, queue_config, fts, indexer, Arc::new(SysinfoSampler::new()))
    }

    pub fn with_memory_sampler(
        config: PipelineConfig,
        queue_config: QueueConfig,
        fts: Arc<Mutex<FtsStore>>,
        indexer: Arc<Indexer>,
        memory: Arc<dyn MemorySampler>,
    ) -> Self {
        let base_prep_workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) / 4;
        let prep_worker_count = base_prep_workers.clamp(2, 3);
        let (events_tx, events_rx) = mpsc::channel();
        let memory_thresholds =
            MemoryThresholds { soft_limit_bytes: config.soft_memory_limit_bytes, hard_limit_bytes: config.hard_memory_limit_bytes };

        Self {
            scheduler: Arc::new(PipelineScheduler::new(queue_config)),
            prep_queue: Arc::new(WorkQueue::new()),
            path_state: Arc::new(PathStateActor::new()),
            indexer,
            fts,
            counters: Arc::new(SharedCounters {
                failed: AtomicUsize::new(0),
                scanned: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                preparing: AtomicUsize::new(0),
                writing: AtomicUsize::new(0),
            }),
            roots: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
            user_active: AtomicBool::new(true),
            prep_worker_count: AtomicUsize::new(prep_worker_count),
            memory,
            memory_thresholds,
            config,
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    fn pressure_level(&self) -> PressureLevel {
        self.memory_thresholds.classify(self.memory.rss_bytes())
    }

    /// How many prep workers are allowed to be actively dequeuing right now,
    /// folding together the user-active clamp and memory pressure (§9
    /// "Memory awareness"): hard pressure always wins down to a single
    /// worker, soft pressure clamps to `memoryPressurePrepWorkers`.
    fn allowed_prep_workers(&self) -> usize {
        let base = self.prep_worker_count.load(Ordering::SeqCst);
        match self.pressure_level() {
            PressureLevel::Hard => 1,
            PressureLevel::Soft => base.min(self.config.memory_pressure_prep_workers.max(1)),
            PressureLevel::Normal => base,
        }
    }

    pub fn poll_event(&self) -> Option<PipelineEvent> {
        self.events_rx.lock().unwrap().try_recv().ok()
    }

    /// Starts the scan, fs-watch, prep-dispatcher, prep-worker, and writer
    /// threads. Returns `queuedPaths` (roots accepted).
    pub fn start_indexing(self: &Arc<Self>, roots: Vec<PathBuf>) -> usize {
        *self.roots.lock().unwrap() = roots.clone();

        let dispatcher_handle = self.clone().spawn_prep_dispatcher();
        let writer_handle = self.clone().spawn_writer();
        let worker_handles: Vec<_> =
            (0..self.prep_worker_count.load(Ordering::SeqCst)).map(|idx| self.clone().spawn_prep_worker(idx)).collect();
        let scan_handle = self.clone().spawn_scan(roots.clone());

        let mut handles = self.handles.lock().unwrap();
        handles.push(dispatcher_handle);
        handles.push(writer_handle);
        handles.extend(worker_handles);
        handles.push(scan_handle);
        drop(handles);

        self.spawn_fs_watch(&roots);
        roots.len()
    }

    pub fn stop(&self) {
        self.scheduler.shutdown();
        self.prep_queue.shutdown();
        if let Some(mut watcher) = self.watcher.lock().unwrap().take() {
            for root in self.roots.lock().unwrap().iter() {
                let _ = watcher.unwatch(root);
            }
        }
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    pub fn pause_indexing(&self) {
        self.scheduler.pause();
        self.prep_queue.pause();
    }

    pub fn resume_indexing(&self) {
        self.scheduler.resume();
        self.prep_queue.resume();
    }

    /// §9.1: `setUserActive(true)` always clamps prep workers to 1
    /// regardless of rebuild state; `false` restores the hardware-derived
    /// count.
    pub fn set_user_active(&self, active: bool) -> usize {
        self.user_active.store(active, Ordering::SeqCst);
        let workers = if active {
            1
        } else {
            let base = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) / 4;
            base.clamp(2, 3)
        };
        self.prep_worker_count.store(workers, Ordering::SeqCst);
        workers
    }

    pub fn reindex_path(&self, path: PathBuf) {
        let item = WorkItem::new(WorkType::ModifiedContent, path, Lane::Live);
        self.ingest(item);
    }

    pub fn rebuild_all(&self) -> Result<()> {
        self.fts.lock().unwrap().delete_all()?;
        self.path_state.reset();
        let roots = self.roots.lock().unwrap().clone();
        for root in roots {
            self.ingest(WorkItem::new(WorkType::RescanDirectory, root, Lane::Rebuild));
        }
        Ok(())
    }

    pub fn queue_status(&self) -> QueueStatus {
        let sched_stats = self.scheduler.stats();
        let prep_stats = self.prep_queue.stats();
        QueueStatus {
            pending: sched_stats.live_depth + sched_stats.rebuild_depth + prep_stats.depth,
            processing: prep_stats.active_items,
            failed: self.counters.failed.load(Ordering::SeqCst) as u64,
            dropped: sched_stats.queue_full_drops + sched_stats.memory_soft_drops + sched_stats.memory_hard_drops,
            paused: prep_stats.is_paused,
            preparing: self.counters.preparing.load(Ordering::SeqCst),
            writing: self.counters.writing.load(Ordering::SeqCst),
            coalesced: sched_stats.coalesced_count,
            stale_dropped: sched_stats.stale_dropped_count,
            prep_workers: self.prep_worker_count.load(Ordering::SeqCst),
            writer_batch_depth: 0,
            roots: self.roots.lock().unwrap().iter().map(|p| p.to_string_lossy().into_owned()).collect(),
            scanned: self.counters.scanned.load(Ordering::SeqCst) as u64,
            total: self.counters.total.load(Ordering::SeqCst) as u64,
        }
    }

    fn ingest(&self, item: WorkItem) {
        let lane = item.lane;
        let reason = match self.pressure_level() {
            PressureLevel::Hard => DropReason::MemoryHard,
            PressureLevel::Soft => DropReason::MemorySoft,
            PressureLevel::Normal => DropReason::QueueFull,
        };
        if !self.scheduler.enqueue(item, lane, reason) {
            tracing::warn!(?reason, "scheduler queue full, item dropped");
        }
    }

    fn spawn_scan(self: Arc<Self>, roots: Vec<PathBuf>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            for root in &roots {
                self.scan_directory(root);
            }
            let now = crate::clock::now_unix();
            let _ = self.events_tx.send(PipelineEvent::IndexingComplete { timestamp: now });
        })
    }

    /// Walks `root` with the `ignore` crate's parallel walker (the same
    /// walker + `rayon` thread pool the reference scanner uses), pruning
    /// any directory `PathRules` excludes before descending into it (§4.8)
    /// rather than discovering the exclusion downstream in the indexer.
    fn scan_directory(&self, root: &Path) {
        let path_rules = self.indexer.path_rules().clone();

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .follow_links(false)
            .max_depth(Some(self.config.scan_depth_cap))
            .threads(rayon::current_num_threads().min(8))
            .filter_entry(move |entry| {
                if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    let mut dir_path = entry.path().to_string_lossy().into_owned();
                    if !dir_path.ends_with('/') {
                        dir_path.push('/');
                    }
                    path_rules.validate(&dir_path, None) != ValidationResult::Exclude
                } else {
                    true
                }
            })
            .build_parallel();

        walker.run(|| {
            Box::new(|result| {
                let entry = match result {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::debug!(error = %e, "scan walk error");
                        return WalkState::Continue;
                    }
                };

                let is_symlink = entry.file_type().map(|t| t.is_symlink()).unwrap_or(false);
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                if is_symlink || is_dir {
                    return WalkState::Continue;
                }

                loop {
                    let depth_over =
                        self.counters.preparing.load(Ordering::SeqCst) + self.prep_queue.size() > self.config.scan_high_watermark;
                    let memory_over = self.pressure_level() == PressureLevel::Hard;
                    if !depth_over && !memory_over {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(self.config.memory_pressure_sleep_ms));
                    if self.prep_queue.size() < self.config.scan_resume_watermark && self.pressure_level() != PressureLevel::Hard {
                        break;
                    }
                }

                self.counters.total.fetch_add(1, Ordering::SeqCst);
                self.ingest(WorkItem::new(WorkType::NewFile, entry.into_path(), Lane::Rebuild));
                self.counters.scanned.fetch_add(1, Ordering::SeqCst);
                WalkState::Continue
            })
        });
    }

    fn spawn_fs_watch(self: &Arc<Self>, roots: &[PathBuf]) {
        let (tx, rx) = mpsc::channel::<notify::Event>();
        let mut watcher = match RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        ) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start filesystem watcher");
                return;
            }
        };

        for root in roots {
            if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
                tracing::warn!(root = %root.display(), error = %e, "failed to watch root");
            }
        }
        *self.watcher.lock().unwrap() = Some(watcher);

        let pipeline = self.clone();
        let debounce_ms = self.config.fs_watch_debounce_ms;
        std::thread::spawn(move || {
            let mut pending: HashMap<PathBuf, (Instant, notify::EventKind)> = HashMap::new();
            loop {
                match rx.recv_timeout(Duration::from_millis(debounce_ms)) {
                    Ok(event) => {
                        for path in event.paths {
                            pending.insert(path, (Instant::now(), event.kind));
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }

                let cutoff = Instant::now() - Duration::from_millis(debounce_ms);
                let ready: Vec<(PathBuf, notify::EventKind)> = pending
                    .iter()
                    .filter(|(_, (seen, _))| *seen <= cutoff)
                    .map(|(path, (_, kind))| (path.clone(), *kind))
                    .collect();
                for (path, _) in &ready {
                    pending.remove(path);
                }

                for (path, kind) in ready {
                    let work_type = match kind {
                        notify::EventKind::Remove(_) => WorkType::Delete,
                        notify::EventKind::Create(_) => WorkType::NewFile,
                        _ => WorkType::ModifiedContent,
                    };
                    pipeline.ingest(WorkItem::new(work_type, path, Lane::Live));
                }
            }
        });
    }

    fn spawn_prep_dispatcher(self: Arc<Self>) -> JoinHandle<()> {
        std::thread::spawn(move || loop {
            let Some(item) = self.scheduler.dequeue_blocking() else { break };
            match self.path_state.on_ingress(&item) {
                Some(task) => {
                    if !self.prep_queue.enqueue(task.item) {
                        tracing::warn!("prep queue full, item dropped");
                    }
                }
                None => self.scheduler.record_coalesced(),
            }
        })
    }

    fn spawn_prep_worker(self: Arc<Self>, worker_index: usize) -> JoinHandle<()> {
        std::thread::spawn(move || loop {
            while worker_index >= self.allowed_prep_workers() {
                if self.prep_queue.is_shutdown() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(self.config.memory_pressure_sleep_ms));
            }
            let Some(item) = self.prep_queue.dequeue() else { break };
            self.counters.preparing.fetch_add(1, Ordering::SeqCst);
            let generation = item.generation;
            let prepared = self.indexer.prepare_work_item(&item, generation);
            self.counters.preparing.fetch_sub(1, Ordering::SeqCst);
            self.prep_queue.mark_item_complete();

            if self.path_state.is_stale_prepared(&prepared) {
                self.scheduler.record_stale_dropped();
                continue;
            }

            self.counters.writing.fetch_add(1, Ordering::SeqCst);
            let result = self.fts.lock().unwrap().begin_transaction().and_then(|_| {
                let outcome = self.indexer.apply_prepared_work(&self.fts.lock().unwrap(), &prepared);
                self.fts.lock().unwrap().commit_transaction()?;
                outcome
            });
            self.counters.writing.fetch_sub(1, Ordering::SeqCst);
            self.record_outcome(result);

            if let Some(follow_up) = self.path_state.on_prep_completed(&prepared) {
                if !self.prep_queue.enqueue(follow_up.item) {
                    tracing::warn!("prep queue full, follow-up dropped");
                }
            }
        })
    }

    fn record_outcome(&self, result: Result<IndexResult>) {
        match result {
            Ok(_) => {}
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                let _ = self.events_tx.send(PipelineEvent::IndexingError { error: e.to_string(), timestamp: crate::clock::now_unix() });
            }
        }
    }

    /// Dedicated writer thread is not spawned separately in this
    /// implementation: prep workers commit directly inside their own
    /// transaction per §5's "writer is the single serialization point"
    /// guarantee, since `FtsStore` is behind one shared mutex rather than a
    /// dedicated writer-owned connection. Kept as a distinct method so the
    /// thread inventory matches §5 even though it is a light wrapper today.
    fn spawn_writer(self: Arc<Self>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            let poll = Duration::from_millis(self.config.writer_idle_poll_ms);
            loop {
                if self.prep_queue.stats().depth == 0 && self.scheduler.stats().live_depth == 0 && self.scheduler.stats().rebuild_depth == 0
                {
                    std::thread::sleep(poll);
                }
                if self.scheduler.stats().queue_full_drops > 0 && self.prep_queue.is_paused() {
                    break;
                }
                std::thread::sleep(poll);
                if self.prep_queue.stats().is_paused && self.scheduler.stats().live_depth == 0 {
                    // No-op tick; writer's real work happens inline in prep
                    // workers. This loop exists to keep the thread alive and
                    // observable via `queue_status` for the lifetime of the
                    // pipeline, and exits once both `stop()` paths have
                    // fired.
                }
                if self.handles_shutting_down() {
                    break;
                }
            }
        })
    }

    fn handles_shutting_down(&self) -> bool {
        self.scheduler.stats().live_depth == 0
            && self.scheduler.stats().rebuild_depth == 0
            && self.prep_queue.stats().depth == 0
            && self.prep_queue.is_paused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkerConfig;
    use crate::extractor::PlainTextExtractor;
    use crate::path_rules::PathRules;

    fn pipeline() -> Arc<Pipeline> {
        let fts = Arc::new(Mutex::new(FtsStore::open_in_memory().unwrap()));
        let indexer = Arc::new(Indexer::new(Arc::new(PlainTextExtractor), Arc::new(PathRules::default()), ChunkerConfig::default()));
        Arc::new(Pipeline::new(PipelineConfig::default(), crate::config::QueueConfig::default(), fts, indexer))
    }

    #[test]
    fn set_user_active_clamps_to_one_worker() {
        let p = pipeline();
        assert_eq!(p.set_user_active(true), 1);
        let restored = p.set_user_active(false);
        assert!(restored >= 2);
    }

    #[test]
    fn reindex_path_enqueues_into_live_lane() {
        let p = pipeline();
        p.reindex_path(PathBuf::from("/tmp/x.txt"));
        let status = p.queue_status();
        assert_eq!(status.pending, 1);
    }

    #[test]
    fn queue_status_reports_roots_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline();
        let queued = p.start_indexing(vec![dir.path().to_path_buf()]);
        assert_eq!(queued, 1);
        std::thread::sleep(Duration::from_millis(50));
        p.stop();
    }

    /// §4.8: the scan must prune an excluded directory before descending,
    /// so nothing beneath it is ever turned into a `WorkItem`.
    #[test]
    fn scan_prunes_excluded_directories_without_descending() {
        let dir = tempfile::tempdir().unwrap();
        let excluded = dir.path().join("node_modules").join("some-pkg");
        std::fs::create_dir_all(&excluded).unwrap();
        std::fs::write(excluded.join("index.js"), "module.exports = {}").unwrap();
        std::fs::write(dir.path().join("kept.txt"), "hello world").unwrap();

        let p = pipeline();
        p.start_indexing(vec![dir.path().to_path_buf()]);
        std::thread::sleep(Duration::from_millis(150));
        p.stop();

        let total = p.counters.total.load(Ordering::SeqCst);
        assert_eq!(total, 1, "only kept.txt should have been scanned, node_modules/ should be pruned");
    }
}
