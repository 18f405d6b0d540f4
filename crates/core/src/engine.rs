//! Top-level facade: the handful of calls a host process actually makes
//! (§6). Wires FtsStore, Pipeline, EmbeddingPipeline, QueryPlanner, and the
//! feedback subsystem together behind one object.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::now_unix;
use crate::config::Config;
use crate::embedding_pipeline::{Embedder, EmbeddingPipeline, EmbeddingPipelineConfig};
use crate::error::Result;
use crate::extractor::PlainTextExtractor;
use crate::feedback::{AffinityStats, DirPreference, FeedbackAggregator, InteractionTracker, PathPreferences, TypeAffinity};
use crate::fts_store::FtsStore;
use crate::indexer::Indexer;
use crate::path_rules::PathRules;
use crate::pipeline::{Pipeline, PipelineEvent};
use crate::query_planner::{QueryContext, QueryPlanner, Reranker, SearchResult};
use crate::types::{Feedback, FeedbackAction, Interaction, MatchType};
use crate::typo_lexicon::TypoLexicon;
use crate::vector_index::{VectorIndex, VectorIndexMetadata};
use crate::vector_store::VectorStore;

#[derive(Debug, Clone)]
pub struct IndexHealth {
    pub is_healthy: bool,
    pub total_indexed_items: i64,
    pub total_chunks: i64,
    pub total_failures: i64,
    pub last_index_time: Option<f64>,
    pub index_age_secs: Option<f64>,
    pub fts_index_size: i64,
    pub items_without_content: i64,
}

#[derive(Debug, Clone)]
pub struct ServiceHealth {
    pub pipeline_running: bool,
    pub semantic_available: bool,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub index_health: IndexHealth,
    pub service_health: ServiceHealth,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FrequencyInfo {
    pub open_count: u64,
    pub last_open_date: f64,
    pub frequency_tier: u8,
    pub boost: f64,
}

#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    pub item_id: i64,
    pub action: FeedbackAction,
    pub query: String,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct InteractionRequest {
    pub query: String,
    pub selected_item_id: i64,
    pub selected_path: String,
    pub match_type: MatchType,
    pub result_position: usize,
    pub frontmost_app: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AggregationReport {
    pub aggregated: bool,
    pub feedback_cleaned: usize,
    pub interactions_cleaned: usize,
    pub last_aggregation: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub interactions: Vec<Interaction>,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct StartIndexingResult {
    pub success: bool,
    pub queued_paths: usize,
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct IndexingControlResult {
    pub paused: bool,
    pub queued_paths: usize,
}

#[derive(Debug, Clone)]
pub struct UserActiveResult {
    pub active: bool,
    pub prep_workers: usize,
}

#[derive(Debug, Clone)]
pub struct RebuildResult {
    pub cleared: bool,
    pub reindexing_started: bool,
}

#[derive(Debug, Clone)]
pub struct LastProgressReport {
    pub scanned: u64,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct QueueStatusReport {
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
    pub last_progress_report: LastProgressReport,
    pub bsignore_path: Option<String>,
    pub bsignore_loaded: bool,
    pub bsignore_pattern_count: usize,
    pub bsignore_last_loaded_at_ms: u64,
}

/// frequencyTier boundaries mirror `Scorer`'s own tiering (§4.14): 0
/// opens, 1-5, 6-20, 21+.
fn frequency_tier(open_count: u64) -> u8 {
    match open_count {
        0 => 0,
        1..=5 => 1,
        6..=20 => 2,
        _ => 3,
    }
}

pub struct Engine {
    config: Config,
    fts: Arc<Mutex<FtsStore>>,
    typo_lexicon: Mutex<TypoLexicon>,
    path_rules: Arc<PathRules>,
    indexer: Arc<Indexer>,
    pipeline: Arc<Pipeline>,
    vector_index: Option<Arc<VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    embedding_pipeline: Mutex<Option<Arc<EmbeddingPipeline>>>,
    embedding_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    generation_id: String,
    data_dir: PathBuf,
    reranker: Option<Arc<dyn Reranker>>,
    running: AtomicBool,
}

impl Engine {
    /// Opens (or creates) the on-disk index at `data_dir/index.db`. `embedder`
    /// is `None` in lexical-only builds, or a concrete `Embedder` when the
    /// `semantic` feature is wired in by the host.
    pub fn new(config: Config, data_dir: PathBuf, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let fts = FtsStore::open(&data_dir.join("index.db"))?;

        let mut path_rules = PathRules::new(config.limits.max_file_size);
        if let Ok(bsignore_path) = crate::config::default_bsignore_path() {
            if bsignore_path.exists() {
                let _ = path_rules.load_bsignore(&bsignore_path);
            }
        }
        let path_rules = Arc::new(path_rules);

        let mut typo_lexicon = TypoLexicon::new(config.typo_lexicon.clone());
        let _ = typo_lexicon.build(fts.conn());

        let indexer = Arc::new(Indexer::new(Arc::new(PlainTextExtractor), path_rules.clone(), config.chunker.clone()));

        let fts = Arc::new(Mutex::new(fts));
        let pipeline = Arc::new(Pipeline::new(config.pipeline.clone(), config.queue.clone(), fts.clone(), indexer.clone()));

        let mut generation_id = uuid::Uuid::new_v4().to_string();
        let vector_index = embedder.as_ref().map(|e| {
            let index_path = data_dir.join("vectors.bin.json");
            let meta_path = data_dir.join("vectors.meta.json");

            let probe = VectorIndex::new(config.hnsw.clone());
            let loaded_matches_embedder =
                probe.load(&index_path, &meta_path).is_ok() && probe.dimensions() == Some(e.dimensions());

            if loaded_matches_embedder {
                // Reuse the persisted generation rather than minting a new
                // one — the vector_map rows on disk were written against it.
                if let Some(persisted) = probe.generation_id() {
                    generation_id = persisted;
                }
                Arc::new(probe)
            } else {
                // Either nothing was persisted, the sidecar is corrupt, or
                // the embedding model changed dimensions since the last
                // run — start a fresh generation rather than reuse
                // mismatched vectors (§9 "enforces strictly").
                let meta = VectorIndexMetadata {
                    schema_version: 1,
                    dimensions: e.dimensions(),
                    model_id: e.model_id().to_string(),
                    generation_id: generation_id.clone(),
                    provider: "local".to_string(),
                };
                let index = VectorIndex::new(config.hnsw.clone());
                let _ = index.configure(meta);
                let _ = index.create(config.hnsw.initial_capacity);
                Arc::new(index)
            }
        });

        Ok(Self {
            config,
            fts,
            typo_lexicon: Mutex::new(typo_lexicon),
            path_rules,
            indexer,
            pipeline,
            vector_index,
            embedder,
            embedding_pipeline: Mutex::new(None),
            embedding_thread: Mutex::new(None),
            generation_id,
            data_dir,
            reranker: None,
            running: AtomicBool::new(false),
        })
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    // --- Query & feedback surface (§6 "query" group) -----------------

    pub fn search(&self, query: &str, limit: usize, context: &QueryContext) -> Result<Vec<SearchResult>> {
        let fts = self.fts.lock().unwrap();
        let lexicon = self.typo_lexicon.lock().unwrap();
        let feedback_config = &self.config.feedback;

        let path_preferences = PathPreferences::new(&fts, feedback_config);
        let type_affinity = TypeAffinity::new(&fts, feedback_config);

        let mut planner = QueryPlanner::new(&fts, &lexicon, &self.config).with_feedback(&path_preferences, &type_affinity);

        let vector_store;
        if let (Some(index), Some(embedder)) = (&self.vector_index, &self.embedder) {
            vector_store = VectorStore::new(fts.conn())?;
            planner = planner.with_semantic(index, &vector_store, embedder.clone());
        }
        if let Some(reranker) = &self.reranker {
            planner = planner.with_reranker(reranker.as_ref());
        }

        planner.search(query, limit, context)
    }

    pub fn get_health(&self) -> Result<HealthStatus> {
        let fts = self.fts.lock().unwrap();
        let report = fts.get_health(now_unix())?;
        let mut issues = Vec::new();
        if report.total_failures > 0 {
            issues.push(format!("{} item(s) failed extraction", report.total_failures));
        }
        if !report.is_healthy {
            issues.push("index is empty".to_string());
        }

        Ok(HealthStatus {
            index_health: IndexHealth {
                is_healthy: report.is_healthy,
                total_indexed_items: report.total_indexed_items,
                total_chunks: report.total_chunks,
                total_failures: report.total_failures,
                last_index_time: report.last_index_time,
                index_age_secs: report.index_age_secs,
                fts_index_size: report.fts_index_size,
                items_without_content: report.items_without_content,
            },
            service_health: ServiceHealth {
                pipeline_running: self.running.load(Ordering::SeqCst),
                semantic_available: self.vector_index.is_some(),
            },
            issues,
        })
    }

    pub fn record_feedback(&self, request: FeedbackRequest) -> Result<()> {
        let fts = self.fts.lock().unwrap();
        fts.record_feedback(&Feedback {
            id: 0,
            item_id: request.item_id,
            action: request.action,
            query: request.query,
            timestamp: now_unix(),
        })
    }

    pub fn get_frequency(&self, item_id: i64) -> Result<FrequencyInfo> {
        let fts = self.fts.lock().unwrap();
        let freq = fts.get_frequency(item_id)?;
        let path_preferences = PathPreferences::new(&fts, &self.config.feedback);
        let boost = match fts.get_item_by_id(item_id)? {
            Some(item) => path_preferences.get_boost(&item.path)?,
            None => 0.0,
        };
        Ok(FrequencyInfo {
            open_count: freq.open_count,
            last_open_date: freq.last_opened_at,
            frequency_tier: frequency_tier(freq.open_count),
            boost,
        })
    }

    pub fn record_interaction(&self, request: InteractionRequest) -> Result<()> {
        let fts = self.fts.lock().unwrap();
        let tracker = InteractionTracker::new(&fts);
        tracker.record_interaction(Interaction {
            id: 0,
            normalized_query: request.query,
            item_id: request.selected_item_id,
            path: request.selected_path,
            match_type: request.match_type,
            result_position: request.result_position,
            frontmost_app: request.frontmost_app,
            timestamp: now_unix(),
        })
    }

    pub fn get_path_preferences(&self, limit: usize) -> Result<Vec<DirPreference>> {
        let fts = self.fts.lock().unwrap();
        let path_preferences = PathPreferences::new(&fts, &self.config.feedback);
        path_preferences.top_directories(limit)
    }

    pub fn get_file_type_affinity(&self) -> Result<AffinityStats> {
        let fts = self.fts.lock().unwrap();
        let type_affinity = TypeAffinity::new(&fts, &self.config.feedback);
        type_affinity.affinity_stats()
    }

    pub fn run_aggregation(&self) -> Result<AggregationReport> {
        let fts = self.fts.lock().unwrap();
        let path_preferences = PathPreferences::new(&fts, &self.config.feedback);
        let type_affinity = TypeAffinity::new(&fts, &self.config.feedback);
        let aggregator = FeedbackAggregator::new(&fts, &path_preferences, &type_affinity);

        aggregator.run_aggregation()?;
        let (feedback_cleaned, interactions_cleaned) =
            aggregator.cleanup(self.config.feedback.feedback_retention_days, self.config.feedback.interaction_retention_days)?;
        let last_aggregation = aggregator.last_aggregation_time()?;

        Ok(AggregationReport { aggregated: true, feedback_cleaned, interactions_cleaned, last_aggregation })
    }

    pub fn export_interaction_data(&self) -> Result<ExportResult> {
        let fts = self.fts.lock().unwrap();
        let tracker = InteractionTracker::new(&fts);
        let interactions = tracker.export_data()?;
        Ok(ExportResult { count: interactions.len(), interactions })
    }

    // --- Indexer control surface (§6 "indexer control" group) ---------

    pub fn start_indexing(&self, roots: Vec<PathBuf>) -> StartIndexingResult {
        let queued_paths = self.pipeline.start_indexing(roots);
        self.running.store(true, Ordering::SeqCst);
        self.spawn_embedding_thread();
        StartIndexingResult { success: true, queued_paths, timestamp: now_unix() }
    }

    pub fn stop_indexing(&self) {
        self.pipeline.stop();
        if let Some(embedding) = self.embedding_pipeline.lock().unwrap().take() {
            embedding.stop();
        }
        if let Some(handle) = self.embedding_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn pause_indexing(&self) -> IndexingControlResult {
        self.pipeline.pause_indexing();
        if let Some(embedding) = self.embedding_pipeline.lock().unwrap().as_ref() {
            embedding.pause();
        }
        IndexingControlResult { paused: true, queued_paths: self.pipeline.queue_status().pending }
    }

    pub fn resume_indexing(&self) -> IndexingControlResult {
        self.pipeline.resume_indexing();
        if let Some(embedding) = self.embedding_pipeline.lock().unwrap().as_ref() {
            embedding.resume();
        }
        IndexingControlResult { paused: false, queued_paths: self.pipeline.queue_status().pending }
    }

    /// §9.1: always clamps to 1 worker when `active` is true, even mid-rebuild.
    pub fn set_user_active(&self, active: bool) -> UserActiveResult {
        let prep_workers = self.pipeline.set_user_active(active);
        UserActiveResult { active, prep_workers }
    }

    pub fn reindex_path(&self, path: PathBuf) -> Result<()> {
        self.pipeline.reindex_path(path);
        Ok(())
    }

    pub fn rebuild_all(&self) -> Result<RebuildResult> {
        self.pipeline.rebuild_all()?;
        Ok(RebuildResult { cleared: true, reindexing_started: true })
    }

    pub fn get_queue_status(&self) -> QueueStatusReport {
        let status = self.pipeline.queue_status();
        QueueStatusReport {
            pending: status.pending,
            processing: status.processing,
            failed: status.failed,
            dropped: status.dropped,
            paused: status.paused,
            preparing: status.preparing,
            writing: status.writing,
            coalesced: status.coalesced,
            stale_dropped: status.stale_dropped,
            prep_workers: status.prep_workers,
            writer_batch_depth: status.writer_batch_depth,
            roots: status.roots,
            last_progress_report: LastProgressReport { scanned: status.scanned, total: status.total },
            bsignore_path: self.path_rules.ignore_path().map(|p| p.to_string_lossy().into_owned()),
            bsignore_loaded: self.path_rules.ignore_path().is_some(),
            bsignore_pattern_count: self.path_rules.ignore_pattern_count(),
            bsignore_last_loaded_at_ms: self.path_rules.ignore_loaded_at_ms(),
        }
    }

    /// Drains pipeline/embedding notifications for a host to forward as
    /// `indexingProgress` / `indexingComplete` / `indexingError` /
    /// `bsignoreReloaded` events.
    pub fn poll_event(&self) -> Option<PipelineEvent> {
        self.pipeline.poll_event()
    }

    fn spawn_embedding_thread(&self) {
        let (Some(index), Some(embedder)) = (self.vector_index.clone(), self.embedder.clone()) else { return };
        let fts = self.fts.clone();
        let generation_id = self.generation_id.clone();
        let index_path = self.data_dir.join("vectors.bin.json");
        let meta_path = self.data_dir.join("vectors.meta.json");

        let pipeline = Arc::new(EmbeddingPipeline::new(fts, index, embedder, generation_id, EmbeddingPipelineConfig::default()));
        let pipeline_for_thread = pipeline.clone();
        let handle = std::thread::spawn(move || pipeline_for_thread.run(&index_path, &meta_path));

        *self.embedding_thread.lock().unwrap() = Some(handle);
        *self.embedding_pipeline.lock().unwrap() = Some(pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Arc<Engine> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(Engine::new(Config::default(), dir.path().to_path_buf(), None).unwrap())
    }

    #[test]
    fn health_reports_empty_index() {
        let engine = engine();
        let health = engine.get_health().unwrap();
        assert!(!health.index_health.is_healthy);
        assert_eq!(health.index_health.total_indexed_items, 0);
    }

    #[test]
    fn record_feedback_and_interaction_round_trip() {
        let engine = engine();
        let fts = engine.fts.lock().unwrap();
        let item_id = fts
            .upsert_item("/a/doc.txt", "doc.txt", "txt", crate::types::ItemKind::Text, 10, 0.0, 0.0, "", crate::types::Sensitivity::Normal, "/a", 0.0)
            .unwrap();
        drop(fts);

        engine
            .record_feedback(FeedbackRequest { item_id, action: FeedbackAction::Open, query: "doc".into(), position: 0 })
            .unwrap();
        engine
            .record_interaction(InteractionRequest {
                query: "doc".into(),
                selected_item_id: item_id,
                selected_path: "/a/doc.txt".into(),
                match_type: MatchType::ExactName,
                result_position: 0,
                frontmost_app: None,
            })
            .unwrap();

        let frequency = engine.get_frequency(item_id).unwrap();
        assert_eq!(frequency.frequency_tier, 0);
    }

    #[test]
    fn aggregation_report_reflects_watermark() {
        let engine = engine();
        let report = engine.run_aggregation().unwrap();
        assert!(report.aggregated);
        assert!(report.last_aggregation.is_some());
    }

    #[test]
    fn queue_status_starts_with_no_roots() {
        let engine = engine();
        let status = engine.get_queue_status();
        assert!(status.roots.is_empty());
        assert!(!status.bsignore_loaded);
    }
}
