//! Background job that drives the vector index from unembedded chunks
//! (§4.12).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::fts_store::FtsStore;
use crate::memory::{MemorySampler, MemoryThresholds, PressureLevel, SysinfoSampler};
use crate::types::{GenerationLifecycle, GenerationState, VectorMapping, VectorMappingState};
use crate::vector_index::VectorIndex;
use crate::vector_store::VectorStore;

pub trait Embedder: Send + Sync {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimensions(&self) -> usize;
    fn model_id(&self) -> &str;
}

/// Embeds with `fastembed`'s ONNX runtime backend. Only present when the
/// `semantic` feature is enabled.
#[cfg(feature = "semantic")]
pub struct FastEmbedEmbedder {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
    dimensions: usize,
    model_id: String,
}

#[cfg(feature = "semantic")]
impl FastEmbedEmbedder {
    pub fn new(model_id: &str, dimensions: usize) -> Result<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model_enum = match model_id {
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
            _ => EmbeddingModel::AllMiniLML6V2,
        };
        let model = TextEmbedding::try_new(InitOptions::new(model_enum))
            .map_err(|e| crate::error::Error::Unavailable(e.to_string()))?;
        Ok(Self { model: std::sync::Mutex::new(model), dimensions, model_id: model_id.to_string() })
    }
}

#[cfg(feature = "semantic")]
impl Embedder for FastEmbedEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock().unwrap();
        model.embed(texts.to_vec(), None).map_err(|e| crate::error::Error::Internal(e.to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Progress { processed: usize, total: usize },
    Finished,
    Error(String),
}

pub struct EmbeddingPipelineConfig {
    pub batch_size: usize,
    pub soft_pressure_min_batch: usize,
    pub hard_pressure_min_batch: usize,
    pub soft_memory_limit_bytes: u64,
    pub hard_memory_limit_bytes: u64,
    pub save_every_items: usize,
    pub save_every_secs: u64,
    pub idle_sleep_ms: u64,
    pub provider: String,
}

impl Default for EmbeddingPipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            soft_pressure_min_batch: 16,
            hard_pressure_min_batch: 1,
            soft_memory_limit_bytes: 1_500 * 1024 * 1024,
            hard_memory_limit_bytes: 2_500 * 1024 * 1024,
            save_every_items: 1000,
            save_every_secs: 60,
            idle_sleep_ms: 500,
            provider: "local".to_string(),
        }
    }
}

pub struct EmbeddingPipeline {
    fts: Arc<Mutex<FtsStore>>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    config: EmbeddingPipelineConfig,
    generation_id: String,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    processed_count: Arc<AtomicUsize>,
    memory: Arc<dyn MemorySampler>,
    tx: mpsc::Sender<PipelineEvent>,
    rx: Mutex<mpsc::Receiver<PipelineEvent>>,
}

impl EmbeddingPipeline {
    pub fn new(
        fts: Arc<Mutex<FtsStore>>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generation_id: String,
        config: EmbeddingPipelineConfig,
    ) -> Self {
        Self::with_memory_sampler(fts, index, embedder, generation_id, config, Arc::new(SysinfoSampler::new()))
    }

    pub fn with_memory_sampler(
        fts: Arc<Mutex<FtsStore>>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generation_id: String,
        config: EmbeddingPipelineConfig,
        memory: Arc<dyn MemorySampler>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            fts,
            index,
            embedder,
            config,
            generation_id,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            processed_count: Arc::new(AtomicUsize::new(0)),
            memory,
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Batch size for the next fetch, folding in memory pressure (§4.12 step
    /// 2): halved under soft pressure, clamped to the configured floor under
    /// hard pressure.
    fn pressure_aware_batch_size(&self) -> usize {
        let thresholds =
            MemoryThresholds { soft_limit_bytes: self.config.soft_memory_limit_bytes, hard_limit_bytes: self.config.hard_memory_limit_bytes };
        match thresholds.classify(self.memory.rss_bytes()) {
            PressureLevel::Hard => self.config.hard_pressure_min_batch.max(1),
            PressureLevel::Soft => (self.config.batch_size / 2).max(1).min(self.config.soft_pressure_min_batch.max(1)),
            PressureLevel::Normal => self.config.batch_size,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn processed_count(&self) -> usize {
        self.processed_count.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn poll_event(&self) -> Option<PipelineEvent> {
        self.rx.lock().unwrap().try_recv().ok()
    }

    fn unembedded_candidates(fts: &FtsStore, generation_id: &str, limit: usize) -> Result<Vec<(i64, String)>> {
        let conn = fts.conn();
        let store = VectorStore::new(conn)?;
        let mapped_items: std::collections::HashSet<i64> =
            store.get_all_mappings_for_generation(generation_id)?.into_iter().map(|m| m.item_id).collect();

        let mut stmt = conn.prepare(
            "SELECT DISTINCT cm.item_id, i.path FROM chunk_meta cm
             JOIN items i ON i.id = cm.item_id
             WHERE cm.chunk_index = 0",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?;
        let mut candidates = Vec::new();
        for row in rows {
            let (item_id, path) = row?;
            if !mapped_items.contains(&item_id) {
                candidates.push((item_id, path));
                if candidates.len() >= limit {
                    break;
                }
            }
        }
        Ok(candidates)
    }

    fn fetch_chunk_text(fts: &FtsStore, item_id: i64) -> Result<Option<String>> {
        let conn = fts.conn();
        conn.query_row(
            "SELECT content FROM search_index_fts WHERE rowid = (
                SELECT fts_rowid FROM chunk_meta WHERE item_id = ?1 AND chunk_index = 0
             )",
            rusqlite::params![item_id],
            |r| r.get(0),
        )
        .optional_or_none()
    }

    /// Runs the embedding loop to completion on the calling thread. Intended
    /// to be driven from a dedicated background thread by the pipeline
    /// orchestrator.
    pub fn run(&self, index_path: &std::path::Path, meta_path: &std::path::Path) {
        self.running.store(true, Ordering::SeqCst);

        let total = {
            let fts = self.fts.lock().unwrap();
            Self::unembedded_candidates(&fts, &self.generation_id, usize::MAX).map(|c| c.len()).unwrap_or(0)
        };

        if let Ok(fts) = self.fts.lock() {
            let store = VectorStore::new(fts.conn());
            if let Ok(store) = store {
                let _ = store.upsert_generation_state(&GenerationState {
                    generation_id: self.generation_id.clone(),
                    model_id: self.embedder.model_id().to_string(),
                    dimensions: self.embedder.dimensions(),
                    provider: self.config.provider.clone(),
                    state: GenerationLifecycle::Building,
                    progress_pct: 0.0,
                    active: false,
                });
            }
        }

        let mut last_save = Instant::now();
        let mut items_since_save = 0usize;

        while self.running.load(Ordering::SeqCst) {
            if self.paused.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(self.config.idle_sleep_ms));
                continue;
            }

            let batch_size = self.pressure_aware_batch_size();
            let candidates = {
                let fts = self.fts.lock().unwrap();
                match Self::unembedded_candidates(&fts, &self.generation_id, batch_size) {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = self.tx.send(PipelineEvent::Error(e.to_string()));
                        break;
                    }
                }
            };

            if candidates.is_empty() {
                break;
            }

            let mut texts = Vec::with_capacity(candidates.len());
            let mut valid_candidates = Vec::with_capacity(candidates.len());
            {
                let fts = self.fts.lock().unwrap();
                for (item_id, path) in &candidates {
                    if let Ok(Some(text)) = Self::fetch_chunk_text(&fts, *item_id) {
                        texts.push(text);
                        valid_candidates.push((*item_id, path.clone()));
                    }
                }
            }

            let embeddings = match self.embedder.embed_batch(&texts) {
                Ok(e) => e,
                Err(_) => {
                    // Batch failure: retry one item at a time.
                    let mut per_item = Vec::new();
                    for text in &texts {
                        match self.embedder.embed_batch(std::slice::from_ref(text)) {
                            Ok(mut v) => per_item.push(v.pop()),
                            Err(_) => per_item.push(None),
                        }
                    }
                    per_item.into_iter().flatten().collect()
                }
            };

            let now = crate::clock::now_unix();
            for ((item_id, _path), embedding) in valid_candidates.iter().zip(embeddings.iter()) {
                let label = match self.index.add_vector(embedding) {
                    Ok(l) => l,
                    Err(_) => continue,
                };
                let fts = self.fts.lock().unwrap();
                let store = match VectorStore::new(fts.conn()) {
                    Ok(s) => s,
                    Err(_) => {
                        self.index.delete_vector(label);
                        continue;
                    }
                };
                let mapping = VectorMapping {
                    item_id: *item_id,
                    hnsw_label: label,
                    model_id: self.embedder.model_id().to_string(),
                    generation_id: self.generation_id.clone(),
                    dimensions: self.embedder.dimensions(),
                    provider: self.config.provider.clone(),
                    passage_ordinal: 0,
                    state: VectorMappingState::Active,
                    embedded_at: now,
                };
                if store.add_mapping(&mapping).is_err() {
                    self.index.delete_vector(label);
                }
            }

            let processed = self.processed_count.fetch_add(valid_candidates.len(), Ordering::SeqCst) + valid_candidates.len();
            let _ = self.tx.send(PipelineEvent::Progress { processed, total });

            items_since_save += valid_candidates.len();
            if items_since_save >= self.config.save_every_items || last_save.elapsed() >= Duration::from_secs(self.config.save_every_secs)
            {
                let _ = self.index.save(index_path, meta_path, now);
                items_since_save = 0;
                last_save = Instant::now();
            }

            std::thread::sleep(Duration::from_millis(self.config.idle_sleep_ms));
        }

        let now = crate::clock::now_unix();
        let _ = self.index.save(index_path, meta_path, now);
        self.running.store(false, Ordering::SeqCst);
        let _ = self.tx.send(PipelineEvent::Finished);
    }
}

trait OptionalOrNone<T> {
    fn optional_or_none(self) -> Result<Option<T>>;
}

impl<T> OptionalOrNone<T> for rusqlite::Result<T> {
    fn optional_or_none(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemKind, Sensitivity};

    struct StubEmbedder {
        dims: usize,
    }

    impl Embedder for StubEmbedder {
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32; self.dims]).collect())
        }
        fn dimensions(&self) -> usize {
            self.dims
        }
        fn model_id(&self) -> &str {
            "stub"
        }
    }

    #[test]
    fn finds_unembedded_candidates() {
        let fts = FtsStore::open_in_memory().unwrap();
        let id = fts.upsert_item("/a.txt", "a.txt", "txt", ItemKind::Text, 10, 1.0, 2.0, "", Sensitivity::Normal, "/", 3.0).unwrap();
        fts.insert_chunks(id, "a.txt", "/a.txt", &[("c0".into(), 0, "hello world".into())]).unwrap();

        let candidates = EmbeddingPipeline::unembedded_candidates(&fts, "gen-1", 10).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, id);
    }

    #[test]
    fn run_embeds_and_maps_all_candidates() {
        use crate::config::HnswConfig;
        use crate::vector_index::VectorIndexMetadata;

        let fts = Arc::new(Mutex::new(FtsStore::open_in_memory().unwrap()));
        {
            let store = fts.lock().unwrap();
            let id = store.upsert_item("/a.txt", "a.txt", "txt", ItemKind::Text, 10, 1.0, 2.0, "", Sensitivity::Normal, "/", 3.0).unwrap();
            store.insert_chunks(id, "a.txt", "/a.txt", &[("c0".into(), 0, "hello world".into())]).unwrap();
        }

        let index = Arc::new(VectorIndex::new(HnswConfig::default()));
        index
            .configure(VectorIndexMetadata {
                schema_version: 1,
                dimensions: 4,
                model_id: "stub".into(),
                generation_id: "gen-1".into(),
                provider: "local".into(),
            })
            .unwrap();
        index.create(100).unwrap();

        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder { dims: 4 });
        let pipeline = EmbeddingPipeline::new(fts.clone(), index.clone(), embedder, "gen-1".into(), EmbeddingPipelineConfig::default());

        let dir = tempfile::tempdir().unwrap();
        pipeline.run(&dir.path().join("v.json"), &dir.path().join("m.json"));

        assert_eq!(pipeline.processed_count(), 1);
        assert_eq!(index.len(), 1);
    }
}
