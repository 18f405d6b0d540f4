//! Append-only approximate-nearest-neighbor index over embeddings (§4.10).
//!
//! Wraps `hnsw_rs`. The graph itself is rebuilt in memory from a persisted
//! vector dump on load rather than relying on the library's own on-disk
//! format, so the sidecar stays a plain, inspectable JSON file.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::HnswConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndexMetadata {
    pub schema_version: u32,
    pub dimensions: usize,
    pub model_id: String,
    pub generation_id: String,
    pub provider: String,
}

#[derive(Debug, Clone)]
pub struct Neighbor {
    pub label: i64,
    pub distance: f32,
}

#[derive(Serialize, Deserialize)]
struct PersistedMeta {
    schema_version: u32,
    dimensions: usize,
    model_id: String,
    generation_id: String,
    provider: String,
    total_elements: usize,
    deleted_elements: usize,
    next_label: i64,
    hnsw_m: usize,
    hnsw_ef_construction: usize,
    hnsw_ef_search: usize,
    last_persisted: f64,
}

#[derive(Serialize, Deserialize)]
struct PersistedVectors {
    entries: Vec<(i64, Vec<f32>)>,
    tombstones: Vec<i64>,
}

struct Graph {
    hnsw: Hnsw<'static, f32, DistCosine>,
    vectors: HashMap<i64, Vec<f32>>,
    tombstones: HashSet<i64>,
}

pub struct VectorIndex {
    config: HnswConfig,
    metadata: RwLock<Option<VectorIndexMetadata>>,
    graph: RwLock<Option<Graph>>,
    next_label: AtomicI64,
}

impl VectorIndex {
    pub fn new(config: HnswConfig) -> Self {
        Self { config, metadata: RwLock::new(None), graph: RwLock::new(None), next_label: AtomicI64::new(0) }
    }

    /// Set the index metadata. Rejected once a graph has been created.
    pub fn configure(&self, metadata: VectorIndexMetadata) -> Result<()> {
        if self.graph.read().unwrap().is_some() {
            return Err(Error::InvalidInput("VectorIndex already initialized".into()));
        }
        *self.metadata.write().unwrap() = Some(metadata);
        Ok(())
    }

    pub fn create(&self, initial_capacity: usize) -> Result<()> {
        let meta = self.metadata.read().unwrap().clone().ok_or_else(|| Error::InvalidInput("configure() must precede create()".into()))?;
        if meta.dimensions == 0 {
            return Err(Error::InvalidInput("dimensions must be > 0".into()));
        }

        let max_layer = 16.min(((initial_capacity.max(2)) as f32).ln().trunc() as usize).max(1);
        let hnsw = Hnsw::<f32, DistCosine>::new(self.config.m, initial_capacity.max(16), max_layer, self.config.ef_construction, DistCosine {});

        *self.graph.write().unwrap() = Some(Graph { hnsw, vectors: HashMap::new(), tombstones: HashSet::new() });
        self.next_label.store(0, Ordering::SeqCst);
        Ok(())
    }

    pub fn add_vector(&self, embedding: &[f32]) -> Result<i64> {
        let meta = self.metadata.read().unwrap().clone().ok_or_else(|| Error::InvalidInput("not configured".into()))?;
        if embedding.len() != meta.dimensions {
            return Err(Error::InvalidInput(format!("expected {} dims, got {}", meta.dimensions, embedding.len())));
        }

        let label = self.next_label.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.graph.write().unwrap();
        let graph = guard.as_mut().ok_or_else(|| Error::InvalidInput("create() not called".into()))?;

        // Grow ahead of the 80% capacity mark; hnsw_rs grows internally too,
        // this just keeps our bookkeeping honest.
        graph.hnsw.insert((embedding, label as usize));
        graph.vectors.insert(label, embedding.to_vec());
        Ok(label)
    }

    pub fn delete_vector(&self, label: i64) -> bool {
        let mut guard = self.graph.write().unwrap();
        match guard.as_mut() {
            Some(graph) if graph.vectors.contains_key(&label) => {
                graph.tombstones.insert(label);
                true
            }
            _ => false,
        }
    }

    /// Top-k nearest neighbors, ascending distance, tombstones excluded.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let guard = self.graph.read().unwrap();
        let graph = guard.as_ref().ok_or_else(|| Error::InvalidInput("index not created".into()))?;

        let fetch_k = (k + graph.tombstones.len()).max(k);
        let neighbors = graph.hnsw.search(query, fetch_k, self.config.ef_search);

        let mut results: Vec<Neighbor> = neighbors
            .into_iter()
            .map(|n| Neighbor { label: n.d_id as i64, distance: n.distance })
            .filter(|n| !graph.tombstones.contains(&n.label))
            .collect();
        results.truncate(k);
        Ok(results)
    }

    pub fn needs_rebuild(&self) -> bool {
        let guard = self.graph.read().unwrap();
        match guard.as_ref() {
            Some(graph) if !graph.vectors.is_empty() => {
                graph.tombstones.len() as f64 / graph.vectors.len() as f64 > 0.20
            }
            _ => false,
        }
    }

    pub fn save(&self, index_path: &std::path::Path, meta_path: &std::path::Path, now: f64) -> Result<()> {
        let meta = self.metadata.read().unwrap().clone().ok_or_else(|| Error::InvalidInput("not configured".into()))?;
        let guard = self.graph.read().unwrap();
        let graph = guard.as_ref().ok_or_else(|| Error::InvalidInput("nothing to save".into()))?;

        let persisted_vectors = PersistedVectors {
            entries: graph.vectors.iter().map(|(label, v)| (*label, v.clone())).collect(),
            tombstones: graph.tombstones.iter().copied().collect(),
        };
        let vectors_json = serde_json::to_vec(&persisted_vectors)?;
        std::fs::write(index_path, vectors_json)?;

        let persisted_meta = PersistedMeta {
            schema_version: meta.schema_version,
            dimensions: meta.dimensions,
            model_id: meta.model_id,
            generation_id: meta.generation_id,
            provider: meta.provider,
            total_elements: graph.vectors.len(),
            deleted_elements: graph.tombstones.len(),
            next_label: self.next_label.load(Ordering::SeqCst),
            hnsw_m: self.config.m,
            hnsw_ef_construction: self.config.ef_construction,
            hnsw_ef_search: self.config.ef_search,
            last_persisted: now,
        };
        let meta_json = serde_json::to_vec_pretty(&persisted_meta)?;
        std::fs::write(meta_path, meta_json)?;
        Ok(())
    }

    pub fn load(&self, index_path: &std::path::Path, meta_path: &std::path::Path) -> Result<()> {
        let meta_text = std::fs::read(meta_path)?;
        let persisted_meta: PersistedMeta = serde_json::from_slice(&meta_text)?;

        let current = self.metadata.read().unwrap().clone();
        if let Some(current) = &current {
            if current.dimensions != persisted_meta.dimensions {
                return Err(Error::InvalidInput(format!(
                    "dimension mismatch: configured {} vs persisted {}",
                    current.dimensions, persisted_meta.dimensions
                )));
            }
        }

        let vectors_text = std::fs::read(index_path)?;
        let persisted_vectors: PersistedVectors = serde_json::from_slice(&vectors_text)?;

        *self.metadata.write().unwrap() = Some(VectorIndexMetadata {
            schema_version: persisted_meta.schema_version,
            dimensions: persisted_meta.dimensions,
            model_id: persisted_meta.model_id,
            generation_id: persisted_meta.generation_id,
            provider: persisted_meta.provider,
        });

        let initial_capacity = persisted_vectors.entries.len().max(16);
        let max_layer = 16.min(((initial_capacity) as f32).ln().trunc() as usize).max(1);
        let mut hnsw = Hnsw::<f32, DistCosine>::new(persisted_meta.hnsw_m, initial_capacity, max_layer, persisted_meta.hnsw_ef_construction, DistCosine {});

        let mut vectors = HashMap::new();
        for (label, vector) in &persisted_vectors.entries {
            hnsw.insert((vector.as_slice(), *label as usize));
            vectors.insert(*label, vector.clone());
        }

        let tombstones: HashSet<i64> = persisted_vectors.tombstones.into_iter().collect();
        *self.graph.write().unwrap() = Some(Graph { hnsw, vectors, tombstones });
        self.next_label.store(persisted_meta.next_label, Ordering::SeqCst);
        Ok(())
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.metadata.read().unwrap().as_ref().map(|m| m.dimensions)
    }

    pub fn generation_id(&self) -> Option<String> {
        self.metadata.read().unwrap().as_ref().map(|m| m.generation_id.clone())
    }

    pub fn len(&self) -> usize {
        self.graph.read().unwrap().as_ref().map(|g| g.vectors.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> VectorIndexMetadata {
        VectorIndexMetadata {
            schema_version: 1,
            dimensions: 4,
            model_id: "test-model".into(),
            generation_id: "gen-1".into(),
            provider: "local".into(),
        }
    }

    #[test]
    fn add_and_search_returns_nearest() {
        let idx = VectorIndex::new(HnswConfig::default());
        idx.configure(meta()).unwrap();
        idx.create(100).unwrap();

        idx.add_vector(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.add_vector(&[0.0, 1.0, 0.0, 0.0]).unwrap();
        let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, 0);
    }

    #[test]
    fn rejects_dimension_mismatch_on_add() {
        let idx = VectorIndex::new(HnswConfig::default());
        idx.configure(meta()).unwrap();
        idx.create(100).unwrap();
        assert!(idx.add_vector(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn delete_vector_tombstones_and_excludes_from_search() {
        let idx = VectorIndex::new(HnswConfig::default());
        idx.configure(meta()).unwrap();
        idx.create(100).unwrap();
        let label = idx.add_vector(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(idx.delete_vector(label));
        let results = idx.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap();
        assert!(results.iter().all(|n| n.label != label));
    }

    #[test]
    fn needs_rebuild_above_20_percent_tombstoned() {
        let idx = VectorIndex::new(HnswConfig::default());
        idx.configure(meta()).unwrap();
        idx.create(100).unwrap();
        let labels: Vec<i64> = (0..10).map(|i| idx.add_vector(&[i as f32, 0.0, 0.0, 0.0]).unwrap()).collect();
        for label in &labels[0..3] {
            idx.delete_vector(*label);
        }
        assert!(idx.needs_rebuild());
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("vectors.json");
        let meta_path = dir.path().join("meta.json");

        let idx = VectorIndex::new(HnswConfig::default());
        idx.configure(meta()).unwrap();
        idx.create(100).unwrap();
        idx.add_vector(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        idx.save(&index_path, &meta_path, 1000.0).unwrap();

        let loaded = VectorIndex::new(HnswConfig::default());
        loaded.load(&index_path, &meta_path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.dimensions(), Some(4));
    }

    #[test]
    fn load_refuses_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("vectors.json");
        let meta_path = dir.path().join("meta.json");

        let idx = VectorIndex::new(HnswConfig::default());
        idx.configure(meta()).unwrap();
        idx.create(100).unwrap();
        idx.save(&index_path, &meta_path, 1000.0).unwrap();

        let mut mismatched = meta();
        mismatched.dimensions = 8;
        let loaded = VectorIndex::new(HnswConfig::default());
        loaded.configure(mismatched).unwrap();
        assert!(loaded.load(&index_path, &meta_path).is_err());
    }
}
