//! Per-item state transitions: validate → stat → extract → chunk → hash →
//! upsert (§4.7).
//!
//! `prepare_work_item` runs off the critical DB path (called from a prep
//! worker thread); `apply_prepared_work` runs inside the writer's
//! transaction and is the only place that touches `FtsStore`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};

use crate::chunker::Chunker;
use crate::config::ChunkerConfig;
use crate::extractor::{CancellationFlag, ExtractResult, Extractor};
use crate::fts_store::FtsStore;
use crate::path_rules::PathRules;
use crate::types::{
    IndexResult, IndexStatus, ItemKind, PreparedFailure, PreparedWork, Sensitivity, ValidationResult,
    WorkItem, WorkType,
};

/// Extraction is retried up to this many times beyond the caller's retry
/// count, per §4.7 ("up to (2 − retryCount) additional times").
const MAX_EXTRACTION_ATTEMPTS_BEYOND_RETRY: u32 = 2;

pub struct Indexer {
    extractor: Arc<dyn Extractor>,
    path_rules: Arc<PathRules>,
    chunker: Chunker,
}

impl Indexer {
    pub fn new(extractor: Arc<dyn Extractor>, path_rules: Arc<PathRules>, chunker_config: ChunkerConfig) -> Self {
        Self { extractor, path_rules, chunker: Chunker::new(chunker_config) }
    }

    /// Shared with the scan thread so it can prune excluded subtrees
    /// without walking into them (§4.8).
    pub fn path_rules(&self) -> &Arc<PathRules> {
        &self.path_rules
    }

    pub fn prepare_work_item(&self, item: &WorkItem, generation: u64) -> PreparedWork {
        let path_str = item.path.to_string_lossy().into_owned();
        let parent_path = item.path.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();

        let mut prepared = PreparedWork {
            work_type: item.work_type,
            path: item.path.clone(),
            validation: ValidationResult::Include,
            size: None,
            created_at: None,
            modified_at: None,
            sensitivity: Sensitivity::Normal,
            kind: ItemKind::Unknown,
            parent_path,
            content_hash: None,
            chunks: Vec::new(),
            extracted: false,
            non_extractable: false,
            failure: None,
            generation,
            retry_count: item.retry_count,
            lane: item.lane,
        };

        match item.work_type {
            WorkType::Delete => prepared,
            WorkType::NewFile | WorkType::ModifiedContent => {
                self.prepare_new_or_modified(&path_str, item, &mut prepared);
                prepared
            }
            WorkType::RescanDirectory => {
                self.prepare_rescan(&path_str, item, &mut prepared);
                prepared
            }
        }
    }

    fn prepare_new_or_modified(&self, path_str: &str, item: &WorkItem, prepared: &mut PreparedWork) {
        prepared.validation = self.path_rules.validate(path_str, item.known_size);
        if prepared.validation == ValidationResult::Exclude {
            return;
        }

        let metadata = match std::fs::metadata(&item.path) {
            Ok(m) => m,
            Err(e) => {
                prepared.failure = Some(PreparedFailure { stage: "metadata".into(), message: e.to_string() });
                return;
            }
        };

        let size = metadata.len();
        let modified_at = metadata.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs_f64()).unwrap_or_else(crate::clock::now_unix);
        let created_at = metadata.created().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs_f64()).unwrap_or(modified_at);

        prepared.size = Some(size);
        prepared.created_at = Some(created_at);
        prepared.modified_at = Some(modified_at);
        prepared.sensitivity = self.path_rules.classify_sensitivity(path_str);

        if prepared.validation == ValidationResult::MetadataOnly {
            return;
        }

        let ext = item.path.extension().map(|e| e.to_string_lossy().to_lowercase()).unwrap_or_default();
        prepared.kind = ItemKind::from_extension(&ext);

        if !prepared.kind.is_extractable() {
            prepared.non_extractable = true;
            return;
        }

        self.extract_with_retries(&item.path, prepared);
    }

    fn extract_with_retries(&self, path: &Path, prepared: &mut PreparedWork) {
        let cancel = CancellationFlag::new();
        let attempts = MAX_EXTRACTION_ATTEMPTS_BEYOND_RETRY.saturating_sub(prepared.retry_count).max(1);

        let mut last_result = ExtractResult::Unknown("not attempted".into());
        for _ in 0..attempts {
            last_result = self.extractor.extract(path, prepared.kind, &cancel);
            match &last_result {
                ExtractResult::Ok(_) | ExtractResult::UnsupportedFormat | ExtractResult::Cancelled => break,
                _ => continue,
            }
        }

        match last_result {
            ExtractResult::Ok(text) => {
                let hash = Sha256::digest(text.as_bytes());
                prepared.content_hash = Some(hex_encode(&hash));
                prepared.chunks = self.chunker.chunk_content(&text);
                prepared.extracted = true;
            }
            ExtractResult::UnsupportedFormat => {
                prepared.non_extractable = true;
            }
            ExtractResult::Inaccessible => {
                prepared.failure = Some(PreparedFailure { stage: "extract".into(), message: "inaccessible".into() });
            }
            ExtractResult::Timeout => {
                prepared.failure = Some(PreparedFailure { stage: "extract".into(), message: "timeout".into() });
            }
            ExtractResult::Cancelled => {
                prepared.failure = Some(PreparedFailure { stage: "extract".into(), message: "cancelled".into() });
            }
            ExtractResult::Unknown(msg) => {
                prepared.failure = Some(PreparedFailure { stage: "extract".into(), message: msg });
            }
        }
    }

    fn prepare_rescan(&self, path_str: &str, item: &WorkItem, prepared: &mut PreparedWork) {
        prepared.validation = self.path_rules.validate(path_str, item.known_size);
        if prepared.validation == ValidationResult::Exclude {
            return;
        }
        if let Ok(metadata) = std::fs::metadata(&item.path) {
            prepared.size = Some(metadata.len());
            prepared.modified_at = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64());
            prepared.created_at = prepared.modified_at;
        }
        prepared.sensitivity = self.path_rules.classify_sensitivity(path_str);
    }

    pub fn apply_prepared_work(&self, fts: &FtsStore, prepared: &PreparedWork) -> crate::error::Result<IndexResult> {
        let start = Instant::now();
        let path_str = prepared.path.to_string_lossy().into_owned();

        if prepared.work_type == WorkType::Delete {
            fts.delete_item_by_path(&path_str)?;
            return Ok(IndexResult { status: IndexStatus::Deleted, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
        }

        if prepared.validation == ValidationResult::Exclude {
            return Ok(IndexResult { status: IndexStatus::Excluded, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
        }

        let (Some(size), Some(created_at), Some(modified_at)) = (prepared.size, prepared.created_at, prepared.modified_at) else {
            return Ok(IndexResult { status: IndexStatus::ExtractionFailed, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
        };

        let existing = fts.get_item_by_path(&path_str)?;

        if prepared.work_type == WorkType::ModifiedContent {
            if let Some(existing) = &existing {
                if existing.size == size && existing.modified_at == modified_at {
                    return Ok(IndexResult { status: IndexStatus::Skipped, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
                }
            }
        }

        let name = prepared.name();
        let ext = prepared.ext();
        let existing_hash = existing.as_ref().map(|i| i.content_hash.clone()).unwrap_or_default();
        let hash_to_store = prepared.content_hash.clone().unwrap_or(existing_hash.clone());

        let item_id = fts.upsert_item(
            &path_str,
            &name,
            &ext,
            prepared.kind,
            size,
            created_at,
            modified_at,
            &hash_to_store,
            prepared.sensitivity,
            &prepared.parent_path,
            crate::clock::now_unix(),
        )?;

        if prepared.validation == ValidationResult::MetadataOnly {
            return Ok(IndexResult { status: IndexStatus::MetadataOnly, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
        }

        if prepared.non_extractable {
            fts.clear_failures(item_id)?;
            return Ok(IndexResult { status: IndexStatus::Indexed, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
        }

        if let Some(failure) = &prepared.failure {
            fts.record_failure(item_id, &failure.stage, &failure.message, crate::clock::now_unix())?;
            return Ok(IndexResult { status: IndexStatus::ExtractionFailed, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
        }

        if let Some(new_hash) = &prepared.content_hash {
            if *new_hash == existing_hash && !existing_hash.is_empty() {
                return Ok(IndexResult { status: IndexStatus::Skipped, chunks_inserted: 0, duration_ms: elapsed_ms(start) });
            }
        }

        let chunk_rows: Vec<(String, usize, String)> = prepared
            .chunks
            .iter()
            .map(|(index, text, _offset)| (crate::chunker::compute_chunk_id(&path_str, *index), *index, text.clone()))
            .collect();
        fts.insert_chunks(item_id, &name, &path_str, &chunk_rows)?;
        fts.clear_failures(item_id)?;

        Ok(IndexResult { status: IndexStatus::Indexed, chunks_inserted: chunk_rows.len(), duration_ms: elapsed_ms(start) })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lane;
    use std::path::PathBuf;

    struct StubExtractor(&'static str);
    impl Extractor for StubExtractor {
        fn extract(&self, _path: &Path, _kind: ItemKind, _cancel: &CancellationFlag) -> ExtractResult {
            ExtractResult::Ok(self.0.to_string())
        }
    }

    fn indexer(text: &'static str) -> Indexer {
        Indexer::new(Arc::new(StubExtractor(text)), Arc::new(PathRules::default()), ChunkerConfig::default())
    }

    #[test]
    fn prepares_new_file_with_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();

        let idx = indexer("quantum entanglement in quantum computing");
        let item = WorkItem::new(WorkType::NewFile, path, Lane::Live);
        let prepared = idx.prepare_work_item(&item, 1);

        assert!(prepared.extracted);
        assert!(!prepared.chunks.is_empty());
        assert!(prepared.content_hash.is_some());
    }

    #[test]
    fn excluded_path_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_modules").join("x.js");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "ignored").unwrap();

        let idx = indexer("ignored");
        let item = WorkItem::new(WorkType::NewFile, path, Lane::Live);
        let prepared = idx.prepare_work_item(&item, 1);
        assert_eq!(prepared.validation, ValidationResult::Exclude);
    }

    #[test]
    fn apply_indexes_and_inserts_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "placeholder").unwrap();

        let idx = indexer("byzantine consensus in distributed systems");
        let item = WorkItem::new(WorkType::NewFile, path, Lane::Live);
        let prepared = idx.prepare_work_item(&item, 1);

        let fts = FtsStore::open_in_memory().unwrap();
        let result = idx.apply_prepared_work(&fts, &prepared).unwrap();
        assert_eq!(result.status, IndexStatus::Indexed);
        assert!(result.chunks_inserted > 0);
    }

    #[test]
    fn apply_skips_unchanged_modified_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "placeholder").unwrap();

        let idx = indexer("same content every time");
        let fts = FtsStore::open_in_memory().unwrap();

        let new_item = WorkItem::new(WorkType::NewFile, path.clone(), Lane::Live);
        let prepared = idx.prepare_work_item(&new_item, 1);
        idx.apply_prepared_work(&fts, &prepared).unwrap();

        let modified_item = WorkItem::new(WorkType::ModifiedContent, path, Lane::Live);
        let prepared2 = idx.prepare_work_item(&modified_item, 2);
        let result = idx.apply_prepared_work(&fts, &prepared2).unwrap();
        assert_eq!(result.status, IndexStatus::Skipped);
    }

    #[test]
    fn apply_deletes_existing_item() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "placeholder").unwrap();

        let idx = indexer("content to be deleted");
        let fts = FtsStore::open_in_memory().unwrap();

        let new_item = WorkItem::new(WorkType::NewFile, path.clone(), Lane::Live);
        let prepared = idx.prepare_work_item(&new_item, 1);
        idx.apply_prepared_work(&fts, &prepared).unwrap();

        let delete_item = WorkItem::new(WorkType::Delete, path.clone(), Lane::Live);
        let prepared2 = idx.prepare_work_item(&delete_item, 2);
        let result = idx.apply_prepared_work(&fts, &prepared2).unwrap();
        assert_eq!(result.status, IndexStatus::Deleted);
        assert!(fts.get_item_by_path(&path.to_string_lossy()).unwrap().is_none());
    }
}
