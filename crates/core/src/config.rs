//! Runtime configuration, loaded from `config.toml` or built with defaults.
//!
//! Mirrors every tunable named in the design: queue caps, watermarks, batch
//! sizes, scoring weights, and runtime limits. Nothing here is hardcoded
//! elsewhere in the crate — components take a `Config` (or a sub-struct of
//! it) at construction time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub live_lane_cap: usize,
    pub rebuild_lane_cap: usize,
    /// Out of every 100 dispatches, how many come from the Live lane.
    pub live_dispatch_share: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_queue_size: 10_000, live_lane_cap: 4_000, rebuild_lane_cap: 20_000, live_dispatch_share: 70 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scan_depth_cap: usize,
    pub batch_commit_size: usize,
    pub batch_commit_interval_ms: u64,
    pub max_pipeline_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_cap_ms: u64,
    pub scan_high_watermark: usize,
    pub scan_resume_watermark: usize,
    pub memory_pressure_sleep_ms: u64,
    pub enqueue_retry_sleep_ms: u64,
    pub memory_pressure_prep_workers: usize,
    pub soft_memory_limit_bytes: u64,
    pub hard_memory_limit_bytes: u64,
    pub max_extraction_ms: u64,
    pub writer_idle_poll_ms: u64,
    pub rebuild_drain_poll_attempts: u32,
    pub rebuild_drain_poll_interval_ms: u64,
    pub fs_watch_debounce_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan_depth_cap: 64,
            batch_commit_size: 100,
            batch_commit_interval_ms: 250,
            max_pipeline_retries: 3,
            retry_backoff_base_ms: 50,
            retry_backoff_cap_ms: 1_000,
            scan_high_watermark: 8_000,
            scan_resume_watermark: 4_000,
            memory_pressure_sleep_ms: 200,
            enqueue_retry_sleep_ms: 20,
            memory_pressure_prep_workers: 1,
            soft_memory_limit_bytes: 1_500 * 1024 * 1024,
            hard_memory_limit_bytes: 2_500 * 1024 * 1024,
            max_extraction_ms: 30_000,
            writer_idle_poll_ms: 50,
            rebuild_drain_poll_attempts: 600,
            rebuild_drain_poll_interval_ms: 100,
            fs_watch_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub target_size: usize,
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { target_size: 1000, min_size: 500, max_size: 2000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TypoLexiconConfig {
    pub max_terms_per_bucket: usize,
    pub max_total_terms: usize,
    pub max_filename_terms: usize,
    pub min_term_length: usize,
}

impl Default for TypoLexiconConfig {
    fn default() -> Self {
        Self { max_terms_per_bucket: 5_000, max_total_terms: 100_000, max_filename_terms: 50_000, min_term_length: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub initial_capacity: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self { m: 16, ef_construction: 200, ef_search: 50, initial_capacity: 100_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub exact_name: f64,
    pub prefix_name: f64,
    pub contains_name: f64,
    pub exact_path: f64,
    pub prefix_path: f64,
    pub content_coefficient: f64,
    pub fuzzy: f64,
    pub recency: f64,
    pub recency_decay_days: f64,
    pub frequency_tier1: f64,
    pub frequency_tier2: f64,
    pub frequency_tier3: f64,
    pub cwd_boost: f64,
    pub app_context_boost: f64,
    pub semantic: f64,
    pub semantic_similarity_threshold: f64,
    pub pinned_boost: f64,
    pub junk_penalty: f64,
    pub temporal_boost_weight: f64,
    pub temporal_near_weight: f64,
    pub doc_type_intent_weight: f64,
    pub entity_match_weight: f64,
    pub entity_match_cap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact_name: 200.0,
            prefix_name: 150.0,
            contains_name: 100.0,
            exact_path: 90.0,
            prefix_path: 80.0,
            content_coefficient: 1.0,
            fuzzy: 30.0,
            recency: 30.0,
            recency_decay_days: 7.0,
            frequency_tier1: 10.0,
            frequency_tier2: 20.0,
            frequency_tier3: 30.0,
            cwd_boost: 25.0,
            app_context_boost: 15.0,
            semantic: 40.0,
            semantic_similarity_threshold: 0.7,
            pinned_boost: 200.0,
            junk_penalty: 50.0,
            temporal_boost_weight: 12.0,
            temporal_near_weight: 6.0,
            doc_type_intent_weight: 10.0,
            entity_match_weight: 8.0,
            entity_match_cap: 16.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub lexical_weight: f64,
    pub semantic_weight: f64,
    pub similarity_threshold: f64,
    pub rrf_k: f64,
    pub max_results: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { lexical_weight: 0.6, semantic_weight: 0.4, similarity_threshold: 0.7, rrf_k: 60.0, max_results: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerCascadeConfig {
    pub enabled: bool,
    pub stage1_max_candidates: usize,
    pub stage2_max_candidates: usize,
    pub rerank_budget_ms: u64,
    pub stage1_weight: f64,
    pub stage2_weight: f64,
    pub ambiguity_margin_threshold: f64,
}

impl Default for RerankerCascadeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stage1_max_candidates: 40,
            stage2_max_candidates: 12,
            rerank_budget_ms: 120,
            stage1_weight: 18.0,
            stage2_weight: 35.0,
            ambiguity_margin_threshold: 0.08,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub feedback_retention_days: i64,
    pub interaction_retention_days: i64,
    pub preference_cache_ttl_secs: i64,
    pub path_preference_weight: f64,
    pub path_preference_cap: f64,
    pub type_affinity_boost: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            feedback_retention_days: 90,
            interaction_retention_days: 180,
            preference_cache_ttl_secs: 300,
            path_preference_weight: 8.0,
            path_preference_cap: 25.0,
            type_affinity_boost: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeLimits {
    pub max_file_size: u64,
    pub max_extraction_ms: u64,
    pub fts_fanout_cap: usize,
    pub vector_k: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self { max_file_size: 5 * 1024 * 1024 * 1024, max_extraction_ms: 30_000, fts_fanout_cap: 200, vector_k: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub pipeline: PipelineConfig,
    pub chunker: ChunkerConfig,
    pub typo_lexicon: TypoLexiconConfig,
    pub hnsw: HnswConfig,
    pub scoring: ScoringWeights,
    pub merge: MergeConfig,
    pub reranker: RerankerCascadeConfig,
    pub feedback: FeedbackConfig,
    pub limits: RuntimeLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            pipeline: PipelineConfig::default(),
            chunker: ChunkerConfig::default(),
            typo_lexicon: TypoLexiconConfig::default(),
            hnsw: HnswConfig::default(),
            scoring: ScoringWeights::default(),
            merge: MergeConfig::default(),
            reranker: RerankerCascadeConfig::default(),
            feedback: FeedbackConfig::default(),
            limits: RuntimeLimits::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text).map_err(|e| crate::error::Error::InvalidInput(e.to_string()))?)
    }

    /// Load `config.toml` from the data directory if present, else defaults.
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join("config.toml");
        if path.exists() {
            match Self::load(&path) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!("failed to parse {}: {e}, using defaults", path.display()),
            }
        }
        Self::default()
    }
}

/// Resolve `<data_dir>/betterspotlight` for the current platform.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join("betterspotlight"))
        .ok_or_else(|| crate::error::Error::Unavailable("no platform data directory".into()))
}

/// Resolve `<home>/.bsignore`.
pub fn default_bsignore_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|d| d.join(".bsignore"))
        .ok_or_else(|| crate::error::Error::Unavailable("no home directory".into()))
}
