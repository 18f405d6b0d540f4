//! Turns raw interaction/feedback history into ranking signals (§4.16).
//!
//! Grounded in the original source's `core/feedback/{interaction_tracker,
//! path_preferences, type_affinity, feedback_aggregator}` subsystem, which
//! the distilled spec only exposed as external-interface method signatures.

use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::params;

use crate::config::FeedbackConfig;
use crate::error::Result;
use crate::fts_store::FtsStore;
use crate::types::Interaction;

/// Collapse whitespace and case the same way `QueryPlanner::normalize`
/// does, so interaction lookups key on the identical string a search used.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

pub struct InteractionTracker<'a> {
    fts: &'a FtsStore,
}

impl<'a> InteractionTracker<'a> {
    pub fn new(fts: &'a FtsStore) -> Self {
        Self { fts }
    }

    pub fn record_interaction(&self, mut interaction: Interaction) -> Result<()> {
        interaction.normalized_query = normalize_query(&interaction.normalized_query);
        self.fts.record_interaction(&interaction)
    }

    pub fn interaction_count(&self, query: &str, item_id: i64) -> Result<u64> {
        let normalized = normalize_query(query);
        let count: i64 = self.fts.conn().query_row(
            "SELECT COUNT(*) FROM interactions WHERE normalized_query = ?1 AND item_id = ?2",
            params![normalized, item_id],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Feeds QueryPlanner step 9's `feedbackBoost`: `ln(1 + count) * weight`,
    /// mirroring `PathPreferences`' selection-count boost shape.
    pub fn interaction_boost(&self, query: &str, item_id: i64, weight: f64) -> Result<f64> {
        let count = self.interaction_count(query, item_id)?;
        Ok((1.0 + count as f64).ln() * weight)
    }

    pub fn prune(&self, retention_days: i64) -> Result<usize> {
        let cutoff = now_secs() - (retention_days as f64 * 86_400.0);
        self.fts.prune_interactions(cutoff)
    }

    pub fn export_data(&self) -> Result<Vec<Interaction>> {
        self.fts.export_interaction_data()
    }
}

#[derive(Debug, Clone)]
pub struct DirPreference {
    pub directory: String,
    pub selection_count: i64,
    pub boost: f64,
    pub cached_at: f64,
}

struct PreferenceCache {
    directories: Vec<DirPreference>,
    refreshed_at: f64,
}

/// TTL-guarded aggregate of `Feedback{action=open}` rows by parent
/// directory, mirroring the reference implementation's cache shape: reads
/// are served from cache until the TTL lapses or `invalidate_cache` is
/// called, at which point the next read rebuilds from the feedback table.
pub struct PathPreferences<'a> {
    fts: &'a FtsStore,
    config: &'a FeedbackConfig,
    cache: RwLock<Option<PreferenceCache>>,
}

impl<'a> PathPreferences<'a> {
    pub fn new(fts: &'a FtsStore, config: &'a FeedbackConfig) -> Self {
        Self { fts, config, cache: RwLock::new(None) }
    }

    fn should_refresh_cache(&self) -> bool {
        match &*self.cache.read().unwrap() {
            None => true,
            Some(c) => now_secs() - c.refreshed_at > self.config.preference_cache_ttl_secs as f64,
        }
    }

    fn refresh_cache_if_needed(&self) -> Result<()> {
        if !self.should_refresh_cache() {
            return Ok(());
        }
        let opens = self.fts.opens_by_parent_dir()?;
        let refreshed_at = now_secs();
        let mut directories: Vec<DirPreference> = opens
            .into_iter()
            .map(|(directory, selection_count)| {
                let boost = (self.config.path_preference_weight * (1.0 + selection_count as f64).ln())
                    .min(self.config.path_preference_cap);
                DirPreference { directory, selection_count, boost, cached_at: refreshed_at }
            })
            .collect();
        directories.sort_by(|a, b| b.selection_count.cmp(&a.selection_count));
        *self.cache.write().unwrap() = Some(PreferenceCache { directories, refreshed_at });
        Ok(())
    }

    pub fn top_directories(&self, limit: usize) -> Result<Vec<DirPreference>> {
        self.refresh_cache_if_needed()?;
        let guard = self.cache.read().unwrap();
        Ok(guard.as_ref().map(|c| c.directories.iter().take(limit).cloned().collect()).unwrap_or_default())
    }

    pub fn get_boost(&self, path: &str) -> Result<f64> {
        self.refresh_cache_if_needed()?;
        let guard = self.cache.read().unwrap();
        let Some(cache) = guard.as_ref() else { return Ok(0.0) };
        Ok(cache
            .directories
            .iter()
            .find(|d| path.starts_with(&d.directory))
            .map(|d| d.boost)
            .unwrap_or(0.0))
    }

    pub fn invalidate_cache(&self) {
        *self.cache.write().unwrap() = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Code,
    Document,
    Media,
    Other,
}

impl TypeCategory {
    /// Tie-break priority when two categories have an equal open count:
    /// code > document > media > other.
    fn priority(self) -> u8 {
        match self {
            TypeCategory::Code => 0,
            TypeCategory::Document => 1,
            TypeCategory::Media => 2,
            TypeCategory::Other => 3,
        }
    }

    fn from_ext(ext: &str) -> Self {
        match ext {
            "rs" | "py" | "js" | "ts" | "tsx" | "jsx" | "go" | "c" | "h" | "cpp" | "hpp" | "cc" | "java" | "rb"
            | "sh" | "cs" | "swift" | "kt" | "php" => TypeCategory::Code,
            "md" | "markdown" | "pdf" | "txt" | "doc" | "docx" | "odt" | "pages" => TypeCategory::Document,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" | "heic" | "mp4" | "mov" | "mp3" | "wav"
            | "flac" | "avi" | "mkv" => TypeCategory::Media,
            _ => TypeCategory::Other,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AffinityStats {
    pub code_opens: i64,
    pub document_opens: i64,
    pub media_opens: i64,
    pub other_opens: i64,
    pub primary_affinity: Option<TypeCategory>,
    pub cached_at: f64,
}

struct AffinityCache {
    stats: AffinityStats,
    refreshed_at: f64,
}

pub struct TypeAffinity<'a> {
    fts: &'a FtsStore,
    config: &'a FeedbackConfig,
    cache: RwLock<Option<AffinityCache>>,
}

impl<'a> TypeAffinity<'a> {
    pub fn new(fts: &'a FtsStore, config: &'a FeedbackConfig) -> Self {
        Self { fts, config, cache: RwLock::new(None) }
    }

    fn should_refresh_cache(&self) -> bool {
        match &*self.cache.read().unwrap() {
            None => true,
            Some(c) => now_secs() - c.refreshed_at > self.config.preference_cache_ttl_secs as f64,
        }
    }

    fn refresh_cache_if_needed(&self) -> Result<()> {
        if !self.should_refresh_cache() {
            return Ok(());
        }
        let opens = self.fts.opens_by_extension()?;
        let mut stats = AffinityStats::default();
        for (ext, count) in opens {
            match TypeCategory::from_ext(&ext) {
                TypeCategory::Code => stats.code_opens += count,
                TypeCategory::Document => stats.document_opens += count,
                TypeCategory::Media => stats.media_opens += count,
                TypeCategory::Other => stats.other_opens += count,
            }
        }

        let mut ranked = [
            (TypeCategory::Code, stats.code_opens),
            (TypeCategory::Document, stats.document_opens),
            (TypeCategory::Media, stats.media_opens),
            (TypeCategory::Other, stats.other_opens),
        ];
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.priority().cmp(&b.0.priority())));
        stats.primary_affinity = if ranked[0].1 > 0 { Some(ranked[0].0) } else { None };

        let refreshed_at = now_secs();
        stats.cached_at = refreshed_at;
        *self.cache.write().unwrap() = Some(AffinityCache { stats, refreshed_at });
        Ok(())
    }

    pub fn affinity_stats(&self) -> Result<AffinityStats> {
        self.refresh_cache_if_needed()?;
        Ok(self.cache.read().unwrap().as_ref().map(|c| c.stats.clone()).unwrap_or_default())
    }

    pub fn get_boost(&self, file_path: &str) -> Result<f64> {
        self.refresh_cache_if_needed()?;
        let guard = self.cache.read().unwrap();
        let Some(cache) = guard.as_ref() else { return Ok(0.0) };
        let Some(primary) = cache.stats.primary_affinity else { return Ok(0.0) };

        let ext = std::path::Path::new(file_path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if TypeCategory::from_ext(&ext) == primary {
            Ok(self.config.type_affinity_boost)
        } else {
            Ok(0.0)
        }
    }

    pub fn invalidate_cache(&self) {
        *self.cache.write().unwrap() = None;
    }
}

const LAST_AGGREGATION_SETTING_KEY: &str = "feedback.last_aggregation_time";

/// Recomputes `Frequency` rows from interaction/feedback history and
/// invalidates the two caches above so the next read rebuilds from source.
pub struct FeedbackAggregator<'a> {
    fts: &'a FtsStore,
    path_preferences: &'a PathPreferences<'a>,
    type_affinity: &'a TypeAffinity<'a>,
}

impl<'a> FeedbackAggregator<'a> {
    pub fn new(fts: &'a FtsStore, path_preferences: &'a PathPreferences<'a>, type_affinity: &'a TypeAffinity<'a>) -> Self {
        Self { fts, path_preferences, type_affinity }
    }

    pub fn run_aggregation(&self) -> Result<()> {
        self.fts.recompute_frequency()?;
        self.path_preferences.invalidate_cache();
        self.type_affinity.invalidate_cache();
        self.fts.set_setting(LAST_AGGREGATION_SETTING_KEY, &now_secs().to_string())?;
        Ok(())
    }

    pub fn cleanup(&self, feedback_retention_days: i64, interaction_retention_days: i64) -> Result<(usize, usize)> {
        let feedback_cutoff = now_secs() - (feedback_retention_days as f64 * 86_400.0);
        let interaction_cutoff = now_secs() - (interaction_retention_days as f64 * 86_400.0);
        let feedback_pruned = self.fts.prune_feedback(feedback_cutoff)?;
        let interactions_pruned = self.fts.prune_interactions(interaction_cutoff)?;
        Ok((feedback_pruned, interactions_pruned))
    }

    pub fn last_aggregation_time(&self) -> Result<Option<f64>> {
        Ok(self.fts.get_setting(LAST_AGGREGATION_SETTING_KEY)?.and_then(|s| s.parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Feedback, FeedbackAction, MatchType};

    fn seed_item(fts: &FtsStore, path: &str, ext: &str, parent: &str) -> i64 {
        fts.upsert_item(path, "name", ext, crate::types::ItemKind::Text, 10, 0.0, 0.0, "", crate::types::Sensitivity::Normal, parent, 0.0)
            .unwrap()
    }

    #[test]
    fn interaction_boost_grows_with_count() {
        let fts = FtsStore::open_in_memory().unwrap();
        let item_id = seed_item(&fts, "/a/doc.txt", "txt", "/a");
        let tracker = InteractionTracker::new(&fts);

        for _ in 0..3 {
            tracker
                .record_interaction(Interaction {
                    id: 0,
                    normalized_query: "Report  Q3".into(),
                    item_id,
                    path: "/a/doc.txt".into(),
                    match_type: MatchType::ExactName,
                    result_position: 0,
                    frontmost_app: None,
                    timestamp: 0.0,
                })
                .unwrap();
        }

        assert_eq!(tracker.interaction_count("report q3", item_id).unwrap(), 3);
        assert!(tracker.interaction_boost("report q3", item_id, 5.0).unwrap() > 0.0);
    }

    #[test]
    fn path_preferences_boost_favors_frequent_directory() {
        let fts = FtsStore::open_in_memory().unwrap();
        let item_id = seed_item(&fts, "/work/proj/a.txt", "txt", "/work/proj");
        for _ in 0..5 {
            fts.record_feedback(&Feedback { id: 0, item_id, action: FeedbackAction::Open, query: "a".into(), timestamp: 0.0 }).unwrap();
        }

        let config = FeedbackConfig::default();
        let prefs = PathPreferences::new(&fts, &config);
        let boost = prefs.get_boost("/work/proj/a.txt").unwrap();
        assert!(boost > 0.0);
        assert!(boost <= config.path_preference_cap);
    }

    #[test]
    fn type_affinity_picks_primary_category() {
        let fts = FtsStore::open_in_memory().unwrap();
        let code_item = seed_item(&fts, "/src/main.rs", "rs", "/src");
        let doc_item = seed_item(&fts, "/docs/readme.md", "md", "/docs");

        for _ in 0..4 {
            fts.record_feedback(&Feedback { id: 0, item_id: code_item, action: FeedbackAction::Open, query: "".into(), timestamp: 0.0 }).unwrap();
        }
        fts.record_feedback(&Feedback { id: 0, item_id: doc_item, action: FeedbackAction::Open, query: "".into(), timestamp: 0.0 }).unwrap();

        let config = FeedbackConfig::default();
        let affinity = TypeAffinity::new(&fts, &config);
        let stats = affinity.affinity_stats().unwrap();
        assert_eq!(stats.primary_affinity, Some(TypeCategory::Code));
        assert!(affinity.get_boost("/src/other.rs").unwrap() > 0.0);
        assert_eq!(affinity.get_boost("/docs/other.md").unwrap(), 0.0);
    }

    #[test]
    fn aggregator_rebuilds_frequency_and_invalidates_caches() {
        let fts = FtsStore::open_in_memory().unwrap();
        let item_id = seed_item(&fts, "/a/doc.txt", "txt", "/a");
        fts.record_feedback(&Feedback { id: 0, item_id, action: FeedbackAction::Open, query: "a".into(), timestamp: 0.0 }).unwrap();

        let config = FeedbackConfig::default();
        let prefs = PathPreferences::new(&fts, &config);
        let affinity = TypeAffinity::new(&fts, &config);
        prefs.top_directories(10).unwrap();

        let aggregator = FeedbackAggregator::new(&fts, &prefs, &affinity);
        aggregator.run_aggregation().unwrap();

        let freq = fts.get_frequency(item_id).unwrap();
        assert_eq!(freq.open_count, 1);
        assert!(aggregator.last_aggregation_time().unwrap().is_some());
    }
}
